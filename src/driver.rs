//! Frame-pump driver: drains a [`FrameScheduler`] on a fixed interval.
//!
//! The engine itself never owns an event loop; for embedders that don't have
//! one either, `Driver` runs scheduled work frame by frame on tokio's timer
//! until the queue goes idle.

use std::rc::Rc;
use std::time::Duration;

use crate::schedule::FrameScheduler;

/// Pumps a [`FrameScheduler`] at a fixed frame rate.
pub struct Driver {
    scheduler: Rc<FrameScheduler>,
    frame: Duration,
}

impl Driver {
    /// A driver targeting `fps` frames per second.
    pub fn new(scheduler: Rc<FrameScheduler>, fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            scheduler,
            frame: Duration::from_secs(1) / fps,
        }
    }

    /// Run one frame's worth of scheduled work immediately.
    pub fn pump(&self) {
        self.scheduler.run_frame();
    }

    /// Pump frames until the scheduler has no queued work.
    pub async fn run_until_idle(&self) {
        loop {
            self.scheduler.run_frame();
            if !self.scheduler.has_tasks() {
                return;
            }
            tokio::time::sleep(self.frame).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::root::Root;
    use crate::schedule::TaskScheduler;
    use crate::testing::TestHost;
    use std::cell::RefCell;

    #[test]
    fn run_until_idle_drains_scheduled_renders() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let scheduler = Rc::new(FrameScheduler::default());
        let container = host.borrow().container();
        let handle: Rc<dyn TaskScheduler> = scheduler.clone();
        let root = Root::new(host.clone(), container, handle);
        let driver = Driver::new(scheduler, 60);

        root.render(Element::host("div").with_child("ready"));
        tokio_test::block_on(driver.run_until_idle());

        let tree = host.borrow().to_tree_string();
        assert!(tree.contains("<div>"));
        assert!(tree.contains("\"ready\""));
    }

    #[test]
    fn pump_runs_a_frame() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let scheduler = Rc::new(FrameScheduler::default());
        let container = host.borrow().container();
        let handle: Rc<dyn TaskScheduler> = scheduler.clone();
        let root = Root::new(host.clone(), container, handle);
        let driver = Driver::new(scheduler.clone(), 30);

        root.render("just text");
        driver.pump();
        assert!(host.borrow().to_tree_string().contains("\"just text\""));
    }
}
