//! Headless harness: a root wired to the recording host and a manual
//! scheduler, with helpers to pump work deterministically.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::element::View;
use crate::root::Root;
use crate::schedule::{Lanes, ManualScheduler, TaskPriority, TaskScheduler};
use crate::testing::host::{HostOp, TestHost};

/// A headless rig for driving renders in tests.
///
/// ```ignore
/// use weft::element::Element;
/// use weft::testing::Harness;
///
/// let harness = Harness::new();
/// harness.render(Element::host("div").with_child("hi"));
/// harness.flush();
/// assert_eq!(harness.tree(), "<div>\n  \"hi\"\n");
/// ```
pub struct Harness {
    root: Root,
    host: Rc<RefCell<TestHost>>,
    scheduler: Rc<ManualScheduler>,
}

impl Harness {
    pub fn new() -> Self {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let scheduler = Rc::new(ManualScheduler::new());
        let container = host.borrow().container();
        let scheduler_handle: Rc<dyn TaskScheduler> = scheduler.clone();
        let root = Root::new(host.clone(), container, scheduler_handle);
        Self {
            root,
            host,
            scheduler,
        }
    }

    /// Schedule `view` as the new root content (does not flush).
    pub fn render(&self, view: impl Into<View>) {
        self.root.render(view);
    }

    /// Schedule and run everything to quiescence.
    pub fn render_and_flush(&self, view: impl Into<View>) {
        self.render(view);
        self.flush();
    }

    /// Run scheduled work (including passive-effect flushes) to quiescence.
    pub fn flush(&self) {
        self.scheduler.flush();
    }

    /// Run a single scheduler task. Returns `false` when idle.
    pub fn step(&self) -> bool {
        self.scheduler.step()
    }

    /// Run `f` with the ambient scheduler priority set to `priority`, so
    /// updates dispatched inside map to the corresponding lane.
    pub fn run_with_priority(&self, priority: TaskPriority, f: impl FnOnce()) {
        self.scheduler.run_with_priority(priority, Box::new(f));
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn host(&self) -> Ref<'_, TestHost> {
        self.host.borrow()
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    /// The committed host tree as an indented string.
    pub fn tree(&self) -> String {
        self.host.borrow().to_tree_string()
    }

    /// Drain the host op log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        self.host.borrow_mut().take_ops()
    }

    pub fn pending_lanes(&self) -> Lanes {
        self.root.pending_lanes()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
