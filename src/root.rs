//! Root: the mount point tying a host adapter, an external scheduler and
//! the reconciliation engine together.

use std::cell::RefCell;
use std::rc::Rc;

use crate::element::View;
use crate::engine::Engine;
use crate::error::RenderError;
use crate::fiber::node::NodeState;
use crate::host::{HostAdapter, InstanceId};
use crate::schedule::{Lanes, TaskScheduler};
use crate::update_queue::{Update, UpdateAction};
use crate::work_loop;

/// A mounted tree.
///
/// `render` enqueues a new root view at the current ambient priority and
/// registers work with the scheduler; the embedder pumps the scheduler to
/// make renders actually happen (see [`crate::testing::Harness`] and
/// [`crate::driver::Driver`]).
pub struct Root {
    engine: Rc<RefCell<Engine>>,
}

impl Root {
    /// Mount a new root into `container`.
    pub fn new(
        host: impl HostAdapter + 'static,
        container: InstanceId,
        scheduler: Rc<dyn TaskScheduler>,
    ) -> Self {
        Self {
            engine: Rc::new(RefCell::new(Engine::new(
                Box::new(host),
                container,
                scheduler,
            ))),
        }
    }

    /// Schedule `view` as the new root content.
    ///
    /// Repeated calls before the scheduler runs batch into a single render
    /// pass; the last view wins.
    pub fn render(&self, view: impl Into<View>) {
        let view: View = view.into();
        let (fiber, queue) = {
            let eng = self.engine.borrow();
            let fiber = eng.root.current;
            let NodeState::Root(cell) = &eng.arena.node(fiber).state else {
                unreachable!("host root carries root state");
            };
            (fiber, cell.queue.clone())
        };
        let lane = work_loop::request_update_lane(&self.engine);
        queue.push(Update {
            action: UpdateAction::Replace(Rc::new(view)),
            lane,
        });
        work_loop::schedule_update_on_fiber(&self.engine, fiber, lane);
    }

    /// Lanes with unfinished updates on this root.
    pub fn pending_lanes(&self) -> Lanes {
        self.engine.borrow().root.pending_lanes
    }

    /// The last render-phase failure the work loop recovered from, if any.
    pub fn take_render_error(&self) -> Option<RenderError> {
        self.engine.borrow_mut().root.last_error.take()
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("pending_lanes", &self.pending_lanes())
            .finish()
    }
}
