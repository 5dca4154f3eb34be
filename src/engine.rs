//! The render session: every piece of engine state, owned in one place and
//! threaded through the call graph instead of living in globals.

use std::rc::Rc;

use crate::context::ContextStack;
use crate::element::View;
use crate::error::RenderError;
use crate::fiber::node::{NodeId, NodeState, PropsSlot, WorkNode, WorkTag};
use crate::fiber::NodeArena;
use crate::hooks::HookEnv;
use crate::host::{HostAdapter, InstanceId};
use crate::schedule::{Lanes, TaskHandle, TaskPriority, TaskScheduler};
use crate::update_queue::StateCell;

/// Persistent per-root bookkeeping.
pub(crate) struct RootState {
    /// The host container the tree mounts into.
    pub container: InstanceId,
    /// The committed tree's root node.
    pub current: NodeId,
    /// Merge of every lane with unfinished updates.
    pub pending_lanes: Lanes,
    /// Lanes of a finished-but-uncommitted render.
    pub finished_lanes: Lanes,
    /// A finished in-progress tree awaiting commit.
    pub finished_work: Option<NodeId>,
    /// The callback currently registered with the external scheduler.
    pub scheduled: Option<(TaskHandle, TaskPriority)>,
    /// Nodes with deferred effects from committed passes, flushed later in
    /// one teardown pass followed by one setup pass.
    pub passive_backlog: Vec<NodeId>,
    pub passive_scheduled: bool,
    /// The last render-phase failure the work loop recovered from.
    pub last_error: Option<RenderError>,
}

/// The engine: arena, host, scheduler handle, root state, and all transient
/// render-session state. Single-threaded; shared behind `Rc<RefCell<_>>` and
/// borrowed only for short bookkeeping steps, never across user code.
pub(crate) struct Engine {
    pub arena: NodeArena,
    pub host: Box<dyn HostAdapter>,
    pub scheduler: Rc<dyn TaskScheduler>,
    pub root: RootState,

    // In-progress render state, reset whenever a fresh walk starts.
    /// The next unit of work, if a walk is in progress.
    pub wip: Option<NodeId>,
    /// The in-progress root node of the current walk.
    pub wip_root: Option<NodeId>,
    /// The lanes the current walk is rendering.
    pub render_lanes: Lanes,
    /// Set when the node being rendered received new props or state.
    pub did_receive_update: bool,
    /// Active provider values; pushed and popped as the walk descends.
    pub context_stack: ContextStack,
    /// Hook-chain cursor for the component currently rendering.
    pub hook_env: Option<HookEnv>,
    /// Non-zero while inside a transition scope; updates scheduled there are
    /// taken at transition priority.
    pub transition_depth: u32,
}

impl Engine {
    pub fn new(
        host: Box<dyn HostAdapter>,
        container: InstanceId,
        scheduler: Rc<dyn TaskScheduler>,
    ) -> Engine {
        let mut arena = NodeArena::new();
        let mut root_node = WorkNode::new(WorkTag::HostRoot, PropsSlot::Empty, None);
        root_node.state = NodeState::Root(StateCell::new(Rc::new(View::Nothing)));
        let current = arena.insert(root_node);
        Engine {
            arena,
            host,
            scheduler,
            root: RootState {
                container,
                current,
                pending_lanes: Lanes::NONE,
                finished_lanes: Lanes::NONE,
                finished_work: None,
                scheduled: None,
                passive_backlog: Vec::new(),
                passive_scheduled: false,
                last_error: None,
            },
            wip: None,
            wip_root: None,
            render_lanes: Lanes::NONE,
            did_receive_update: false,
            context_stack: ContextStack::new(),
            hook_env: None,
            transition_depth: 0,
        }
    }

    /// Discard all in-progress render state. The committed tree is untouched.
    pub fn reset_in_progress(&mut self) {
        self.wip = None;
        self.wip_root = None;
        self.render_lanes = Lanes::NONE;
        self.did_receive_update = false;
        self.context_stack.reset();
        self.hook_env = None;
    }
}
