//! Lane-tagged state update queues.
//!
//! Every state slot (hook state, transition pending flags, the root element
//! itself) owns one queue. Dispatch pushes an [`Update`] carrying the lane it
//! was requested at; a render pass replays only updates whose lane is part of
//! the lanes being rendered. Skipped updates are not lost — they move into a
//! base queue together with clones of every later applied update, so a future
//! render at their own priority replays the full sequence in order.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::schedule::Lanes;

/// A state transition: a replacement value or a pure transform of the
/// previous state.
#[derive(Clone)]
pub enum UpdateAction {
    Replace(Rc<dyn Any>),
    Transform(Rc<dyn Fn(&dyn Any) -> Rc<dyn Any>>),
}

impl UpdateAction {
    fn apply(&self, prev: Rc<dyn Any>) -> Rc<dyn Any> {
        match self {
            UpdateAction::Replace(value) => value.clone(),
            UpdateAction::Transform(f) => (**f)(&*prev),
        }
    }
}

/// One pending state transition.
#[derive(Clone)]
pub struct Update {
    pub action: UpdateAction,
    pub lane: Lanes,
}

/// The dispatch-side pending queue for one state slot.
///
/// Shared (`Rc`) between both tree buffers and every dispatch handle, so an
/// update enqueued from anywhere is visible to the next render regardless of
/// which buffer it starts from.
#[derive(Default)]
pub struct SharedQueue {
    pending: RefCell<Vec<Update>>,
}

impl SharedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, update: Update) {
        self.pending.borrow_mut().push(update);
    }

    /// Drain all pending updates in enqueue order.
    pub fn take(&self) -> Vec<Update> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

/// Snapshot of one state slot: the committed value, the replay base, and the
/// shared pending queue.
#[derive(Clone)]
pub struct StateCell {
    /// The value produced by the last render of this slot.
    pub memoized: Rc<dyn Any>,
    /// The state updates deferred by lane skipping replay from.
    pub base_state: Rc<dyn Any>,
    /// Deferred updates (plus no-lane clones of applied ones after the first
    /// skip, preserving sequential order on replay).
    pub base_queue: Vec<Update>,
    pub queue: Rc<SharedQueue>,
}

impl StateCell {
    pub fn new(initial: Rc<dyn Any>) -> Self {
        Self {
            memoized: initial.clone(),
            base_state: initial,
            base_queue: Vec::new(),
            queue: Rc::new(SharedQueue::new()),
        }
    }
}

/// Result of replaying a slot's queue at a render's lane set.
pub struct Processed {
    pub memoized: Rc<dyn Any>,
    pub base_state: Rc<dyn Any>,
    pub base_queue: Vec<Update>,
    /// Lanes of updates that were deferred and still need a render.
    pub skipped: Lanes,
}

/// Replay a slot's base queue plus pending updates at `render_lanes`.
///
/// Updates whose lane is outside `render_lanes` are deferred; once anything
/// has been deferred, later applied updates are also cloned (lane cleared) so
/// the eventual replay at the skipped lane re-applies the whole suffix in
/// order. When nothing is pending the memoized value is returned unchanged —
/// callers rely on pointer identity to detect "no state change".
pub fn process_updates(cell: &StateCell, render_lanes: Lanes) -> Processed {
    let pending = cell.queue.take();
    if cell.base_queue.is_empty() && pending.is_empty() {
        return Processed {
            memoized: cell.memoized.clone(),
            base_state: cell.base_state.clone(),
            base_queue: Vec::new(),
            skipped: Lanes::NONE,
        };
    }

    let mut state = cell.base_state.clone();
    let mut new_base_state: Option<Rc<dyn Any>> = None;
    let mut new_base_queue: Vec<Update> = Vec::new();
    let mut skipped = Lanes::NONE;

    for update in cell.base_queue.iter().cloned().chain(pending) {
        let applies = update.lane.is_empty() || render_lanes.intersects(update.lane);
        if applies {
            if new_base_state.is_some() {
                // Something before this was deferred; keep a replayable clone
                // that always applies on the next pass.
                new_base_queue.push(Update {
                    action: update.action.clone(),
                    lane: Lanes::NONE,
                });
            }
            state = update.action.apply(state);
        } else {
            if new_base_state.is_none() {
                new_base_state = Some(state.clone());
            }
            skipped |= update.lane;
            new_base_queue.push(update);
        }
    }

    Processed {
        memoized: state.clone(),
        base_state: new_base_state.unwrap_or(state),
        base_queue: new_base_queue,
        skipped,
    }
}
