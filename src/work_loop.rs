//! Work loop: update scheduling, the begin/complete walk, preemption, and
//! render-phase recovery.
//!
//! Per root the loop is a small state machine: an update merges its lane
//! into the root's pending set and (re)registers a callback with the
//! external scheduler at the mapped urgency. The callback renders the
//! highest-priority pending lane — synchronously for the sync lane, in
//! yieldable time slices otherwise — then commits. Interrupted work resumes
//! only if the lanes being rendered didn't change; a higher-priority update
//! discards the in-progress tree and restarts fresh.

use std::cell::RefCell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::commit;
use crate::engine::Engine;
use crate::error::{HookError, RenderError};
use crate::fiber::node::NodeId;
use crate::reconcile::{begin, complete};
use crate::schedule::{lanes_to_priority, priority_to_lane, Lanes, TaskCallback, TaskOutcome};

/// The lane an update requested right now should take: transition scopes
/// force the transition lane, otherwise the ambient scheduler priority maps
/// to one.
pub(crate) fn request_update_lane(engine: &Rc<RefCell<Engine>>) -> Lanes {
    let eng = engine.borrow();
    if eng.transition_depth > 0 {
        return Lanes::TRANSITION;
    }
    priority_to_lane(eng.scheduler.current_priority())
}

/// Merge `lane` into the fiber's pending work and the root's pending set,
/// then make sure a callback is registered at the right priority.
pub(crate) fn schedule_update_on_fiber(engine: &Rc<RefCell<Engine>>, fiber: NodeId, lane: Lanes) {
    {
        let mut eng = engine.borrow_mut();
        if !eng.arena.contains(fiber) {
            tracing::warn!("update scheduled on a removed node; ignoring");
            return;
        }
        eng.arena.mark_update_lane(fiber, lane);
        eng.root.pending_lanes |= lane;
    }
    ensure_root_scheduled(engine);
}

/// Reconcile the registered scheduler callback with the root's pending
/// lanes: cancel it when nothing is pending, keep it when the priority still
/// matches, replace it otherwise.
pub(crate) fn ensure_root_scheduled(engine: &Rc<RefCell<Engine>>) {
    let mut eng = engine.borrow_mut();
    let next = eng.root.pending_lanes.highest_priority();
    if next.is_empty() {
        if let Some((handle, _)) = eng.root.scheduled.take() {
            eng.scheduler.cancel_callback(handle);
        }
        return;
    }
    let priority = lanes_to_priority(next);
    if let Some((handle, scheduled_priority)) = eng.root.scheduled {
        if scheduled_priority == priority {
            return;
        }
        eng.scheduler.cancel_callback(handle);
        eng.root.scheduled = None;
    }
    let weak = Rc::downgrade(engine);
    let callback: TaskCallback = Box::new(move || match weak.upgrade() {
        Some(engine) => perform_work_on_root(&engine),
        None => TaskOutcome::Finished,
    });
    let handle = eng.scheduler.schedule_callback(priority, callback);
    eng.root.scheduled = Some((handle, priority));
    tracing::debug!(lanes = ?next, ?priority, "root work scheduled");
}

enum WalkStatus {
    Complete,
    Yielded,
}

/// Render the highest-priority pending lane and commit the result.
///
/// Returns [`TaskOutcome::Yielded`] when time-sliced work suspended; the
/// scheduler re-invokes the same callback to resume.
pub(crate) fn perform_work_on_root(engine: &Rc<RefCell<Engine>>) -> TaskOutcome {
    // Deferred effects from an earlier commit must settle before new work
    // renders against their fibers.
    commit::flush_passive_effects(engine);

    let lanes = {
        let mut eng = engine.borrow_mut();
        let lanes = eng.root.pending_lanes.highest_priority();
        if lanes.is_empty() {
            eng.root.scheduled = None;
            return TaskOutcome::Finished;
        }
        // Resume only if the in-progress lanes still match; otherwise the
        // preempted tree is discarded and the walk restarts fresh.
        if eng.wip_root.is_none() || eng.render_lanes != lanes {
            prepare_fresh_stack(&mut eng, lanes);
        }
        lanes
    };
    let synchronous = lanes.contains(Lanes::SYNC);
    let scheduler = engine.borrow().scheduler.clone();

    let walked = catch_unwind(AssertUnwindSafe(|| loop {
        if engine.borrow().wip.is_none() {
            return WalkStatus::Complete;
        }
        if !synchronous && scheduler.should_yield() {
            return WalkStatus::Yielded;
        }
        perform_unit_of_work(engine);
    }));

    match walked {
        Err(payload) => {
            {
                let mut eng = engine.borrow_mut();
                eng.reset_in_progress();
                eng.root.scheduled = None;
            }
            // Hook-contract violations are not recoverable; re-raise them.
            if payload.is::<HookError>() {
                resume_unwind(payload);
            }
            let message = panic_message(payload.as_ref());
            tracing::error!(
                error = %message,
                "component panicked during render; in-progress work abandoned"
            );
            {
                let mut eng = engine.borrow_mut();
                eng.root.pending_lanes = eng.root.pending_lanes.without(lanes);
                eng.root.last_error = Some(RenderError::ComponentPanic(message));
            }
            ensure_root_scheduled(engine);
            TaskOutcome::Finished
        }
        Ok(WalkStatus::Yielded) => {
            tracing::trace!(lanes = ?lanes, "render yielded");
            TaskOutcome::Yielded
        }
        Ok(WalkStatus::Complete) => {
            {
                let mut eng = engine.borrow_mut();
                eng.root.finished_work = eng.wip_root.take();
                eng.root.finished_lanes = lanes;
                eng.render_lanes = Lanes::NONE;
                eng.wip = None;
                eng.root.scheduled = None;
            }
            commit::commit_root(engine);
            // Commit may leave skipped lanes pending or effects may have
            // scheduled more; keep the root scheduled for them.
            ensure_root_scheduled(engine);
            TaskOutcome::Finished
        }
    }
}

/// Point the session at a fresh in-progress buffer of the committed root.
fn prepare_fresh_stack(eng: &mut Engine, lanes: Lanes) {
    if eng.wip_root.is_some() {
        tracing::debug!(abandoned = ?eng.render_lanes, next = ?lanes, "discarding preempted render");
    }
    eng.reset_in_progress();
    eng.render_lanes = lanes;
    let root = eng.root.current;
    let pending = eng.arena.node(root).pending_props.clone();
    let wip = eng.arena.create_work_in_progress(root, pending);
    eng.wip_root = Some(wip);
    eng.wip = Some(wip);
}

fn perform_unit_of_work(engine: &Rc<RefCell<Engine>>) {
    let unit = engine
        .borrow()
        .wip
        .expect("a unit of work is in progress");
    let next = begin::begin_work(engine, unit);
    {
        let mut eng = engine.borrow_mut();
        let node = eng.arena.node_mut(unit);
        node.memoized_props = node.pending_props.clone();
    }
    match next {
        Some(child) => engine.borrow_mut().wip = Some(child),
        None => complete_unit_of_work(engine, unit),
    }
}

/// Complete the finished node, then move to its sibling or keep completing
/// ancestors until one has a sibling (or the root completes).
fn complete_unit_of_work(engine: &Rc<RefCell<Engine>>, from: NodeId) {
    let mut eng = engine.borrow_mut();
    let eng = &mut *eng;
    let mut node = Some(from);
    while let Some(id) = node {
        complete::complete_work(eng, id);
        if let Some(sibling) = eng.arena.node(id).sibling {
            eng.wip = Some(sibling);
            return;
        }
        node = eng.arena.node(id).parent;
        eng.wip = node;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
