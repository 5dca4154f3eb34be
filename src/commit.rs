//! Commit engine: apply a finished work tree to the host in one
//! uninterrupted pass, then flush deferred effects.
//!
//! Only nodes whose own or subtree flags are non-empty are visited. Per
//! node the order is fixed: placements (with a stable-host-sibling search
//! for the insertion point), in-place updates, then deletions. A deleted
//! subtree's effects are torn down synchronously before any of its host
//! nodes are removed, and removal is batched per contiguous top-level host
//! run. Passive effects never run in this pass — they are queued on the root
//! and flushed later in two ordered sub-passes (all teardowns, then all
//! setups).

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::engine::Engine;
use crate::fiber::flags::NodeFlags;
use crate::fiber::node::{NodeId, WorkTag};
use crate::hooks::{Cleanup, HookState};
use crate::host::InstanceId;
use crate::schedule::{Lanes, TaskCallback, TaskOutcome, TaskPriority};
use crate::work_loop;

/// Commit the root's finished work, promote it to current, and schedule the
/// passive-effect flush.
pub(crate) fn commit_root(engine: &Rc<RefCell<Engine>>) {
    let finished = {
        let mut eng = engine.borrow_mut();
        let Some(finished) = eng.root.finished_work.take() else {
            return;
        };
        let lanes = eng.root.finished_lanes;
        eng.root.finished_lanes = Lanes::NONE;
        // Work that was skipped (or dispatched mid-render) lives on in the
        // finished tree's lane bookkeeping; it stays pending.
        let remaining = {
            let node = eng.arena.node(finished);
            node.lanes | node.child_lanes
        };
        eng.root.pending_lanes = eng.root.pending_lanes.without(lanes) | remaining;
        tracing::debug!(?lanes, ?remaining, "committing root");
        finished
    };

    let has_work = {
        let eng = engine.borrow();
        let node = eng.arena.node(finished);
        (node.flags | node.subtree_flags)
            .intersects(NodeFlags::MUTATION_MASK | NodeFlags::PASSIVE)
    };
    if has_work {
        commit_mutation(engine, finished);
    }

    // The finished tree is the committed tree from here on.
    engine.borrow_mut().root.current = finished;

    schedule_passive_flush(engine);
}

fn schedule_passive_flush(engine: &Rc<RefCell<Engine>>) {
    let mut eng = engine.borrow_mut();
    if eng.root.passive_backlog.is_empty() || eng.root.passive_scheduled {
        return;
    }
    eng.root.passive_scheduled = true;
    let weak = Rc::downgrade(engine);
    let callback: TaskCallback = Box::new(move || {
        if let Some(engine) = weak.upgrade() {
            flush_passive_effects(&engine);
        }
        TaskOutcome::Finished
    });
    eng.scheduler
        .schedule_callback(TaskPriority::Normal, callback);
}

// ---------------------------------------------------------------------------
// Mutation pass
// ---------------------------------------------------------------------------

fn commit_mutation(engine: &Rc<RefCell<Engine>>, fiber: NodeId) {
    let (flags, subtree_flags, deletions, children) = {
        let eng = engine.borrow();
        let node = eng.arena.node(fiber);
        (
            node.flags,
            node.subtree_flags,
            node.deletions.clone(),
            eng.arena.child_chain(fiber),
        )
    };

    if flags.contains(NodeFlags::PLACEMENT) {
        let mut eng = engine.borrow_mut();
        commit_placement(&mut eng, fiber);
        eng.arena.node_mut(fiber).flags.remove(NodeFlags::PLACEMENT);
    }
    if flags.contains(NodeFlags::UPDATE) {
        let mut eng = engine.borrow_mut();
        commit_update(&mut eng, fiber);
        eng.arena.node_mut(fiber).flags.remove(NodeFlags::UPDATE);
    }
    if flags.contains(NodeFlags::REF) {
        let mut eng = engine.borrow_mut();
        commit_ref_attach(&mut eng, fiber);
        eng.arena.node_mut(fiber).flags.remove(NodeFlags::REF);
    }
    if flags.contains(NodeFlags::PASSIVE) {
        let mut eng = engine.borrow_mut();
        eng.root.passive_backlog.push(fiber);
        eng.arena.node_mut(fiber).flags.remove(NodeFlags::PASSIVE);
    }
    if !deletions.is_empty() {
        for deleted in deletions {
            commit_deletion(engine, fiber, deleted);
        }
        let mut eng = engine.borrow_mut();
        let node = eng.arena.node_mut(fiber);
        node.deletions.clear();
        node.flags.remove(NodeFlags::CHILD_DELETION);
    }

    if subtree_flags.intersects(NodeFlags::MUTATION_MASK | NodeFlags::PASSIVE) {
        for child in children {
            commit_mutation(engine, child);
        }
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

fn commit_placement(eng: &mut Engine, fiber: NodeId) {
    build_host_instances(eng, fiber);
    let Some(host_parent) = find_host_parent(eng, fiber) else {
        tracing::warn!("placement target has no host parent; skipping");
        return;
    };
    let before = find_host_sibling(eng, fiber);
    insert_or_append(eng, fiber, host_parent, before);
}

/// Create missing host instances for a freshly mounted subtree, appending
/// children into their parents as the subtree is built, so a single
/// insertion at the top attaches the whole thing.
fn build_host_instances(eng: &mut Engine, fiber: NodeId) {
    for child in eng.arena.child_chain(fiber) {
        build_host_instances(eng, child);
    }
    let tag = eng.arena.node(fiber).tag.clone();
    match tag {
        WorkTag::HostText => {
            if eng.arena.node(fiber).instance.is_none() {
                let content = eng
                    .arena
                    .node(fiber)
                    .pending_props
                    .as_text()
                    .cloned()
                    .unwrap_or_else(|| Rc::from(""));
                let instance = eng.host.create_text_instance(&content);
                eng.arena.node_mut(fiber).instance = Some(instance);
            }
        }
        WorkTag::HostElement(host_tag) => {
            if eng.arena.node(fiber).instance.is_none() {
                let props = eng
                    .arena
                    .node(fiber)
                    .pending_props
                    .as_props()
                    .cloned()
                    .unwrap_or_default();
                let instance = eng.host.create_instance(&host_tag, &props);
                eng.arena.node_mut(fiber).instance = Some(instance);
                for child_instance in collect_host_children(eng, fiber) {
                    eng.host.append_child(instance, child_instance);
                }
            }
        }
        _ => {}
    }
}

/// The top-level host instances inside `fiber`'s children (descending
/// through non-host nodes, stopping at the first host level).
fn collect_host_children(eng: &Engine, fiber: NodeId) -> Vec<InstanceId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = eng.arena.child_chain(fiber);
    stack.reverse();
    while let Some(id) = stack.pop() {
        let node = eng.arena.node(id);
        if node.tag.is_host() {
            if let Some(instance) = node.instance {
                out.push(instance);
            }
            continue;
        }
        let mut children = eng.arena.child_chain(id);
        children.reverse();
        stack.extend(children);
    }
    out
}

/// The nearest host instance above `fiber` (or the root container).
fn find_host_parent(eng: &Engine, fiber: NodeId) -> Option<InstanceId> {
    let mut cursor = eng.arena.node(fiber).parent;
    while let Some(id) = cursor {
        let node = eng.arena.node(id);
        match &node.tag {
            WorkTag::HostElement(_) => return node.instance,
            WorkTag::HostRoot => return Some(eng.root.container),
            _ => cursor = node.parent,
        }
    }
    None
}

/// The next host sibling that is itself stable (not being placed this
/// commit), used as the insertion reference point. `None` means append.
fn find_host_sibling(eng: &Engine, fiber: NodeId) -> Option<InstanceId> {
    let mut node = fiber;
    'search: loop {
        // Climb until a sibling exists; crossing a host boundary means there
        // is nothing to insert before.
        while eng.arena.node(node).sibling.is_none() {
            let parent = eng.arena.node(node).parent?;
            if matches!(
                eng.arena.node(parent).tag,
                WorkTag::HostElement(_) | WorkTag::HostRoot
            ) {
                return None;
            }
            node = parent;
        }
        node = eng.arena.node(node).sibling.expect("sibling checked above");

        // Descend to a concrete host node.
        while !eng.arena.node(node).tag.is_host() {
            if eng.arena.node(node).flags.contains(NodeFlags::PLACEMENT) {
                continue 'search;
            }
            match eng.arena.node(node).child {
                Some(child) => node = child,
                None => continue 'search,
            }
        }

        if !eng.arena.node(node).flags.contains(NodeFlags::PLACEMENT) {
            return eng.arena.node(node).instance;
        }
    }
}

/// Insert every top-level host node of `fiber`'s subtree at the reference
/// point.
fn insert_or_append(eng: &mut Engine, fiber: NodeId, parent: InstanceId, before: Option<InstanceId>) {
    let node = eng.arena.node(fiber);
    if node.tag.is_host() {
        let Some(instance) = node.instance else {
            tracing::warn!("placed host node has no instance; skipping");
            return;
        };
        match before {
            Some(reference) => eng.host.insert_before(parent, instance, reference),
            None => eng.host.append_child(parent, instance),
        }
        return;
    }
    for child in eng.arena.child_chain(fiber) {
        insert_or_append(eng, child, parent, before);
    }
}

// ---------------------------------------------------------------------------
// Updates and refs
// ---------------------------------------------------------------------------

fn commit_update(eng: &mut Engine, fiber: NodeId) {
    let node = eng.arena.node(fiber);
    let Some(instance) = node.instance else {
        return;
    };
    match &node.tag {
        WorkTag::HostText => {
            if let Some(content) = node.pending_props.as_text().cloned() {
                eng.host.commit_text_update(instance, &content);
            }
        }
        WorkTag::HostElement(_) => {
            if let Some(props) = node.pending_props.as_props().cloned() {
                eng.host.commit_props_update(instance, &props);
            }
        }
        other => {
            tracing::warn!(tag = ?other, "update flag on a non-host node; ignoring");
        }
    }
}

fn commit_ref_attach(eng: &mut Engine, fiber: NodeId) {
    let node = eng.arena.node(fiber);
    let instance = node.instance;
    let new_ref = node.node_ref.clone();
    let old_ref = node
        .alternate
        .and_then(|alt| eng.arena.get(alt))
        .and_then(|alt| alt.node_ref.clone());
    if let (Some(old), Some(new)) = (&old_ref, &new_ref) {
        if !old.same(new) {
            old.clear();
        }
    }
    if let (Some(node_ref), Some(instance)) = (new_ref, instance) {
        node_ref.set(instance);
    }
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

/// Tear down and remove one deleted subtree.
///
/// Unmount-phase teardown runs synchronously, strictly before any host node
/// is removed. Host removal batches one `remove_child` per contiguous
/// top-level host run rather than one per node. Finally both buffers of the
/// subtree are detached from the arena.
fn commit_deletion(engine: &Rc<RefCell<Engine>>, parent: NodeId, deleted: NodeId) {
    let (cleanups, host_roots, host_parent) = {
        let mut eng = engine.borrow_mut();
        let eng = &mut *eng;
        let mut cleanups: Vec<Cleanup> = Vec::new();
        let mut host_roots: Vec<InstanceId> = Vec::new();
        collect_deletion_effects(eng, deleted, false, &mut cleanups, &mut host_roots);
        let host_parent = find_host_parent(eng, deleted)
            .or_else(|| find_host_parent(eng, parent))
            .unwrap_or(eng.root.container);
        (cleanups, host_roots, host_parent)
    };

    // Teardown is user code: run it with the engine released.
    for cleanup in cleanups {
        cleanup.run();
    }

    let mut eng = engine.borrow_mut();
    let eng = &mut *eng;
    for instance in host_roots {
        eng.host.remove_child(host_parent, instance);
    }
    eng.arena.remove_subtree(deleted);
}

/// Depth-first sweep of a doomed subtree: take every effect teardown, clear
/// refs, and record the top-level host instances for batched removal.
fn collect_deletion_effects(
    eng: &mut Engine,
    fiber: NodeId,
    inside_host: bool,
    cleanups: &mut Vec<Cleanup>,
    host_roots: &mut Vec<InstanceId>,
) {
    let mut next_inside_host = inside_host;
    {
        let node = eng.arena.node_mut(fiber);
        if let Some(node_ref) = &node.node_ref {
            node_ref.clear();
        }
        match &node.tag {
            WorkTag::FunctionComponent(_) | WorkTag::MemoComponent(_) => {
                if let Some(hooks) = node.hooks_mut() {
                    for hook in hooks {
                        if let HookState::Effect(cell) = &mut hook.state {
                            if let Some(cleanup) = cell.cleanup.take() {
                                cleanups.push(cleanup);
                            }
                        }
                    }
                }
            }
            WorkTag::HostElement(_) | WorkTag::HostText => {
                if !inside_host {
                    if let Some(instance) = node.instance {
                        host_roots.push(instance);
                    }
                }
                next_inside_host = true;
            }
            _ => {}
        }
    }
    for child in eng.arena.child_chain(fiber) {
        collect_deletion_effects(eng, child, next_inside_host, cleanups, host_roots);
    }
}

// ---------------------------------------------------------------------------
// Passive effects
// ---------------------------------------------------------------------------

/// Flush the root's deferred-effect backlog: every pending teardown across
/// the batch first, then every pending setup, so no teardown can observe a
/// sibling's freshly created state.
pub(crate) fn flush_passive_effects(engine: &Rc<RefCell<Engine>>) {
    let entries: Vec<NodeId> = {
        let mut eng = engine.borrow_mut();
        eng.root.passive_scheduled = false;
        let mut seen = HashSet::new();
        eng.root
            .passive_backlog
            .drain(..)
            .filter(|id| seen.insert(*id))
            .collect()
    };
    if entries.is_empty() {
        return;
    }

    // Pass 1: teardown.
    let teardowns: Vec<Cleanup> = {
        let mut eng = engine.borrow_mut();
        let mut out = Vec::new();
        for &fiber in &entries {
            let Some(node) = eng.arena.get_mut(fiber) else {
                continue;
            };
            if let Some(hooks) = node.hooks_mut() {
                for hook in hooks {
                    if let HookState::Effect(cell) = &mut hook.state {
                        if cell.pending {
                            if let Some(cleanup) = cell.cleanup.take() {
                                out.push(cleanup);
                            }
                        }
                    }
                }
            }
        }
        out
    };
    for cleanup in teardowns {
        cleanup.run();
    }

    // Pass 2: setup. Creation closures may dispatch new updates, which
    // re-enter the work loop at their own priority.
    let setups: Vec<(NodeId, usize, Rc<dyn Fn() -> Option<Cleanup>>)> = {
        let eng = engine.borrow();
        let mut out = Vec::new();
        for &fiber in &entries {
            let Some(node) = eng.arena.get(fiber) else {
                continue;
            };
            if let Some(hooks) = node.hooks() {
                for (index, hook) in hooks.iter().enumerate() {
                    if let HookState::Effect(cell) = &hook.state {
                        if cell.pending {
                            out.push((fiber, index, cell.create.clone()));
                        }
                    }
                }
            }
        }
        out
    };
    let count = setups.len();
    for (fiber, index, create) in setups {
        let cleanup = (*create)();
        let mut eng = engine.borrow_mut();
        if let Some(node) = eng.arena.get_mut(fiber) {
            if let Some(hooks) = node.hooks_mut() {
                if let Some(hook) = hooks.get_mut(index) {
                    if let HookState::Effect(cell) = &mut hook.state {
                        cell.cleanup = cleanup;
                        cell.pending = false;
                    }
                }
            }
        }
    }
    tracing::debug!(effects = count, "flushed passive effects");

    // Effects may have scheduled more work.
    work_loop::ensure_root_scheduled(engine);
}
