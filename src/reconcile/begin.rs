//! Begin phase: walk down the in-progress tree, deciding per node whether to
//! re-render, reuse, or skip an entire subtree.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::context::ContextId;
use crate::element::{view_from_children, PropValue, View};
use crate::engine::Engine;
use crate::fiber::flags::NodeFlags;
use crate::fiber::node::{NodeId, NodeState, WorkTag};
use crate::hooks::render_with_hooks;
use crate::reconcile::reconcile_children;
use crate::schedule::Lanes;
use crate::update_queue::{process_updates, StateCell};

/// Process one unit of work: returns the first child to descend into, or
/// `None` when this subtree is finished (complete phase takes over).
pub(crate) fn begin_work(engine: &Rc<RefCell<Engine>>, wip: NodeId) -> Option<NodeId> {
    let render_lanes = engine.borrow().render_lanes;

    // Bailout check against the committed buffer.
    {
        let mut eng = engine.borrow_mut();
        let eng = &mut *eng;
        eng.did_receive_update = false;
        let summary = {
            let node = eng.arena.node(wip);
            node.alternate.map(|current| {
                let cur = eng.arena.node(current);
                let provider = match &node.tag {
                    WorkTag::ContextProvider(context) => Some(*context),
                    _ => None,
                };
                (
                    !cur.memoized_props.same_ref(&node.pending_props),
                    !cur.tag.same(&node.tag),
                    cur.lanes,
                    provider,
                )
            })
        };
        if let Some((props_changed, type_changed, current_lanes, provider)) = summary {
            if props_changed || type_changed {
                eng.did_receive_update = true;
            } else if !current_lanes.intersects(render_lanes) {
                // Unchanged props, no pending work at this priority: skip the
                // render entirely. Providers still re-push their committed
                // value so descendants (and the complete-phase pop) stay
                // balanced.
                if let Some(context) = provider {
                    if let Some(value) = provider_value(eng, wip) {
                        eng.context_stack.push(context, value);
                    }
                }
                return bailout(eng, wip, render_lanes);
            }
        }
        eng.arena.node_mut(wip).lanes = Lanes::NONE;
    }

    let tag = engine.borrow().arena.node(wip).tag.clone();
    match tag {
        WorkTag::HostRoot => update_host_root(engine, wip, render_lanes),
        WorkTag::HostElement(_) => {
            let mut eng = engine.borrow_mut();
            update_host_element(&mut eng, wip)
        }
        WorkTag::HostText => None,
        WorkTag::FunctionComponent(component) => {
            update_function_component(engine, wip, &component, render_lanes)
        }
        WorkTag::MemoComponent(component) => {
            update_memo_component(engine, wip, &component, render_lanes)
        }
        WorkTag::Fragment => {
            let mut eng = engine.borrow_mut();
            update_fragment(&mut eng, wip, render_lanes)
        }
        WorkTag::ContextProvider(context) => {
            let mut eng = engine.borrow_mut();
            update_provider(&mut eng, wip, context, render_lanes)
        }
    }
}

/// Skip re-rendering a node whose inputs cannot have changed. If nothing in
/// the subtree is scheduled either, the walk skips the whole subtree;
/// otherwise the previous children are cloned and the walk continues below.
fn bailout(eng: &mut Engine, wip: NodeId, render_lanes: Lanes) -> Option<NodeId> {
    if !eng.arena.node(wip).child_lanes.intersects(render_lanes) {
        tracing::trace!(node = ?eng.arena.node(wip).tag, "bailout: skipping subtree");
        return None;
    }
    tracing::trace!(node = ?eng.arena.node(wip).tag, "bailout: reusing node, descending");
    clone_child_fibers(eng, wip);
    eng.arena.node(wip).child
}

/// Clone the committed child chain into in-progress buffers under `wip`.
fn clone_child_fibers(eng: &mut Engine, wip: NodeId) {
    let Some(first) = eng.arena.node(wip).child else {
        return;
    };
    let mut cursor = Some(first);
    let mut prev_new: Option<NodeId> = None;
    while let Some(child) = cursor {
        let (pending, sibling) = {
            let node = eng.arena.node(child);
            (node.pending_props.clone(), node.sibling)
        };
        let new_child = eng.arena.create_work_in_progress(child, pending);
        eng.arena.node_mut(new_child).parent = Some(wip);
        match prev_new {
            None => eng.arena.node_mut(wip).child = Some(new_child),
            Some(prev) => eng.arena.node_mut(prev).sibling = Some(new_child),
        }
        prev_new = Some(new_child);
        cursor = sibling;
    }
}

// ---------------------------------------------------------------------------
// Per-tag begin paths
// ---------------------------------------------------------------------------

fn update_host_root(
    engine: &Rc<RefCell<Engine>>,
    wip: NodeId,
    render_lanes: Lanes,
) -> Option<NodeId> {
    let mut eng = engine.borrow_mut();
    let eng = &mut *eng;

    let (previous, next): (Rc<dyn Any>, Rc<dyn Any>) = {
        let node = eng.arena.node_mut(wip);
        let NodeState::Root(cell) = &mut node.state else {
            unreachable!("host root carries root state");
        };
        let previous = cell.memoized.clone();
        let processed = process_updates(cell, render_lanes);
        let next = processed.memoized.clone();
        *cell = StateCell {
            memoized: processed.memoized,
            base_state: processed.base_state,
            base_queue: processed.base_queue,
            queue: cell.queue.clone(),
        };
        if !processed.skipped.is_empty() {
            node.lanes |= processed.skipped;
        }
        (previous, next)
    };

    if Rc::ptr_eq(&previous, &next) {
        return bailout(eng, wip, render_lanes);
    }
    let view = next
        .downcast_ref::<View>()
        .expect("root state is a view")
        .clone();
    reconcile_children(eng, wip, &view);
    eng.arena.node(wip).child
}

fn update_host_element(eng: &mut Engine, wip: NodeId) -> Option<NodeId> {
    mark_ref(eng, wip);
    let view = {
        let node = eng.arena.node(wip);
        match node.pending_props.as_props() {
            Some(props) => view_from_children(props.children()),
            None => View::Nothing,
        }
    };
    reconcile_children(eng, wip, &view);
    eng.arena.node(wip).child
}

fn update_function_component(
    engine: &Rc<RefCell<Engine>>,
    wip: NodeId,
    component: &crate::element::Component,
    render_lanes: Lanes,
) -> Option<NodeId> {
    let props = {
        let eng = engine.borrow();
        match eng.arena.node(wip).pending_props.as_props() {
            Some(props) => props.clone(),
            None => Rc::new(crate::element::Props::new()),
        }
    };
    let view = render_with_hooks(engine, wip, component, props, render_lanes);

    let mut eng = engine.borrow_mut();
    let eng = &mut *eng;
    let has_current = eng.arena.node(wip).alternate.is_some();
    if has_current && !eng.did_receive_update {
        // The state replay produced the same values: discard this render's
        // effect scheduling and reuse the previous children.
        let node = eng.arena.node_mut(wip);
        if let Some(hooks) = node.hooks_mut() {
            for hook in hooks {
                if let crate::hooks::HookState::Effect(cell) = &mut hook.state {
                    cell.pending = false;
                }
            }
        }
        node.flags.remove(NodeFlags::PASSIVE);
        return bailout(eng, wip, render_lanes);
    }
    reconcile_children(eng, wip, &view);
    eng.arena.node(wip).child
}

fn update_memo_component(
    engine: &Rc<RefCell<Engine>>,
    wip: NodeId,
    component: &crate::element::Component,
    render_lanes: Lanes,
) -> Option<NodeId> {
    let can_bail = {
        let eng = engine.borrow();
        let node = eng.arena.node(wip);
        match node.alternate {
            Some(current) => {
                let cur = eng.arena.node(current);
                let props_equal = match (cur.memoized_props.as_props(), node.pending_props.as_props())
                {
                    (Some(prev), Some(next)) => prev.shallow_eq(next),
                    _ => false,
                };
                props_equal && !cur.lanes.intersects(render_lanes)
            }
            None => false,
        }
    };
    if can_bail {
        tracing::trace!(component = component.name(), "memo props shallow-equal; bailing out");
        let mut eng = engine.borrow_mut();
        return bailout(&mut eng, wip, render_lanes);
    }
    update_function_component(engine, wip, component, render_lanes)
}

fn update_fragment(eng: &mut Engine, wip: NodeId, _render_lanes: Lanes) -> Option<NodeId> {
    let view = {
        let node = eng.arena.node(wip);
        match node.pending_props.as_list() {
            Some(list) => view_from_children(list),
            None => View::Nothing,
        }
    };
    reconcile_children(eng, wip, &view);
    eng.arena.node(wip).child
}

fn update_provider(
    eng: &mut Engine,
    wip: NodeId,
    context: ContextId,
    render_lanes: Lanes,
) -> Option<NodeId> {
    let Some(value) = provider_value(eng, wip) else {
        // A provider without a value attr renders nothing rather than
        // aborting the walk.
        tracing::warn!(?context, "provider element missing value; rendering nothing");
        reconcile_children(eng, wip, &View::Nothing);
        return eng.arena.node(wip).child;
    };

    // A changed value invalidates every committed dependent below.
    if let Some(current) = eng.arena.node(wip).alternate {
        if let Some(old_value) = provider_value_of(eng, current) {
            if !Rc::ptr_eq(&old_value, &value) {
                propagate_context_change(eng, wip, context, render_lanes);
            }
        }
    }

    eng.context_stack.push(context, value);

    let view = {
        let node = eng.arena.node(wip);
        match node.pending_props.as_props() {
            Some(props) => view_from_children(props.children()),
            None => View::Nothing,
        }
    };
    reconcile_children(eng, wip, &view);
    eng.arena.node(wip).child
}

/// Host elements raise a ref flag when a ref is introduced or its identity
/// changes between renders.
fn mark_ref(eng: &mut Engine, wip: NodeId) {
    let needs_flag = {
        let node = eng.arena.node(wip);
        match (&node.node_ref, node.alternate) {
            (Some(_), None) => true,
            (Some(new_ref), Some(current)) => match &eng.arena.node(current).node_ref {
                Some(old_ref) => !old_ref.same(new_ref),
                None => true,
            },
            (None, _) => false,
        }
    };
    if needs_flag {
        eng.arena.node_mut(wip).flags.insert(NodeFlags::REF);
    }
}

/// The value a provider node is carrying this render.
fn provider_value(eng: &Engine, wip: NodeId) -> Option<Rc<dyn Any>> {
    provider_value_of(eng, wip)
}

fn provider_value_of(eng: &Engine, node: NodeId) -> Option<Rc<dyn Any>> {
    let node = eng.arena.node(node);
    let props = node.pending_props.as_props()?;
    match props.attr(crate::context::VALUE_ATTR) {
        Some(PropValue::Shared(value)) => Some(value.clone()),
        _ => None,
    }
}

/// Mark every committed descendant that reads `context` so it renders at
/// `render_lanes` instead of bailing out, bubbling child lanes up to the
/// provider.
fn propagate_context_change(
    eng: &mut Engine,
    provider: NodeId,
    context: ContextId,
    render_lanes: Lanes,
) {
    let mut stack: Vec<NodeId> = Vec::new();
    if let Some(first) = eng.arena.node(provider).child {
        let mut cursor = Some(first);
        while let Some(id) = cursor {
            stack.push(id);
            cursor = eng.arena.node(id).sibling;
        }
    }

    while let Some(id) = stack.pop() {
        let node = eng.arena.node(id);
        // A nested provider of the same context shadows this one; its
        // subtree reads the inner value and is not invalidated here.
        if matches!(&node.tag, WorkTag::ContextProvider(inner) if *inner == context) {
            continue;
        }
        let depends = node.deps.as_ref().is_some_and(|d| d.depends_on(context));
        let first_child = node.child;

        if depends {
            mark_dependent(eng, id, provider, render_lanes);
        }
        let mut cursor = first_child;
        while let Some(child) = cursor {
            stack.push(child);
            cursor = eng.arena.node(child).sibling;
        }
    }
}

fn mark_dependent(eng: &mut Engine, dependent: NodeId, provider: NodeId, render_lanes: Lanes) {
    let provider_alternate = eng.arena.node(provider).alternate;
    {
        let node = eng.arena.node_mut(dependent);
        node.lanes |= render_lanes;
        if let Some(deps) = node.deps.as_mut() {
            deps.lanes |= render_lanes;
        }
        let alternate = node.alternate;
        if let Some(alt) = alternate {
            if let Some(alt_node) = eng.arena.get_mut(alt) {
                alt_node.lanes |= render_lanes;
            }
        }
    }
    // Bubble child lanes up to (but not past) the provider; the walked chain
    // may pass through either of the provider's two buffers.
    let mut cursor = eng.arena.node(dependent).parent;
    while let Some(id) = cursor {
        let node = eng.arena.node_mut(id);
        node.child_lanes |= render_lanes;
        let alternate = node.alternate;
        let parent = node.parent;
        if let Some(alt) = alternate {
            if let Some(alt_node) = eng.arena.get_mut(alt) {
                alt_node.child_lanes |= render_lanes;
            }
        }
        if id == provider || Some(id) == provider_alternate {
            break;
        }
        cursor = parent;
    }
}
