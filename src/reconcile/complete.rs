//! Complete phase: walk back up the in-progress tree, marking commit-time
//! updates and bubbling effect flags and pending lanes toward the root.
//!
//! No host-adapter call happens here — instance creation and mutation are
//! the commit engine's job. Completing a node only records what commit must
//! do and makes `subtree_flags` a superset of every descendant flag.

use crate::engine::Engine;
use crate::fiber::flags::NodeFlags;
use crate::fiber::node::{NodeId, WorkTag};
use crate::schedule::Lanes;

pub(crate) fn complete_work(eng: &mut Engine, wip: NodeId) {
    let tag = eng.arena.node(wip).tag.clone();
    match tag {
        WorkTag::HostElement(_) => {
            let needs_update = {
                let node = eng.arena.node(wip);
                match (node.alternate, node.instance) {
                    (Some(current), Some(_)) => {
                        // Props identity changed; the adapter re-applies them
                        // at commit.
                        !eng.arena
                            .node(current)
                            .memoized_props
                            .same_ref(&node.pending_props)
                    }
                    _ => false,
                }
            };
            if needs_update {
                eng.arena.node_mut(wip).flags.insert(NodeFlags::UPDATE);
            }
            bubble_flags(eng, wip);
        }
        WorkTag::HostText => {
            let needs_update = {
                let node = eng.arena.node(wip);
                match (node.alternate, node.instance) {
                    (Some(current), Some(_)) => {
                        let old = eng.arena.node(current).memoized_props.as_text().cloned();
                        let new = node.pending_props.as_text().cloned();
                        old != new
                    }
                    _ => false,
                }
            };
            if needs_update {
                eng.arena.node_mut(wip).flags.insert(NodeFlags::UPDATE);
            }
            bubble_flags(eng, wip);
        }
        WorkTag::ContextProvider(context) => {
            eng.context_stack.pop(context);
            bubble_flags(eng, wip);
        }
        WorkTag::HostRoot
        | WorkTag::FunctionComponent(_)
        | WorkTag::MemoComponent(_)
        | WorkTag::Fragment => {
            bubble_flags(eng, wip);
        }
    }
}

/// OR every child's flags and lanes into this node's subtree bookkeeping and
/// reattach child parent links to the in-progress buffer.
fn bubble_flags(eng: &mut Engine, wip: NodeId) {
    let mut subtree = NodeFlags::NONE;
    let mut child_lanes = Lanes::NONE;
    let mut cursor = eng.arena.node(wip).child;
    while let Some(child) = cursor {
        let node = eng.arena.node_mut(child);
        subtree |= node.subtree_flags | node.flags;
        child_lanes |= node.child_lanes | node.lanes;
        node.parent = Some(wip);
        cursor = node.sibling;
    }
    let node = eng.arena.node_mut(wip);
    node.subtree_flags |= subtree;
    node.child_lanes = child_lanes;
}
