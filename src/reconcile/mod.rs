//! The reconciler: dual-tree diffing over old child chains and new
//! descriptors, plus the begin/complete phases that drive it.
//!
//! [`reconcile_children`] computes the new child chain for one position:
//! single-element, text, keyed-array and fragment paths, with deletions
//! recorded on the parent. Effect tracking is off during a subtree's first
//! mount — only the subtree root gets a placement flag, so the whole fresh
//! tree is appended to the host once.

pub(crate) mod begin;
pub(crate) mod complete;

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::element::{view_from_children, Element, ElementKind, Key, View};
use crate::engine::Engine;
use crate::fiber::flags::NodeFlags;
use crate::fiber::node::{NodeId, PropsSlot, WorkTag};

/// Key a child is filed under in the keyed-array map: its explicit key, or
/// its old position when unkeyed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum MapKey {
    Key(Key),
    Index(u32),
}

/// Diff one position's old child chain against a new descriptor and install
/// the resulting chain on `parent`.
pub(crate) fn reconcile_children(eng: &mut Engine, parent: NodeId, new_child: &View) {
    let current = eng.arena.node(parent).alternate;
    let current_first = current.and_then(|c| eng.arena.node(c).child);
    let reconciler = ChildReconciler {
        track_effects: current.is_some(),
    };
    let first = reconciler.reconcile(eng, parent, current_first, new_child);
    eng.arena.node_mut(parent).child = first;
}

/// The child diff, parameterized on whether effects (placements, deletions)
/// are recorded. Mount passes don't track: the freshly created subtree is
/// placed once at its root.
struct ChildReconciler {
    track_effects: bool,
}

impl ChildReconciler {
    fn reconcile(
        &self,
        eng: &mut Engine,
        parent: NodeId,
        current_first: Option<NodeId>,
        new_child: &View,
    ) -> Option<NodeId> {
        // An unkeyed top-level fragment is transparent: diff its children in
        // place of the fragment itself.
        let unwrapped;
        let new_child = match new_child {
            View::Element(el)
                if matches!(el.kind(), ElementKind::Fragment) && el.key().is_none() =>
            {
                unwrapped = view_from_children(el.props().children());
                &unwrapped
            }
            other => other,
        };

        match new_child {
            View::Element(element) => {
                let node = self.reconcile_single_element(eng, parent, current_first, element);
                Some(self.place_single(eng, node))
            }
            View::Text(content) => {
                let node = self.reconcile_single_text(eng, parent, current_first, content);
                Some(self.place_single(eng, node))
            }
            View::Many(items) => self.reconcile_array(eng, parent, current_first, items),
            View::Nothing => {
                self.delete_remaining(eng, parent, current_first);
                None
            }
        }
    }

    // -- single-child path --------------------------------------------------

    fn reconcile_single_element(
        &self,
        eng: &mut Engine,
        parent: NodeId,
        current_first: Option<NodeId>,
        element: &Element,
    ) -> NodeId {
        let mut cursor = current_first;
        while let Some(current) = cursor {
            let (key_matches, type_matches, sibling) = {
                let node = eng.arena.node(current);
                (
                    node.key.as_ref() == element.key(),
                    node.tag.matches_element(element.kind()),
                    node.sibling,
                )
            };
            if key_matches {
                if type_matches {
                    // Reusable; every remaining old sibling is obsolete.
                    let reused = self.reuse(eng, current, PropsSlot::for_element(element));
                    eng.arena.node_mut(reused).parent = Some(parent);
                    eng.arena.node_mut(reused).node_ref = element.node_ref().cloned();
                    self.delete_remaining(eng, parent, sibling);
                    return reused;
                }
                // Same key, different type: nothing further down can match.
                self.delete_remaining(eng, parent, Some(current));
                break;
            }
            self.delete_child(eng, parent, current);
            cursor = sibling;
        }
        let fresh = eng.arena.create_from_element(element);
        eng.arena.node_mut(fresh).parent = Some(parent);
        fresh
    }

    fn reconcile_single_text(
        &self,
        eng: &mut Engine,
        parent: NodeId,
        current_first: Option<NodeId>,
        content: &Rc<str>,
    ) -> NodeId {
        let mut cursor = current_first;
        while let Some(current) = cursor {
            let (is_text, sibling) = {
                let node = eng.arena.node(current);
                (matches!(node.tag, WorkTag::HostText), node.sibling)
            };
            if is_text {
                // Content changes reuse the node; only an update is flagged.
                let reused = self.reuse(eng, current, PropsSlot::Text(content.clone()));
                eng.arena.node_mut(reused).parent = Some(parent);
                self.delete_remaining(eng, parent, sibling);
                return reused;
            }
            self.delete_child(eng, parent, current);
            cursor = sibling;
        }
        let fresh = eng.arena.create_text(content.clone());
        eng.arena.node_mut(fresh).parent = Some(parent);
        fresh
    }

    /// Flag a single reconciled child for placement when it was created
    /// fresh during an update. Mount leaves it unflagged — the parent's own
    /// placement appends the whole subtree.
    fn place_single(&self, eng: &mut Engine, node: NodeId) -> NodeId {
        if self.track_effects && eng.arena.node(node).alternate.is_none() {
            eng.arena.node_mut(node).flags.insert(NodeFlags::PLACEMENT);
        }
        node
    }

    // -- keyed array path ---------------------------------------------------

    fn reconcile_array(
        &self,
        eng: &mut Engine,
        parent: NodeId,
        current_first: Option<NodeId>,
        items: &[View],
    ) -> Option<NodeId> {
        // Index the old chain by key (positional fallback).
        let mut existing: BTreeMap<MapKey, NodeId> = BTreeMap::new();
        let mut cursor = current_first;
        while let Some(current) = cursor {
            let node = eng.arena.node(current);
            let map_key = match &node.key {
                Some(key) => MapKey::Key(key.clone()),
                None => MapKey::Index(node.index),
            };
            cursor = node.sibling;
            existing.insert(map_key, current);
        }

        // Walk the new items left to right, reusing by key where possible.
        let mut first_new: Option<NodeId> = None;
        let mut prev_new: Option<NodeId> = None;
        let mut slots: Vec<(NodeId, Option<u32>)> = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let Some(new_node) = self.update_from_map(eng, &mut existing, i as u32, item) else {
                continue;
            };
            let old_index = eng
                .arena
                .node(new_node)
                .alternate
                .map(|alt| eng.arena.node(alt).index);
            {
                let node = eng.arena.node_mut(new_node);
                node.index = i as u32;
                node.parent = Some(parent);
            }
            match prev_new {
                None => first_new = Some(new_node),
                Some(prev) => eng.arena.node_mut(prev).sibling = Some(new_node),
            }
            prev_new = Some(new_node);
            slots.push((new_node, old_index));
        }

        // Old nodes never consulted are gone.
        for (_, stale) in existing {
            self.delete_child(eng, parent, stale);
        }

        if self.track_effects {
            self.mark_moves(eng, &slots);
        }
        first_new
    }

    /// Flag placements for an updated keyed list: fresh nodes always move,
    /// and reused nodes move unless their old indices form part of the
    /// longest increasing run (minimal-move reordering).
    fn mark_moves(&self, eng: &mut Engine, slots: &[(NodeId, Option<u32>)]) {
        let reused: Vec<(usize, u32)> = slots
            .iter()
            .enumerate()
            .filter_map(|(slot, (_, old))| old.map(|o| (slot, o)))
            .collect();
        let old_indices: Vec<u32> = reused.iter().map(|(_, o)| *o).collect();
        let stable = longest_increasing_run(&old_indices);
        let stable_slots: std::collections::HashSet<usize> =
            stable.iter().map(|&i| reused[i].0).collect();

        for (slot, (node, old_index)) in slots.iter().enumerate() {
            let moved = match old_index {
                None => true,
                Some(_) => !stable_slots.contains(&slot),
            };
            if moved {
                eng.arena.node_mut(*node).flags.insert(NodeFlags::PLACEMENT);
            }
        }
    }

    fn update_from_map(
        &self,
        eng: &mut Engine,
        existing: &mut BTreeMap<MapKey, NodeId>,
        index: u32,
        item: &View,
    ) -> Option<NodeId> {
        match item {
            View::Text(content) => {
                let map_key = MapKey::Index(index);
                if let Some(&before) = existing.get(&map_key) {
                    if matches!(eng.arena.node(before).tag, WorkTag::HostText) {
                        existing.remove(&map_key);
                        return Some(self.reuse(eng, before, PropsSlot::Text(content.clone())));
                    }
                }
                Some(eng.arena.create_text(content.clone()))
            }
            View::Element(element) => {
                let map_key = match element.key() {
                    Some(key) => MapKey::Key(key.clone()),
                    None => MapKey::Index(index),
                };
                if matches!(element.kind(), ElementKind::Fragment) {
                    return self.update_fragment_slot(
                        eng,
                        existing,
                        map_key,
                        element.props().children(),
                        element.key().cloned(),
                    );
                }
                if let Some(&before) = existing.get(&map_key) {
                    if eng.arena.node(before).tag.matches_element(element.kind()) {
                        existing.remove(&map_key);
                        let reused = self.reuse(eng, before, PropsSlot::for_element(element));
                        eng.arena.node_mut(reused).node_ref = element.node_ref().cloned();
                        return Some(reused);
                    }
                }
                Some(eng.arena.create_from_element(element))
            }
            // A nested array stands in for an unkeyed fragment at this slot.
            View::Many(nested) => {
                self.update_fragment_slot(eng, existing, MapKey::Index(index), nested, None)
            }
            View::Nothing => None,
        }
    }

    fn update_fragment_slot(
        &self,
        eng: &mut Engine,
        existing: &mut BTreeMap<MapKey, NodeId>,
        map_key: MapKey,
        children: &[View],
        key: Option<Key>,
    ) -> Option<NodeId> {
        let list = Rc::new(children.to_vec());
        if let Some(&before) = existing.get(&map_key) {
            if matches!(eng.arena.node(before).tag, WorkTag::Fragment) {
                existing.remove(&map_key);
                return Some(self.reuse(eng, before, PropsSlot::List(list)));
            }
        }
        Some(eng.arena.create_fragment(list, key))
    }

    // -- shared helpers -----------------------------------------------------

    /// Clone a reusable node into its in-progress buffer, detached from any
    /// previous chain position.
    fn reuse(&self, eng: &mut Engine, node: NodeId, pending: PropsSlot) -> NodeId {
        let wip = eng.arena.create_work_in_progress(node, pending);
        let n = eng.arena.node_mut(wip);
        n.index = 0;
        n.sibling = None;
        wip
    }

    fn delete_child(&self, eng: &mut Engine, parent: NodeId, child: NodeId) {
        if !self.track_effects {
            return;
        }
        let node = eng.arena.node_mut(parent);
        node.deletions.push(child);
        node.flags.insert(NodeFlags::CHILD_DELETION);
    }

    fn delete_remaining(&self, eng: &mut Engine, parent: NodeId, first: Option<NodeId>) {
        if !self.track_effects {
            return;
        }
        let mut cursor = first;
        while let Some(child) = cursor {
            let sibling = eng.arena.node(child).sibling;
            self.delete_child(eng, parent, child);
            cursor = sibling;
        }
    }
}

/// Positions within `seq` forming a longest strictly-increasing subsequence.
///
/// Keyed reorders flag only nodes outside this run, so `[a, b, c]` becoming
/// `[c, a, b]` moves exactly one node rather than two.
fn longest_increasing_run(seq: &[u32]) -> Vec<usize> {
    if seq.is_empty() {
        return Vec::new();
    }
    // Patience sorting: tails[k] is the index of the smallest tail of any
    // increasing subsequence of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &value) in seq.iter().enumerate() {
        let pos = tails.partition_point(|&t| seq[t] < value);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }
    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        run.push(i);
        cursor = prev[i];
    }
    run.reverse();
    run
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lis_of_sorted_is_everything() {
        assert_eq!(longest_increasing_run(&[0, 1, 2, 3]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn lis_of_reverse_is_single() {
        assert_eq!(longest_increasing_run(&[3, 2, 1, 0]).len(), 1);
    }

    #[test]
    fn lis_rotation_keeps_long_tail() {
        // Old order [a=0, b=1, c=2] rendered as [c, a, b]: indices [2, 0, 1].
        // The stable run is [0, 1] (positions 1 and 2); c moves.
        assert_eq!(longest_increasing_run(&[2, 0, 1]), vec![1, 2]);
    }

    #[test]
    fn lis_interleaved() {
        let run = longest_increasing_run(&[0, 4, 1, 2]);
        assert_eq!(run, vec![0, 2, 3]);
    }

    #[test]
    fn lis_empty() {
        assert!(longest_increasing_run(&[]).is_empty());
    }
}
