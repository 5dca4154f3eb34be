//! Arena of work nodes with double-buffer operations.
//!
//! All nodes of both tree buffers live in a single `SlotMap`; parent, child,
//! sibling and alternate relationships are id links, so promoting a finished
//! tree or dropping a subtree is id reassignment rather than pointer surgery.

use std::collections::VecDeque;
use std::rc::Rc;

use slotmap::SlotMap;

use crate::element::{Element, ElementKind, Key, View};
use crate::fiber::flags::NodeFlags;
use crate::fiber::node::{NodeId, PropsSlot, WorkNode, WorkTag};
use crate::schedule::Lanes;

/// The central work-node arena.
pub struct NodeArena {
    nodes: SlotMap<NodeId, WorkNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, node: WorkNode) -> NodeId {
        self.nodes.insert(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&WorkNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut WorkNode> {
        self.nodes.get_mut(id)
    }

    /// Immutable access to a node that must exist.
    ///
    /// # Panics
    ///
    /// Panics if `id` has been removed — internal callers only follow links
    /// of live trees.
    pub fn node(&self, id: NodeId) -> &WorkNode {
        self.nodes.get(id).expect("work node must exist")
    }

    /// Mutable access to a node that must exist.
    ///
    /// # Panics
    ///
    /// Panics if `id` has been removed.
    pub fn node_mut(&mut self, id: NodeId) -> &mut WorkNode {
        self.nodes.get_mut(id).expect("work node must exist")
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Collect a node's child chain in sibling order.
    pub fn child_chain(&self, parent: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.node(parent).child;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.node(id).sibling;
        }
        out
    }

    // -----------------------------------------------------------------------
    // Creation from descriptors
    // -----------------------------------------------------------------------

    /// Create a fresh node for an element descriptor.
    pub fn create_from_element(&mut self, element: &Element) -> NodeId {
        let tag = match element.kind() {
            ElementKind::Host(t) => WorkTag::HostElement(t.clone()),
            ElementKind::Component(c) => WorkTag::FunctionComponent(c.clone()),
            ElementKind::Memo(c) => WorkTag::MemoComponent(c.clone()),
            ElementKind::Fragment => WorkTag::Fragment,
            ElementKind::Provider(id) => WorkTag::ContextProvider(*id),
        };
        let mut node = WorkNode::new(tag, PropsSlot::for_element(element), element.key().cloned());
        node.node_ref = element.node_ref().cloned();
        self.insert(node)
    }

    /// Create a fresh text node.
    pub fn create_text(&mut self, content: Rc<str>) -> NodeId {
        self.insert(WorkNode::new(WorkTag::HostText, PropsSlot::Text(content), None))
    }

    /// Create a fresh fragment node for a (possibly keyed) child list.
    pub fn create_fragment(&mut self, children: Rc<Vec<View>>, key: Option<Key>) -> NodeId {
        self.insert(WorkNode::new(WorkTag::Fragment, PropsSlot::List(children), key))
    }

    // -----------------------------------------------------------------------
    // Double buffering
    // -----------------------------------------------------------------------

    /// Create or reuse the in-progress counterpart of `current`.
    ///
    /// At most one alternate exists per position: the first update after a
    /// mount creates it, every later update reuses it with reset effect
    /// bookkeeping. Render data is copied from `current` so the in-progress
    /// node starts as an exact clone apart from `pending_props`.
    pub fn create_work_in_progress(&mut self, current: NodeId, pending_props: PropsSlot) -> NodeId {
        let existing = self.node(current).alternate;
        match existing {
            Some(wip) => {
                let (tag, key, child, index, memoized_props, state, node_ref, instance, lanes, child_lanes, deps) = {
                    let cur = self.node(current);
                    (
                        cur.tag.clone(),
                        cur.key.clone(),
                        cur.child,
                        cur.index,
                        cur.memoized_props.clone(),
                        cur.state.clone(),
                        cur.node_ref.clone(),
                        cur.instance,
                        cur.lanes,
                        cur.child_lanes,
                        cur.deps.clone(),
                    )
                };
                let node = self.node_mut(wip);
                node.tag = tag;
                node.key = key;
                node.pending_props = pending_props;
                node.flags = NodeFlags::NONE;
                node.subtree_flags = NodeFlags::NONE;
                node.deletions.clear();
                node.parent = None;
                node.child = child;
                node.sibling = None;
                node.index = index;
                node.memoized_props = memoized_props;
                node.state = state;
                node.node_ref = node_ref;
                node.instance = instance;
                node.lanes = lanes;
                node.child_lanes = child_lanes;
                node.deps = deps;
                wip
            }
            None => {
                let mut node = {
                    let cur = self.node(current);
                    let mut node = WorkNode::new(cur.tag.clone(), pending_props, cur.key.clone());
                    node.child = cur.child;
                    node.index = cur.index;
                    node.memoized_props = cur.memoized_props.clone();
                    node.state = cur.state.clone();
                    node.node_ref = cur.node_ref.clone();
                    node.instance = cur.instance;
                    node.lanes = cur.lanes;
                    node.child_lanes = cur.child_lanes;
                    node.deps = cur.deps.clone();
                    node
                };
                node.alternate = Some(current);
                let wip = self.insert(node);
                self.node_mut(current).alternate = Some(wip);
                wip
            }
        }
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove a subtree (both buffers of every position) from the arena.
    ///
    /// The caller is responsible for having already torn down effects and
    /// host instances; this only breaks the node graph for collection.
    pub fn remove_subtree(&mut self, root: NodeId) {
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let mut cursor = node.child;
            let alternate = node.alternate;
            while let Some(child) = cursor {
                queue.push_back(child);
                cursor = self.nodes.get(child).and_then(|n| n.sibling);
            }
            if let Some(alt) = alternate {
                // The alternate mirrors this position; its children are the
                // other buffer of the same subtree.
                let mut alt_cursor = self.nodes.get(alt).and_then(|n| n.child);
                while let Some(child) = alt_cursor {
                    queue.push_back(child);
                    alt_cursor = self.nodes.get(child).and_then(|n| n.sibling);
                }
                self.nodes.remove(alt);
            }
            self.nodes.remove(id);
        }
    }

    /// Merge `lane` into a node, its alternate, and the `child_lanes` of
    /// every ancestor (both buffers), so a later walk can find the work.
    pub fn mark_update_lane(&mut self, fiber: NodeId, lane: Lanes) {
        if let Some(node) = self.nodes.get_mut(fiber) {
            node.lanes |= lane;
            let alternate = node.alternate;
            if let Some(alt) = alternate {
                if let Some(alt_node) = self.nodes.get_mut(alt) {
                    alt_node.lanes |= lane;
                }
            }
        }
        let mut cursor = self.nodes.get(fiber).and_then(|n| n.parent);
        while let Some(id) = cursor {
            let Some(node) = self.nodes.get_mut(id) else {
                break;
            };
            node.child_lanes |= lane;
            let alternate = node.alternate;
            let parent = node.parent;
            if let Some(alt) = alternate {
                if let Some(alt_node) = self.nodes.get_mut(alt) {
                    alt_node.child_lanes |= lane;
                }
            }
            cursor = parent;
        }
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Props;

    fn host(arena: &mut NodeArena, tag: &str) -> NodeId {
        arena.create_from_element(&Element::host(tag))
    }

    /// Build `root -> [a -> [c, d], b]` in a fresh arena.
    fn build_tree() -> (NodeArena, NodeId, NodeId, NodeId, NodeId, NodeId) {
        let mut arena = NodeArena::new();
        let root = host(&mut arena, "root");
        let a = host(&mut arena, "a");
        let b = host(&mut arena, "b");
        let c = host(&mut arena, "c");
        let d = host(&mut arena, "d");
        arena.node_mut(root).child = Some(a);
        arena.node_mut(a).parent = Some(root);
        arena.node_mut(a).sibling = Some(b);
        arena.node_mut(b).parent = Some(root);
        arena.node_mut(a).child = Some(c);
        arena.node_mut(c).parent = Some(a);
        arena.node_mut(c).sibling = Some(d);
        arena.node_mut(d).parent = Some(a);
        (arena, root, a, b, c, d)
    }

    #[test]
    fn create_from_element_maps_kinds() {
        let mut arena = NodeArena::new();
        let id = arena.create_from_element(&Element::host("div").with_key("k"));
        let node = arena.node(id);
        assert!(matches!(&node.tag, WorkTag::HostElement(t) if &**t == "div"));
        assert_eq!(node.key, Some(Key::from("k")));

        let frag = arena.create_from_element(&Element::fragment().with_child("x"));
        assert!(matches!(&arena.node(frag).tag, WorkTag::Fragment));
        assert!(matches!(&arena.node(frag).pending_props, PropsSlot::List(l) if l.len() == 1));
    }

    #[test]
    fn child_chain_collects_siblings() {
        let (arena, root, a, b, c, d) = build_tree();
        assert_eq!(arena.child_chain(root), vec![a, b]);
        assert_eq!(arena.child_chain(a), vec![c, d]);
        assert!(arena.child_chain(b).is_empty());
    }

    #[test]
    fn wip_creation_links_alternates() {
        let mut arena = NodeArena::new();
        let current = host(&mut arena, "div");
        let props = PropsSlot::Props(Rc::new(Props::new()));
        let wip = arena.create_work_in_progress(current, props.clone());
        assert_ne!(current, wip);
        assert_eq!(arena.node(current).alternate, Some(wip));
        assert_eq!(arena.node(wip).alternate, Some(current));

        // A second request reuses the same buffer.
        let again = arena.create_work_in_progress(current, props);
        assert_eq!(again, wip);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn wip_reuse_resets_effects() {
        let mut arena = NodeArena::new();
        let current = host(&mut arena, "div");
        let props = PropsSlot::Props(Rc::new(Props::new()));
        let wip = arena.create_work_in_progress(current, props.clone());
        {
            let node = arena.node_mut(wip);
            node.flags = NodeFlags::PLACEMENT;
            node.subtree_flags = NodeFlags::UPDATE;
            node.deletions.push(current);
        }
        let again = arena.create_work_in_progress(current, props);
        let node = arena.node(again);
        assert!(node.flags.is_empty());
        assert!(node.subtree_flags.is_empty());
        assert!(node.deletions.is_empty());
    }

    #[test]
    fn wip_copies_render_data() {
        let mut arena = NodeArena::new();
        let current = host(&mut arena, "div");
        arena.node_mut(current).index = 4;
        arena.node_mut(current).lanes = Lanes::IDLE;
        let wip = arena.create_work_in_progress(current, PropsSlot::Empty);
        assert_eq!(arena.node(wip).index, 4);
        assert_eq!(arena.node(wip).lanes, Lanes::IDLE);
    }

    #[test]
    fn remove_subtree_removes_both_buffers() {
        let (mut arena, _root, a, b, c, d) = build_tree();
        let wip_c = arena.create_work_in_progress(c, PropsSlot::Empty);
        let before = arena.len();
        arena.remove_subtree(a);
        assert!(!arena.contains(a));
        assert!(!arena.contains(c));
        assert!(!arena.contains(d));
        assert!(!arena.contains(wip_c));
        assert!(arena.contains(b));
        assert_eq!(arena.len(), before - 4);
    }

    #[test]
    fn mark_update_lane_bubbles_child_lanes() {
        let (mut arena, root, a, _b, c, _d) = build_tree();
        arena.mark_update_lane(c, Lanes::DEFAULT);
        assert!(arena.node(c).lanes.contains(Lanes::DEFAULT));
        assert!(arena.node(a).child_lanes.contains(Lanes::DEFAULT));
        assert!(arena.node(root).child_lanes.contains(Lanes::DEFAULT));
        assert!(arena.node(root).lanes.is_empty());
    }

    #[test]
    fn mark_update_lane_reaches_alternates() {
        let (mut arena, _root, a, _b, c, _d) = build_tree();
        let wip_a = arena.create_work_in_progress(a, PropsSlot::Empty);
        arena.mark_update_lane(c, Lanes::SYNC);
        assert!(arena.node(wip_a).child_lanes.contains(Lanes::SYNC));
    }
}
