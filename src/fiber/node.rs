//! Work node: the mutable unit of reconciliation work, one per tree
//! position, double-buffered via the `alternate` link.

use std::fmt;
use std::rc::Rc;

use slotmap::new_key_type;

use crate::context::{ContextDeps, ContextId};
use crate::element::{Component, Element, ElementKind, Key, NodeRef, Props, View};
use crate::fiber::flags::NodeFlags;
use crate::hooks::Hook;
use crate::host::InstanceId;
use crate::schedule::Lanes;
use crate::update_queue::StateCell;

new_key_type! {
    /// Unique identifier for a work node in the arena. Copy, lightweight.
    pub struct NodeId;
}

// ---------------------------------------------------------------------------
// WorkTag
// ---------------------------------------------------------------------------

/// Classification of a work node plus its type payload. Closed set,
/// exhaustively matched in every phase.
#[derive(Clone)]
pub enum WorkTag {
    /// The persistent mount point of a tree.
    HostRoot,
    /// A concrete host element with the given tag.
    HostElement(Rc<str>),
    /// A host text node.
    HostText,
    /// A function component.
    FunctionComponent(Component),
    /// A function component gated on shallow props equality.
    MemoComponent(Component),
    /// A keyless grouping without a host node of its own.
    Fragment,
    /// A provider pushing a shared value while its subtree renders.
    ContextProvider(ContextId),
}

impl WorkTag {
    /// Type equality between two nodes (same classification and payload
    /// identity). Used when deciding whether a node can be reused.
    pub fn same(&self, other: &WorkTag) -> bool {
        match (self, other) {
            (WorkTag::HostRoot, WorkTag::HostRoot) => true,
            (WorkTag::HostElement(a), WorkTag::HostElement(b)) => a == b,
            (WorkTag::HostText, WorkTag::HostText) => true,
            (WorkTag::FunctionComponent(a), WorkTag::FunctionComponent(b)) => a.same(b),
            (WorkTag::MemoComponent(a), WorkTag::MemoComponent(b)) => a.same(b),
            (WorkTag::Fragment, WorkTag::Fragment) => true,
            (WorkTag::ContextProvider(a), WorkTag::ContextProvider(b)) => a == b,
            _ => false,
        }
    }

    /// Whether an element descriptor describes this node's type.
    pub fn matches_element(&self, kind: &ElementKind) -> bool {
        match (self, kind) {
            (WorkTag::HostElement(a), ElementKind::Host(b)) => a == b,
            (WorkTag::FunctionComponent(a), ElementKind::Component(b)) => a.same(b),
            (WorkTag::MemoComponent(a), ElementKind::Memo(b)) => a.same(b),
            (WorkTag::Fragment, ElementKind::Fragment) => true,
            (WorkTag::ContextProvider(a), ElementKind::Provider(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, WorkTag::HostElement(_) | WorkTag::HostText)
    }
}

impl fmt::Debug for WorkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkTag::HostRoot => write!(f, "HostRoot"),
            WorkTag::HostElement(tag) => write!(f, "HostElement({tag})"),
            WorkTag::HostText => write!(f, "HostText"),
            WorkTag::FunctionComponent(c) => write!(f, "FunctionComponent({})", c.name()),
            WorkTag::MemoComponent(c) => write!(f, "MemoComponent({})", c.name()),
            WorkTag::Fragment => write!(f, "Fragment"),
            WorkTag::ContextProvider(id) => write!(f, "ContextProvider({id:?})"),
        }
    }
}

// ---------------------------------------------------------------------------
// PropsSlot
// ---------------------------------------------------------------------------

/// Per-tag render input: element props, text content, or a fragment's child
/// list. Compared by reference identity for bailout decisions.
#[derive(Clone)]
pub enum PropsSlot {
    Props(Rc<Props>),
    Text(Rc<str>),
    List(Rc<Vec<View>>),
    Empty,
}

impl PropsSlot {
    /// Reference-identity comparison (never deep equality).
    pub fn same_ref(&self, other: &PropsSlot) -> bool {
        match (self, other) {
            (PropsSlot::Props(a), PropsSlot::Props(b)) => Rc::ptr_eq(a, b),
            (PropsSlot::Text(a), PropsSlot::Text(b)) => Rc::ptr_eq(a, b),
            (PropsSlot::List(a), PropsSlot::List(b)) => Rc::ptr_eq(a, b),
            (PropsSlot::Empty, PropsSlot::Empty) => true,
            _ => false,
        }
    }

    pub fn as_props(&self) -> Option<&Rc<Props>> {
        match self {
            PropsSlot::Props(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&Rc<str>> {
        match self {
            PropsSlot::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<Vec<View>>> {
        match self {
            PropsSlot::List(l) => Some(l),
            _ => None,
        }
    }

    /// The props slot an element descriptor provides. Fragments carry their
    /// child list directly; everything else carries the props value.
    pub fn for_element(element: &Element) -> PropsSlot {
        match element.kind() {
            ElementKind::Fragment => {
                PropsSlot::List(Rc::new(element.props().children().to_vec()))
            }
            _ => PropsSlot::Props(element.props().clone()),
        }
    }
}

impl fmt::Debug for PropsSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropsSlot::Props(p) => write!(f, "Props({p:?})"),
            PropsSlot::Text(t) => write!(f, "Text({t:?})"),
            PropsSlot::List(l) => write!(f, "List(len={})", l.len()),
            PropsSlot::Empty => write!(f, "Empty"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Tag-dependent node state: the root's resolved element and update queue,
/// or a component's hook chain.
#[derive(Clone)]
pub enum NodeState {
    /// Host root: the resolved root view behind a lane-tagged update queue.
    Root(StateCell),
    /// Function/memo component: the hook chain in call order.
    Hooks(Vec<Hook>),
    /// Host elements, text and fragments carry no engine-side state.
    None,
}

// ---------------------------------------------------------------------------
// WorkNode
// ---------------------------------------------------------------------------

/// One mutable position in the double-buffered work tree.
pub struct WorkNode {
    pub tag: WorkTag,
    pub key: Option<Key>,

    // Tree links. The parent owns its children; siblings are a non-owning
    // chain ordered by `index`.
    pub parent: Option<NodeId>,
    pub child: Option<NodeId>,
    pub sibling: Option<NodeId>,
    pub index: u32,

    /// Cross-link to the other buffer for this position, if one exists.
    pub alternate: Option<NodeId>,

    // Render data.
    pub pending_props: PropsSlot,
    pub memoized_props: PropsSlot,
    pub state: NodeState,
    pub node_ref: Option<NodeRef>,
    pub instance: Option<InstanceId>,

    // Effect bookkeeping.
    pub flags: NodeFlags,
    pub subtree_flags: NodeFlags,
    pub deletions: Vec<NodeId>,

    // Scheduling data.
    pub lanes: Lanes,
    pub child_lanes: Lanes,

    // Context reads recorded during the last render of this node.
    pub deps: Option<ContextDeps>,
}

impl WorkNode {
    pub fn new(tag: WorkTag, pending_props: PropsSlot, key: Option<Key>) -> Self {
        let state = match &tag {
            WorkTag::FunctionComponent(_) | WorkTag::MemoComponent(_) => {
                NodeState::Hooks(Vec::new())
            }
            _ => NodeState::None,
        };
        Self {
            tag,
            key,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            alternate: None,
            pending_props,
            memoized_props: PropsSlot::Empty,
            state,
            node_ref: None,
            instance: None,
            flags: NodeFlags::NONE,
            subtree_flags: NodeFlags::NONE,
            deletions: Vec::new(),
            lanes: Lanes::NONE,
            child_lanes: Lanes::NONE,
            deps: None,
        }
    }

    pub fn hooks(&self) -> Option<&Vec<Hook>> {
        match &self.state {
            NodeState::Hooks(hooks) => Some(hooks),
            _ => None,
        }
    }

    pub fn hooks_mut(&mut self) -> Option<&mut Vec<Hook>> {
        match &mut self.state {
            NodeState::Hooks(hooks) => Some(hooks),
            _ => None,
        }
    }
}

impl fmt::Debug for WorkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkNode")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("index", &self.index)
            .field("flags", &self.flags)
            .field("subtree_flags", &self.subtree_flags)
            .field("lanes", &self.lanes)
            .field("child_lanes", &self.child_lanes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Props;
    use crate::hooks::Hooks;

    #[test]
    fn tag_same_discriminates_payload() {
        let div = WorkTag::HostElement(Rc::from("div"));
        let span = WorkTag::HostElement(Rc::from("span"));
        assert!(div.same(&WorkTag::HostElement(Rc::from("div"))));
        assert!(!div.same(&span));
        assert!(!div.same(&WorkTag::HostText));
    }

    #[test]
    fn tag_matches_element_kind() {
        let comp = Component::new("C", |_: &mut Hooks, _: &Props| View::Nothing);
        let tag = WorkTag::FunctionComponent(comp.clone());
        assert!(tag.matches_element(&ElementKind::Component(comp.clone())));
        assert!(!tag.matches_element(&ElementKind::Memo(comp)));
        assert!(!tag.matches_element(&ElementKind::Fragment));
    }

    #[test]
    fn props_slot_identity() {
        let props = Rc::new(Props::new());
        let a = PropsSlot::Props(props.clone());
        let b = PropsSlot::Props(props);
        let c = PropsSlot::Props(Rc::new(Props::new()));
        assert!(a.same_ref(&b));
        assert!(!a.same_ref(&c));
        assert!(PropsSlot::Empty.same_ref(&PropsSlot::Empty));
        assert!(!a.same_ref(&PropsSlot::Empty));
    }

    #[test]
    fn function_component_nodes_get_hook_state() {
        let comp = Component::new("C", |_: &mut Hooks, _: &Props| View::Nothing);
        let node = WorkNode::new(
            WorkTag::FunctionComponent(comp),
            PropsSlot::Props(Rc::new(Props::new())),
            None,
        );
        assert!(node.hooks().is_some());
        let text = WorkNode::new(WorkTag::HostText, PropsSlot::Text(Rc::from("x")), None);
        assert!(text.hooks().is_none());
    }
}
