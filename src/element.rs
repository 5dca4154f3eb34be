//! Element descriptors: immutable descriptions of "what to render".
//!
//! An [`Element`] pairs a kind (host tag, component function, or structural
//! marker) with props and an optional identity key. Elements are cheap to
//! clone (`Rc`-backed) and are compared by reference identity, not deep
//! equality — two renders that reuse the same `Rc<Props>` are recognized as
//! unchanged without inspecting the contents.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::context::ContextId;
use crate::hooks::Hooks;
use crate::host::InstanceId;

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Sibling-unique identity used by the keyed diff path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value as i64)
    }
}

// ---------------------------------------------------------------------------
// PropValue
// ---------------------------------------------------------------------------

/// A single prop (or dependency-list) value.
///
/// Primitives compare by value; shared payloads compare by `Rc` identity.
#[derive(Clone)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Shared(Rc<dyn Any>),
}

impl PropValue {
    /// Wrap an arbitrary value as an identity-compared shared payload.
    pub fn shared<T: 'static>(value: T) -> Self {
        PropValue::Shared(Rc::new(value))
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Shared(a), PropValue::Shared(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(v) => write!(f, "{v:?}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Shared(_) => write!(f, "<shared>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

/// Attributes plus child descriptors for one element.
///
/// Stored behind `Rc` on the element; the diff compares props by pointer
/// identity and only the host adapter ever interprets individual attrs.
#[derive(Clone, Default)]
pub struct Props {
    attrs: BTreeMap<Rc<str>, PropValue>,
    children: Vec<View>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute (builder).
    pub fn with_attr(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Append a child descriptor (builder).
    pub fn with_child(mut self, child: impl Into<View>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append multiple child descriptors (builder).
    pub fn with_children(mut self, children: impl IntoIterator<Item = View>) -> Self {
        self.children.extend(children);
        self
    }

    /// Look up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    /// Iterate attributes in name order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// The child descriptors.
    pub fn children(&self) -> &[View] {
        &self.children
    }

    /// Shallow equality: attr-by-attr value/identity comparison plus
    /// child-by-child identity comparison. Used by memoized components.
    pub fn shallow_eq(&self, other: &Props) -> bool {
        if self.attrs.len() != other.attrs.len() || self.children.len() != other.children.len() {
            return false;
        }
        let attrs_eq = self
            .attrs
            .iter()
            .zip(other.attrs.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && va == vb);
        attrs_eq
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(a, b)| a.same_shallow(b))
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("children", &self.children.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NodeRef
// ---------------------------------------------------------------------------

/// A stable cell that receives the host instance of an element once it is
/// committed, and is cleared when the element is removed.
#[derive(Clone, Default)]
pub struct NodeRef {
    cell: Rc<RefCell<Option<InstanceId>>>,
}

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed host instance, if any.
    pub fn get(&self) -> Option<InstanceId> {
        *self.cell.borrow()
    }

    /// Identity comparison: two refs are the same if they share a cell.
    pub fn same(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn set(&self, instance: InstanceId) {
        *self.cell.borrow_mut() = Some(instance);
    }

    pub(crate) fn clear(&self) {
        *self.cell.borrow_mut() = None;
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.get()).finish()
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A component render function.
pub type RenderFn = dyn Fn(&mut Hooks, &Props) -> View;

/// A named handle to a component render function.
///
/// Two `Component` values describe the same component type iff they share the
/// render function (`Rc` identity) — the name is diagnostic only.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new(name: &'static str, render: impl Fn(&mut Hooks, &Props) -> View + 'static) -> Self {
        Self {
            name,
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Identity comparison by render function.
    pub fn same(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }

    /// Build an element rendering this component with empty props.
    pub fn el(&self) -> Element {
        Element::component(self.clone())
    }

    pub(crate) fn render_fn(&self) -> Rc<RenderFn> {
        self.render.clone()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

// ---------------------------------------------------------------------------
// ElementKind / Element
// ---------------------------------------------------------------------------

/// What an element describes: a host tag, a component, or a structural
/// marker. Closed set — every phase matches it exhaustively.
#[derive(Clone, Debug)]
pub enum ElementKind {
    /// A concrete host element (e.g. `"div"`).
    Host(Rc<str>),
    /// A function component.
    Component(Component),
    /// A function component whose re-render is gated on shallow props
    /// equality instead of reference equality.
    Memo(Component),
    /// A keyless grouping of children.
    Fragment,
    /// A provider pushing a shared value for a context.
    Provider(ContextId),
}

impl ElementKind {
    /// Type equality for reuse decisions.
    pub fn same(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Component(a), ElementKind::Component(b)) => a.same(b),
            (ElementKind::Memo(a), ElementKind::Memo(b)) => a.same(b),
            (ElementKind::Fragment, ElementKind::Fragment) => true,
            (ElementKind::Provider(a), ElementKind::Provider(b)) => a == b,
            _ => false,
        }
    }
}

/// An immutable description of one position in the desired tree.
#[derive(Clone, Debug)]
pub struct Element {
    kind: ElementKind,
    key: Option<Key>,
    props: Rc<Props>,
    node_ref: Option<NodeRef>,
}

impl Element {
    /// A host element with the given tag and empty props.
    pub fn host(tag: impl Into<Rc<str>>) -> Self {
        Self {
            kind: ElementKind::Host(tag.into()),
            key: None,
            props: Rc::new(Props::new()),
            node_ref: None,
        }
    }

    /// An element rendering a function component.
    pub fn component(component: Component) -> Self {
        Self {
            kind: ElementKind::Component(component),
            key: None,
            props: Rc::new(Props::new()),
            node_ref: None,
        }
    }

    /// A memoized component element: re-renders only when shallow props
    /// inequality or pending state demands it.
    pub fn memo(component: Component) -> Self {
        Self {
            kind: ElementKind::Memo(component),
            key: None,
            props: Rc::new(Props::new()),
            node_ref: None,
        }
    }

    /// A fragment grouping children without a host node of its own.
    pub fn fragment() -> Self {
        Self {
            kind: ElementKind::Fragment,
            key: None,
            props: Rc::new(Props::new()),
            node_ref: None,
        }
    }

    pub(crate) fn provider(context: ContextId, value: Rc<dyn Any>) -> Self {
        Self {
            kind: ElementKind::Provider(context),
            key: None,
            props: Rc::new(Props::new().with_attr(crate::context::VALUE_ATTR, PropValue::Shared(value))),
            node_ref: None,
        }
    }

    /// Set the sibling-unique key (builder).
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set an attribute (builder).
    pub fn with_attr(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        Rc::make_mut(&mut self.props)
            .attrs
            .insert(name.into(), value.into());
        self
    }

    /// Append a child descriptor (builder).
    pub fn with_child(mut self, child: impl Into<View>) -> Self {
        Rc::make_mut(&mut self.props).children.push(child.into());
        self
    }

    /// Append multiple child descriptors (builder).
    pub fn with_children(mut self, children: impl IntoIterator<Item = View>) -> Self {
        Rc::make_mut(&mut self.props).children.extend(children);
        self
    }

    /// Replace the whole props value (builder). Reusing the same `Rc` across
    /// renders marks the element unchanged for the diff.
    pub fn with_props(mut self, props: Rc<Props>) -> Self {
        self.props = props;
        self
    }

    /// Attach a [`NodeRef`] receiving the committed host instance (builder).
    pub fn with_ref(mut self, node_ref: NodeRef) -> Self {
        self.node_ref = Some(node_ref);
        self
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn props(&self) -> &Rc<Props> {
        &self.props
    }

    pub fn node_ref(&self) -> Option<&NodeRef> {
        self.node_ref.as_ref()
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// A render output or child slot: an element, bare text, a list, or nothing.
#[derive(Clone, Debug)]
pub enum View {
    Element(Element),
    Text(Rc<str>),
    Many(Vec<View>),
    Nothing,
}

impl View {
    pub fn is_nothing(&self) -> bool {
        matches!(self, View::Nothing)
    }

    /// Shallow identity comparison (props by pointer, text by content).
    pub fn same_shallow(&self, other: &View) -> bool {
        match (self, other) {
            (View::Element(a), View::Element(b)) => {
                a.kind.same(&b.kind) && a.key == b.key && Rc::ptr_eq(&a.props, &b.props)
            }
            (View::Text(a), View::Text(b)) => a == b,
            (View::Many(a), View::Many(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_shallow(y))
            }
            (View::Nothing, View::Nothing) => true,
            _ => false,
        }
    }
}

/// Collapse a child slice into a single diffable [`View`].
pub(crate) fn view_from_children(children: &[View]) -> View {
    match children.len() {
        0 => View::Nothing,
        1 => children[0].clone(),
        _ => View::Many(children.to_vec()),
    }
}

impl From<Element> for View {
    fn from(value: Element) -> Self {
        View::Element(value)
    }
}

impl From<&str> for View {
    fn from(value: &str) -> Self {
        View::Text(Rc::from(value))
    }
}

impl From<String> for View {
    fn from(value: String) -> Self {
        View::Text(Rc::from(value))
    }
}

impl From<Rc<str>> for View {
    fn from(value: Rc<str>) -> Self {
        View::Text(value)
    }
}

impl From<Vec<View>> for View {
    fn from(value: Vec<View>) -> Self {
        View::Many(value)
    }
}

impl From<Vec<Element>> for View {
    fn from(value: Vec<Element>) -> Self {
        View::Many(value.into_iter().map(View::Element).collect())
    }
}

impl<T: Into<View>> From<Option<T>> for View {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => View::Nothing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_from_str_and_int() {
        assert_eq!(Key::from("a"), Key::Str(Rc::from("a")));
        assert_eq!(Key::from(3), Key::Int(3));
        assert_ne!(Key::from("3"), Key::from(3));
    }

    #[test]
    fn prop_value_primitive_eq() {
        assert_eq!(PropValue::from(1), PropValue::from(1i64));
        assert_eq!(PropValue::from("x"), PropValue::from(String::from("x")));
        assert_ne!(PropValue::from(true), PropValue::from(false));
        assert_ne!(PropValue::from(1), PropValue::from("1"));
    }

    #[test]
    fn prop_value_shared_is_identity_compared() {
        let payload: Rc<dyn std::any::Any> = Rc::new(vec![1, 2, 3]);
        let a = PropValue::Shared(payload.clone());
        let b = PropValue::Shared(payload);
        let c = PropValue::shared(vec![1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn builder_host_element() {
        let el = Element::host("div").with_key("k").with_attr("id", "main");
        assert!(matches!(el.kind(), ElementKind::Host(t) if &**t == "div"));
        assert_eq!(el.key(), Some(&Key::from("k")));
        assert_eq!(el.props().attr("id"), Some(&PropValue::from("main")));
    }

    #[test]
    fn builder_children() {
        let el = Element::host("ul")
            .with_child(Element::host("li"))
            .with_child("text");
        assert_eq!(el.props().children().len(), 2);
        assert!(matches!(el.props().children()[1], View::Text(_)));
    }

    #[test]
    fn with_props_preserves_identity() {
        let props = Rc::new(Props::new().with_attr("a", 1));
        let e1 = Element::host("div").with_props(props.clone());
        let e2 = Element::host("div").with_props(props.clone());
        assert!(Rc::ptr_eq(e1.props(), e2.props()));
    }

    #[test]
    fn shallow_eq_props() {
        let a = Props::new().with_attr("x", 1).with_attr("y", "s");
        let b = Props::new().with_attr("x", 1).with_attr("y", "s");
        let c = Props::new().with_attr("x", 2).with_attr("y", "s");
        assert!(a.shallow_eq(&b));
        assert!(!a.shallow_eq(&c));
    }

    #[test]
    fn view_same_shallow_uses_props_identity() {
        let props = Rc::new(Props::new().with_attr("a", 1));
        let a = View::Element(Element::host("div").with_props(props.clone()));
        let b = View::Element(Element::host("div").with_props(props));
        let c = View::Element(Element::host("div").with_attr("a", 1));
        assert!(a.same_shallow(&b));
        assert!(!a.same_shallow(&c));
    }

    #[test]
    fn view_from_conversions() {
        assert!(matches!(View::from("hi"), View::Text(_)));
        assert!(View::from(None::<Element>).is_nothing());
        assert!(matches!(View::from(vec![View::Nothing]), View::Many(v) if v.len() == 1));
    }

    #[test]
    fn component_identity() {
        let render = |_: &mut Hooks, _: &Props| View::Nothing;
        let a = Component::new("A", render);
        let b = a.clone();
        let c = Component::new("A", render);
        assert!(a.same(&b));
        // Separate `Component::new` calls box separate closures.
        assert!(!a.same(&c));
    }

    #[test]
    fn node_ref_identity_and_cell() {
        let r = NodeRef::new();
        assert!(r.same(&r.clone()));
        assert!(!r.same(&NodeRef::new()));
        assert_eq!(r.get(), None);
        r.set(InstanceId(7));
        assert_eq!(r.get(), Some(InstanceId(7)));
        r.clear();
        assert_eq!(r.get(), None);
    }
}
