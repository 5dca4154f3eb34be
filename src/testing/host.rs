//! A recording host adapter: keeps a mirror tree of instances plus a log of
//! every capability call, and renders the tree to an indented string for
//! snapshot assertions.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::element::Props;
use crate::host::{HostAdapter, InstanceId};

/// One recorded host-capability call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    CreateElement { instance: InstanceId, tag: String },
    CreateText { instance: InstanceId, content: String },
    Append { parent: InstanceId, child: InstanceId },
    InsertBefore { parent: InstanceId, child: InstanceId, before: InstanceId },
    Remove { parent: InstanceId, child: InstanceId },
    TextUpdate { instance: InstanceId, content: String },
    PropsUpdate { instance: InstanceId },
}

#[derive(Debug, Clone)]
struct TestNode {
    /// `None` for text instances.
    tag: Option<String>,
    text: Option<String>,
    attrs: BTreeMap<String, String>,
    children: Vec<InstanceId>,
}

/// The recording adapter. The container instance is created up front.
#[derive(Debug)]
pub struct TestHost {
    nodes: BTreeMap<InstanceId, TestNode>,
    next_id: u64,
    container: InstanceId,
    ops: Vec<HostOp>,
}

impl TestHost {
    pub fn new() -> Self {
        let container = InstanceId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            container,
            TestNode {
                tag: Some("root".to_string()),
                text: None,
                attrs: BTreeMap::new(),
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            next_id: 1,
            container,
            ops: Vec::new(),
        }
    }

    pub fn container(&self) -> InstanceId {
        self.container
    }

    /// All recorded capability calls, in order.
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Drain the op log (useful between test phases).
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Count of insert/append calls — every placement or move issues one.
    pub fn placement_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, HostOp::Append { .. } | HostOp::InsertBefore { .. }))
            .count()
    }

    pub fn removal_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, HostOp::Remove { .. }))
            .count()
    }

    pub fn text_update_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, HostOp::TextUpdate { .. }))
            .count()
    }

    /// The text content of an instance, if it is a text node.
    pub fn text_of(&self, instance: InstanceId) -> Option<&str> {
        self.nodes.get(&instance)?.text.as_deref()
    }

    /// Child instances of `parent`, in host order.
    pub fn children_of(&self, parent: InstanceId) -> Vec<InstanceId> {
        self.nodes
            .get(&parent)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Render the mirror tree under the container as an indented string.
    ///
    /// Elements print as `<tag attr="value">`, text as `"content"`.
    pub fn to_tree_string(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[&self.container].children {
            self.write_node(&mut out, child, 0);
        }
        out
    }

    fn write_node(&self, out: &mut String, instance: InstanceId, depth: usize) {
        let Some(node) = self.nodes.get(&instance) else {
            return;
        };
        let indent = "  ".repeat(depth);
        match (&node.tag, &node.text) {
            (Some(tag), _) => {
                let _ = write!(out, "{indent}<{tag}");
                for (name, value) in &node.attrs {
                    let _ = write!(out, " {name}={value}");
                }
                let _ = writeln!(out, ">");
                for &child in &node.children {
                    self.write_node(out, child, depth + 1);
                }
            }
            (None, Some(text)) => {
                let _ = writeln!(out, "{indent}{text:?}");
            }
            (None, None) => {}
        }
    }

    fn mint(&mut self) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        id
    }

    fn detach(&mut self, parent: InstanceId, child: InstanceId) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|&c| c != child);
        }
    }

    fn attrs_of(props: &Props) -> BTreeMap<String, String> {
        props
            .attrs()
            .map(|(name, value)| (name.to_string(), format!("{value:?}")))
            .collect()
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAdapter for Rc<RefCell<TestHost>> {
    fn create_instance(&mut self, tag: &str, props: &Props) -> InstanceId {
        let mut host = self.borrow_mut();
        let instance = host.mint();
        host.nodes.insert(
            instance,
            TestNode {
                tag: Some(tag.to_string()),
                text: None,
                attrs: TestHost::attrs_of(props),
                children: Vec::new(),
            },
        );
        host.ops.push(HostOp::CreateElement {
            instance,
            tag: tag.to_string(),
        });
        instance
    }

    fn create_text_instance(&mut self, content: &str) -> InstanceId {
        let mut host = self.borrow_mut();
        let instance = host.mint();
        host.nodes.insert(
            instance,
            TestNode {
                tag: None,
                text: Some(content.to_string()),
                attrs: BTreeMap::new(),
                children: Vec::new(),
            },
        );
        host.ops.push(HostOp::CreateText {
            instance,
            content: content.to_string(),
        });
        instance
    }

    fn append_child(&mut self, parent: InstanceId, child: InstanceId) {
        let mut host = self.borrow_mut();
        host.detach(parent, child);
        if let Some(node) = host.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        host.ops.push(HostOp::Append { parent, child });
    }

    fn insert_before(&mut self, parent: InstanceId, child: InstanceId, before: InstanceId) {
        let mut host = self.borrow_mut();
        host.detach(parent, child);
        if let Some(node) = host.nodes.get_mut(&parent) {
            let position = node
                .children
                .iter()
                .position(|&c| c == before)
                .unwrap_or(node.children.len());
            node.children.insert(position, child);
        }
        host.ops.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
    }

    fn remove_child(&mut self, parent: InstanceId, child: InstanceId) {
        let mut host = self.borrow_mut();
        host.detach(parent, child);
        host.ops.push(HostOp::Remove { parent, child });
    }

    fn commit_text_update(&mut self, node: InstanceId, content: &str) {
        let mut host = self.borrow_mut();
        if let Some(n) = host.nodes.get_mut(&node) {
            n.text = Some(content.to_string());
        }
        host.ops.push(HostOp::TextUpdate {
            instance: node,
            content: content.to_string(),
        });
    }

    fn commit_props_update(&mut self, node: InstanceId, props: &Props) {
        let mut host = self.borrow_mut();
        if let Some(n) = host.nodes.get_mut(&node) {
            n.attrs = TestHost::attrs_of(props);
        }
        host.ops.push(HostOp::PropsUpdate { instance: node });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_tree_operations() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let mut adapter = host.clone();
        let container = host.borrow().container();

        let div = adapter.create_instance("div", &Props::new().with_attr("id", "a"));
        let text = adapter.create_text_instance("hi");
        adapter.append_child(div, text);
        adapter.append_child(container, div);

        assert_eq!(host.borrow().children_of(container), vec![div]);
        assert_eq!(host.borrow().children_of(div), vec![text]);
        assert_eq!(host.borrow().text_of(text), Some("hi"));
    }

    #[test]
    fn insert_before_positions_child() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let mut adapter = host.clone();
        let container = host.borrow().container();
        let a = adapter.create_text_instance("a");
        let b = adapter.create_text_instance("b");
        let c = adapter.create_text_instance("c");
        adapter.append_child(container, a);
        adapter.append_child(container, b);
        adapter.insert_before(container, c, b);
        assert_eq!(host.borrow().children_of(container), vec![a, c, b]);
    }

    #[test]
    fn reinsert_moves_instead_of_duplicating() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let mut adapter = host.clone();
        let container = host.borrow().container();
        let a = adapter.create_text_instance("a");
        let b = adapter.create_text_instance("b");
        adapter.append_child(container, a);
        adapter.append_child(container, b);
        adapter.insert_before(container, b, a);
        assert_eq!(host.borrow().children_of(container), vec![b, a]);
    }

    #[test]
    fn tree_string_format() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let mut adapter = host.clone();
        let container = host.borrow().container();
        let div = adapter.create_instance("div", &Props::new().with_attr("id", "x"));
        let text = adapter.create_text_instance("hello");
        adapter.append_child(div, text);
        adapter.append_child(container, div);
        insta::assert_snapshot!(host.borrow().to_tree_string(), @r###"
        <div id="x">
          "hello"
        "###);
    }

    #[test]
    fn op_counters() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let mut adapter = host.clone();
        let container = host.borrow().container();
        let a = adapter.create_text_instance("a");
        adapter.append_child(container, a);
        adapter.commit_text_update(a, "b");
        adapter.remove_child(container, a);
        let host = host.borrow();
        assert_eq!(host.placement_count(), 1);
        assert_eq!(host.text_update_count(), 1);
        assert_eq!(host.removal_count(), 1);
    }
}
