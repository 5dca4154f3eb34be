//! Host adapter capability: concrete node creation and mutation on the
//! target platform.
//!
//! The engine never touches a host platform directly. Everything it needs is
//! expressed through [`HostAdapter`], and those methods are invoked only from
//! the commit engine — render-phase work is pure bookkeeping over the work
//! tree.

use crate::element::Props;

/// Opaque identifier for a host instance. Minted and interpreted by the
/// adapter; the engine only stores and passes these around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

/// The capability set a host platform provides to the commit engine.
pub trait HostAdapter {
    /// Create a concrete element instance for a host tag.
    fn create_instance(&mut self, tag: &str, props: &Props) -> InstanceId;

    /// Create a concrete text instance.
    fn create_text_instance(&mut self, content: &str) -> InstanceId;

    /// Append `child` as the last child of `parent`.
    fn append_child(&mut self, parent: InstanceId, child: InstanceId);

    /// Insert `child` into `parent` immediately before `before`.
    fn insert_before(&mut self, parent: InstanceId, child: InstanceId, before: InstanceId);

    /// Remove `child` (and implicitly its whole subtree) from `parent`.
    fn remove_child(&mut self, parent: InstanceId, child: InstanceId);

    /// Replace the content of a text instance.
    fn commit_text_update(&mut self, node: InstanceId, content: &str);

    /// Apply a new props snapshot to an element instance.
    fn commit_props_update(&mut self, node: InstanceId, props: &Props);
}
