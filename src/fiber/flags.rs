//! Effect flags recorded on work nodes during the render phase and consumed
//! by the commit engine.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of pending effects for one node.
///
/// `subtree_flags` on a node is the OR of every flag anywhere below it,
/// bubbled upward during the complete phase so commit can skip untouched
/// subtrees in O(1).
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags(u32);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Insert (or move) this node's host subtree at its new position.
    pub const PLACEMENT: NodeFlags = NodeFlags(1 << 0);
    /// Apply new props or text content to the existing host instance.
    pub const UPDATE: NodeFlags = NodeFlags(1 << 1);
    /// One or more children were removed this pass (see `deletions`).
    pub const CHILD_DELETION: NodeFlags = NodeFlags(1 << 2);
    /// Deferred effects need to run after this commit.
    pub const PASSIVE: NodeFlags = NodeFlags(1 << 3);
    /// A node ref must be attached or re-attached at commit.
    pub const REF: NodeFlags = NodeFlags(1 << 4);

    /// Flags handled during the uninterruptible mutation pass.
    pub const MUTATION_MASK: NodeFlags = NodeFlags(
        Self::PLACEMENT.0 | Self::UPDATE.0 | Self::CHILD_DELETION.0 | Self::REF.0,
    );

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: NodeFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for NodeFlags {
    type Output = NodeFlags;

    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeFlags {
    fn bitor_assign(&mut self, rhs: NodeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NodeFlags(NONE)");
        }
        let names = [
            (NodeFlags::PLACEMENT, "PLACEMENT"),
            (NodeFlags::UPDATE, "UPDATE"),
            (NodeFlags::CHILD_DELETION, "CHILD_DELETION"),
            (NodeFlags::PASSIVE, "PASSIVE"),
            (NodeFlags::REF, "REF"),
        ];
        let mut first = true;
        write!(f, "NodeFlags(")?;
        for (flag, name) in names {
            if self.intersects(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_contains() {
        let mut flags = NodeFlags::NONE;
        flags.insert(NodeFlags::PLACEMENT);
        flags.insert(NodeFlags::PASSIVE);
        assert!(flags.contains(NodeFlags::PLACEMENT));
        assert!(flags.intersects(NodeFlags::MUTATION_MASK));
        flags.remove(NodeFlags::PLACEMENT);
        assert!(!flags.contains(NodeFlags::PLACEMENT));
        assert!(flags.contains(NodeFlags::PASSIVE));
    }

    #[test]
    fn mutation_mask_excludes_passive() {
        assert!(!NodeFlags::MUTATION_MASK.intersects(NodeFlags::PASSIVE));
        assert!(NodeFlags::MUTATION_MASK.contains(NodeFlags::UPDATE));
        assert!(NodeFlags::MUTATION_MASK.contains(NodeFlags::REF));
    }

    #[test]
    fn debug_names() {
        let flags = NodeFlags::PLACEMENT | NodeFlags::UPDATE;
        let s = format!("{flags:?}");
        assert!(s.contains("PLACEMENT"));
        assert!(s.contains("UPDATE"));
    }
}
