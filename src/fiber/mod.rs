//! The work tree: double-buffered mutable nodes in a slotmap arena.

pub mod arena;
pub mod flags;
pub mod node;

pub use arena::NodeArena;
pub use flags::NodeFlags;
pub use node::{NodeId, NodeState, PropsSlot, WorkNode, WorkTag};
