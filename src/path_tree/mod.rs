/*!
# Path Tree

Shared per-root tree of resolved path nodes. One node exists per (root type,
side, token path); scripts with common prefixes reuse nodes and their cached
accessor resolutions.
*/

pub mod arena;
pub mod node;

pub use arena::NodeArena;
pub use node::{AccessorBinding, AccessorSlot, NodeId, NodeRole, PathNode, Side};
