/*!
# Path Nodes

Resolved position of one chain token within a root type's structure. Nodes
are shared across every script of a file that walks the same token path, so
accessor bindings resolve at most once per node.
*/

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::typemodel::{Cardinality, ResolvedType, ScalarType, TypeId};

/// Which graph a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// Integer handle into the [`NodeArena`](super::arena::NodeArena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Structural role of a node, classified from declared cardinality.
///
/// Per-script effective roles (map key vs map value, pinned member vs
/// iterated container) are derived from the script's own notation during
/// resolution; the shared node keeps the structural classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Root,
    Intermediate,
    Leaf,
    CollectionContainer,
    /// A collection level addressed with a pinned index
    CollectionMember,
    MapContainer,
    MapKey,
    MapValue,
}

/// One resolved accessor: a method on the declaring type or on a helper type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorBinding {
    pub method: String,
    /// Set when the accessor lives on a helper type instead of the declaring
    /// type itself
    pub helper: Option<TypeId>,
}

impl AccessorBinding {
    pub fn direct(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            helper: None,
        }
    }

    pub fn on_helper(method: impl Into<String>, helper: TypeId) -> Self {
        Self {
            method: method.into(),
            helper: Some(helper),
        }
    }
}

/// Cached accessor resolution: unresolved, resolved, or failed with the
/// collected strategy notes. Failures are cached so every script sharing the
/// node sees the same outcome.
pub type AccessorSlot = Option<Result<AccessorBinding, String>>;

/// Resolved position of one token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Children keyed by sanitized token
    pub children: HashMap<String, NodeId>,
    pub field_name: String,
    /// Dotted sanitized path from the root (empty for the root itself)
    pub token_path: String,
    pub side: Side,
    /// Type declaring the field; `None` for the root node
    pub declaring_type: Option<TypeId>,
    pub cardinality: Cardinality,
    /// Element/value type reached after crossing this level
    pub resolved_type: ResolvedType,
    /// Key type for map fields
    pub key_type: Option<ScalarType>,
    pub role: NodeRole,
    pub getter: AccessorSlot,
    pub setter: AccessorSlot,
    /// Concrete instantiation type for target-side construction
    pub concrete_type: Option<TypeId>,
    /// Whether any owning script anchors at this node
    pub anchored: bool,
    /// Ids of the scripts that reference this node
    pub scripts: BTreeSet<String>,
}

impl PathNode {
    pub fn is_root(&self) -> bool {
        self.role == NodeRole::Root
    }

    pub fn register_script(&mut self, script_id: &str) {
        self.scripts.insert(script_id.to_string());
    }
}
