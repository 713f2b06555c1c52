/*!
# Path Node Arena

Flat storage of [`PathNode`] records indexed by integer id, with a key map
from (root type, side, token path) to node id. The arena is scoped to one
script file and is only ever appended to, so a script's failure cannot
corrupt nodes already resolved for its siblings.
*/

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::typemodel::{Cardinality, ResolvedType, TypeId};

use super::node::{NodeId, NodeRole, PathNode, Side};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeArena {
    nodes: Vec<PathNode>,
    by_key: HashMap<(TypeId, Side, String), NodeId>,
    roots: HashMap<(TypeId, Side), NodeId>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &PathNode {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut PathNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Root node for a (root type, side) pair, created on first reference.
    pub fn root(&mut self, root_type: TypeId, side: Side) -> NodeId {
        if let Some(id) = self.roots.get(&(root_type, side)) {
            return *id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(PathNode {
            id,
            parent: None,
            children: HashMap::new(),
            field_name: String::new(),
            token_path: String::new(),
            side,
            declaring_type: None,
            cardinality: Cardinality::Single,
            resolved_type: ResolvedType::Object(root_type),
            key_type: None,
            role: NodeRole::Root,
            getter: None,
            setter: None,
            concrete_type: None,
            anchored: false,
            scripts: BTreeSet::new(),
        });
        self.roots.insert((root_type, side), id);
        self.by_key.insert((root_type, side, String::new()), id);
        id
    }

    pub fn child_of(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.get(parent).children.get(name).copied()
    }

    /// Attaches a freshly resolved node under its parent and indexes it by
    /// (root type, side, token path).
    pub fn attach_child(&mut self, root_type: TypeId, parent: NodeId, mut node: PathNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        node.id = id;
        node.parent = Some(parent);
        let key = (root_type, node.side, node.token_path.clone());
        let name = node.field_name.clone();
        self.nodes.push(node);
        self.by_key.insert(key, id);
        self.get_mut(parent).children.insert(name, id);
        id
    }

    /// Looks a node up by its full key.
    pub fn lookup(&self, root_type: TypeId, side: Side, token_path: &str) -> Option<NodeId> {
        self.by_key
            .get(&(root_type, side, token_path.to_string()))
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathNode> {
        self.nodes.iter()
    }
}
