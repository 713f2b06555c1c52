/*!
# Traversal Index

Per-invocation record of constructed elements and map key ordinals. Two
instances exist per plan run, one rooted at the source document and one at
the target; script units of the same run share them, which is what lets a
`<K>` script's keys pair with a later `<V>` script's values and keeps
element construction at most-once per slot.
*/

use std::collections::HashMap;

use crate::path_tree::NodeId;

use super::value::{PathStep, Value};

/// Canonical rendering of a cursor position, used as an instance key
pub fn trail_of(path: &[PathStep]) -> String {
    let mut out = String::new();
    for step in path {
        match step {
            PathStep::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            PathStep::Elem(i) => out.push_str(&format!("[{}]", i)),
            PathStep::MapVal(key) => out.push_str(&format!("<{}>", key)),
        }
    }
    out
}

#[derive(Debug, Default)]
pub struct TraversalIndex {
    /// (node, element trail) -> times the slot was requested
    constructed: HashMap<(NodeId, String), usize>,
    /// map instance trail -> ordinal -> recorded key
    keys: HashMap<String, Vec<Option<Value>>>,
}

impl TraversalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes a construction request; returns `true` on first sight of the
    /// slot (the element must actually be created), `false` on reuse.
    pub fn note_construct(&mut self, node: NodeId, trail: String) -> bool {
        let count = self.constructed.entry((node, trail)).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Distinct elements constructed through this node.
    pub fn constructions_of(&self, node: NodeId) -> usize {
        self.constructed.keys().filter(|(n, _)| *n == node).count()
    }

    /// Records the key inserted at an ordinal of one map instance.
    pub fn record_key(&mut self, trail: String, ordinal: usize, key: Value) {
        let slots = self.keys.entry(trail).or_default();
        if slots.len() <= ordinal {
            slots.resize(ordinal + 1, None);
        }
        slots[ordinal] = Some(key);
    }

    pub fn key_at(&self, trail: &str, ordinal: usize) -> Option<&Value> {
        self.keys.get(trail)?.get(ordinal)?.as_ref()
    }
}
