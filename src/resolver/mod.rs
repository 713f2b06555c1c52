/*!
# Semantics Resolver

Walks a tokenized chain from a root type, building or reusing Path-Tree
nodes, classifying roles from notation plus declared cardinality, binding
accessors through the strategy list and validating notation/type agreement.
A token with no matching field, or whose notation disagrees with the field's
declared shape, fails fast naming the owning script and token path.
*/

pub mod accessor;
pub mod compat;

pub use accessor::{resolve_accessor, AccessorKind, ResolutionRequest};
pub use compat::{leaf_conversion, literal_conversion, Conversion};

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::core::{CompileError, Diagnostic, DiagnosticSink};
use crate::path_tree::{NodeArena, NodeId, NodeRole, PathNode, Side};
use crate::tokenizer::{AttachedOverrides, ChainSegment, MapSlot, TokenizedChain};
use crate::typemodel::{Cardinality, ResolvedType, ScalarType, TypeId, TypeIndex};

/// Per-script view of a resolved chain: the shared nodes plus the effective
/// role and value type each segment has under this script's notation.
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    pub nodes: Vec<NodeId>,
    pub roles: Vec<NodeRole>,
    pub types: Vec<ResolvedType>,
}

impl ResolvedChain {
    pub fn leaf_node(&self) -> NodeId {
        *self.nodes.last().expect("resolved chain is non-empty")
    }

    pub fn leaf_role(&self) -> NodeRole {
        *self.roles.last().expect("resolved chain is non-empty")
    }

    pub fn leaf_type(&self) -> ResolvedType {
        *self.types.last().expect("resolved chain is non-empty")
    }
}

pub struct Resolver<'a> {
    index: &'a TypeIndex,
    pub arena: &'a mut NodeArena,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a TypeIndex, arena: &'a mut NodeArena) -> Self {
        Self { index, arena }
    }

    pub fn index(&self) -> &TypeIndex {
        self.index
    }

    /// Resolves one chain against the shared tree, creating nodes on first
    /// reference and registering the script on reused ones.
    pub fn resolve_chain(
        &mut self,
        root: TypeId,
        side: Side,
        chain: &TokenizedChain,
        overrides: &AttachedOverrides,
        script_id: &str,
        sink: &mut DiagnosticSink,
    ) -> Result<ResolvedChain, CompileError> {
        let root_id = self.arena.root(root, side);
        self.arena.get_mut(root_id).register_script(script_id);

        let mut nodes = Vec::with_capacity(chain.segments.len());
        let mut roles = Vec::with_capacity(chain.segments.len());
        let mut types = Vec::with_capacity(chain.segments.len());

        let mut current = root_id;
        let mut current_type = ResolvedType::Object(root);

        for (i, segment) in chain.segments.iter().enumerate() {
            let is_last = i + 1 == chain.segments.len();
            let token_path = chain.token_path_to(i);

            let declaring = match current_type {
                ResolvedType::Object(id) => id,
                other => {
                    return Err(CompileError::semantics(
                        script_id,
                        format!(
                            "cannot descend into '{}': '{}' has no fields",
                            segment.name,
                            self.index.display(other)
                        ),
                    )
                    .at_path(&token_path))
                }
            };

            let node_id = match self.arena.child_of(current, &segment.name) {
                Some(existing) => {
                    self.reuse_node(existing, chain, i, overrides, script_id, sink)?;
                    existing
                }
                None => self.create_node(
                    root, side, declaring, chain, i, overrides, script_id,
                )?,
            };

            let node = self.arena.get(node_id);
            let effective_type = effective_segment_type(node, segment);
            let effective_role = effective_role(node, segment, is_last);
            self.check_notation(node_id, segment, script_id, &token_path)?;

            let helper_requested = overrides
                .get(&token_path)
                .map(|o| o.helper_access())
                .unwrap_or(false);
            self.ensure_accessor(node_id, AccessorKind::Getter, helper_requested, script_id)?;
            if side == Side::Target {
                self.ensure_accessor(node_id, AccessorKind::Setter, helper_requested, script_id)?;
            }

            nodes.push(node_id);
            roles.push(effective_role);
            types.push(effective_type);

            current = node_id;
            current_type = effective_type;
        }

        debug!(
            script_id,
            side = %side,
            chain = %chain.sanitized(),
            nodes = nodes.len(),
            "chain resolved"
        );

        Ok(ResolvedChain {
            nodes,
            roles,
            types,
        })
    }

    fn create_node(
        &mut self,
        root: TypeId,
        side: Side,
        declaring: TypeId,
        chain: &TokenizedChain,
        i: usize,
        overrides: &AttachedOverrides,
        script_id: &str,
    ) -> Result<NodeId, CompileError> {
        let segment = &chain.segments[i];
        let token_path = chain.token_path_to(i);
        let is_last = i + 1 == chain.segments.len();

        let field = self
            .index
            .field_of(declaring, &segment.name)
            .ok_or_else(|| {
                CompileError::semantics(
                    script_id,
                    format!(
                        "unknown field '{}' on type '{}'",
                        segment.name,
                        self.index.name_of(declaring)
                    ),
                )
                .at_path(&token_path)
            })?
            .clone();

        let element_type = self.index.resolve_name(&field.ty).map_err(|e| {
            CompileError::semantics(script_id, e.to_string()).at_path(&token_path)
        })?;

        let key_type = match field.cardinality {
            Cardinality::Map => Some(
                field
                    .key_type
                    .as_deref()
                    .and_then(ScalarType::from_name)
                    .unwrap_or(ScalarType::String),
            ),
            _ => None,
        };

        let role = match field.cardinality {
            Cardinality::List => NodeRole::CollectionContainer,
            Cardinality::Map => NodeRole::MapContainer,
            Cardinality::Single if is_last => NodeRole::Leaf,
            Cardinality::Single => NodeRole::Intermediate,
        };

        let concrete_type = if side == Side::Target {
            self.resolve_concrete(
                &token_path,
                element_type,
                field.concrete.as_deref(),
                overrides,
                script_id,
                field.cardinality != Cardinality::Single || !is_last,
            )?
        } else {
            None
        };

        let mut scripts = BTreeSet::new();
        scripts.insert(script_id.to_string());

        let node = PathNode {
            id: NodeId(0), // assigned by the arena
            parent: None,
            children: HashMap::new(),
            field_name: segment.name.clone(),
            token_path: token_path.clone(),
            side,
            declaring_type: Some(declaring),
            cardinality: field.cardinality,
            resolved_type: element_type,
            key_type,
            role,
            getter: None,
            setter: None,
            concrete_type,
            anchored: chain.anchor == Some(i),
            scripts,
        };

        let parent = if i == 0 {
            self.arena.root(root, side)
        } else {
            self.arena
                .lookup(root, side, &chain.token_path_to(i - 1))
                .expect("parent node resolved in previous step")
        };
        Ok(self.arena.attach_child(root, parent, node))
    }

    fn reuse_node(
        &mut self,
        node_id: NodeId,
        chain: &TokenizedChain,
        i: usize,
        overrides: &AttachedOverrides,
        script_id: &str,
        sink: &mut DiagnosticSink,
    ) -> Result<(), CompileError> {
        let token_path = chain.token_path_to(i);
        let override_concrete = overrides
            .get(&token_path)
            .and_then(|o| o.concrete_type.clone());

        let node = self.arena.get_mut(node_id);
        node.register_script(script_id);
        if chain.anchor == Some(i) {
            node.anchored = true;
        }

        // concrete types only matter where elements are constructed
        if self.arena.get(node_id).side != Side::Target {
            return Ok(());
        }

        if let Some(name) = override_concrete {
            let declared = self.arena.get(node_id).resolved_type;
            let existing = self.arena.get(node_id).concrete_type;
            match existing {
                Some(current) if self.index.name_of(current) != name => {
                    sink.push(
                        Diagnostic::warning(format!(
                            "conflicting concrete-type override '{}' ignored, keeping '{}'",
                            name,
                            self.index.name_of(current)
                        ))
                        .for_script(script_id)
                        .at_path(&token_path),
                    );
                }
                Some(_) => {}
                None => {
                    let id = self.index.concrete_for(declared, &name).map_err(|e| {
                        CompileError::semantics(script_id, e.to_string()).at_path(&token_path)
                    })?;
                    self.arena.get_mut(node_id).concrete_type = Some(id);
                }
            }
        }
        Ok(())
    }

    fn resolve_concrete(
        &self,
        token_path: &str,
        element_type: ResolvedType,
        field_default: Option<&str>,
        overrides: &AttachedOverrides,
        script_id: &str,
        will_construct: bool,
    ) -> Result<Option<TypeId>, CompileError> {
        let object_id = match element_type {
            ResolvedType::Object(id) => id,
            _ => return Ok(None), // scalars and enums are not constructed
        };

        let named = overrides
            .get(token_path)
            .and_then(|o| o.concrete_type.as_deref())
            .or(field_default);

        if let Some(name) = named {
            let id = self.index.concrete_for(element_type, name).map_err(|e| {
                CompileError::semantics(script_id, e.to_string()).at_path(token_path)
            })?;
            return Ok(Some(id));
        }

        if self.index.get(object_id).is_abstract {
            if will_construct {
                return Err(CompileError::semantics(
                    script_id,
                    format!(
                        "abstract type '{}' requires a concrete-type override",
                        self.index.name_of(object_id)
                    ),
                )
                .at_path(token_path));
            }
            return Ok(None);
        }
        Ok(Some(object_id))
    }

    fn check_notation(
        &self,
        node_id: NodeId,
        segment: &ChainSegment,
        script_id: &str,
        token_path: &str,
    ) -> Result<(), CompileError> {
        let node = self.arena.get(node_id);
        let err = |message: String| {
            Err(CompileError::semantics(script_id, message).at_path(token_path))
        };
        match node.cardinality {
            Cardinality::List => {
                if segment.collection.is_none() {
                    return err(format!(
                        "field '{}' is a collection; token lacks bracket notation",
                        segment.name
                    ));
                }
                if segment.map_slot.is_some() {
                    return err(format!(
                        "field '{}' is a collection, not a map; map slot marker is invalid",
                        segment.name
                    ));
                }
            }
            Cardinality::Map => {
                if segment.map_slot.is_none() {
                    return err(format!(
                        "field '{}' is a map; token requires a <K> or <V> marker",
                        segment.name
                    ));
                }
                if segment.collection.is_some() {
                    return err(format!(
                        "field '{}' is a map; bracket index notation is invalid",
                        segment.name
                    ));
                }
            }
            Cardinality::Single => {
                if segment.has_notation() {
                    return err(format!(
                        "notation disagrees with field type: '{}' is neither a collection nor a map",
                        segment.name
                    ));
                }
            }
        }
        Ok(())
    }

    /// Resolves and caches one accessor slot; the cached outcome (success or
    /// failure) is shared by every script that touches the node.
    fn ensure_accessor(
        &mut self,
        node_id: NodeId,
        kind: AccessorKind,
        helper_requested: bool,
        script_id: &str,
    ) -> Result<(), CompileError> {
        let node = self.arena.get(node_id);
        if node.is_root() {
            return Ok(());
        }
        let slot = match kind {
            AccessorKind::Getter => &node.getter,
            AccessorKind::Setter => &node.setter,
        };

        let outcome = match slot {
            Some(cached) => cached.clone(),
            None => {
                let declaring = node.declaring_type.expect("non-root node has declaring type");
                let field = self
                    .index
                    .field_of(declaring, &node.field_name)
                    .expect("field verified at node creation")
                    .clone();
                let req = ResolutionRequest {
                    index: self.index,
                    declaring,
                    field: &field,
                    helper_requested,
                };
                let resolved = resolve_accessor(&req, kind);
                debug!(
                    token_path = %node.token_path,
                    kind = ?kind,
                    ok = resolved.is_ok(),
                    "accessor resolved"
                );
                let node = self.arena.get_mut(node_id);
                match kind {
                    AccessorKind::Getter => node.getter = Some(resolved.clone()),
                    AccessorKind::Setter => node.setter = Some(resolved.clone()),
                }
                resolved
            }
        };

        match outcome {
            Ok(_) => Ok(()),
            Err(note) => {
                let node = self.arena.get(node_id);
                let what = match kind {
                    AccessorKind::Getter => "getter",
                    AccessorKind::Setter => "setter",
                };
                Err(CompileError::semantics(
                    script_id,
                    format!("cannot resolve {} for '{}': {}", what, node.field_name, note),
                )
                .at_path(&node.token_path))
            }
        }
    }
}

/// Effective value type a segment stands on after crossing its level.
fn effective_segment_type(node: &PathNode, segment: &ChainSegment) -> ResolvedType {
    match segment.map_slot {
        Some(MapSlot::Key) => ResolvedType::Scalar(node.key_type.unwrap_or(ScalarType::String)),
        _ => node.resolved_type,
    }
}

/// Effective role of a segment under one script's notation.
fn effective_role(node: &PathNode, segment: &ChainSegment, is_last: bool) -> NodeRole {
    match segment.map_slot {
        Some(MapSlot::Key) => return NodeRole::MapKey,
        Some(MapSlot::Value) => return NodeRole::MapValue,
        None => {}
    }
    if segment.is_pinned() {
        return NodeRole::CollectionMember;
    }
    if segment.collection.is_some() {
        return NodeRole::CollectionContainer;
    }
    if node.is_root() {
        NodeRole::Root
    } else if is_last {
        NodeRole::Leaf
    } else {
        NodeRole::Intermediate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::attach_overrides;
    use pretty_assertions::assert_eq;

    const MODEL: &str = r#"
types:
  - name: Order
    fields:
      - { name: customer, type: Customer }
      - { name: cells, type: Cell, cardinality: list }
  - name: Customer
    fields:
      - { name: fullName, type: String }
  - name: Cell
    fields:
      - { name: value, type: String }
  - name: OrderView
    fields:
      - { name: name, type: String }
      - { name: rows, type: Row, cardinality: list, concrete: DenseRow }
      - { name: labels, type: String, cardinality: map }
  - name: Row
    abstract: true
    fields:
      - { name: cells, type: CellView, cardinality: list }
  - name: DenseRow
    extends: Row
    fields: []
  - name: CellView
    fields:
      - { name: value, type: String }
"#;

    fn setup() -> (TypeIndex, NodeArena) {
        (TypeIndex::from_yaml(MODEL).unwrap(), NodeArena::new())
    }

    fn resolve(
        index: &TypeIndex,
        arena: &mut NodeArena,
        root: &str,
        side: Side,
        raw: &str,
        script_id: &str,
    ) -> Result<ResolvedChain, CompileError> {
        let chain = TokenizedChain::tokenize(script_id, raw).unwrap();
        let mut sink = DiagnosticSink::new();
        let overrides = attach_overrides(&chain, &[], script_id, &mut sink).unwrap();
        let root_id = index.lookup(root).unwrap();
        Resolver::new(index, arena).resolve_chain(
            root_id, side, &chain, &overrides, script_id, &mut sink,
        )
    }

    #[test]
    fn resolves_flat_chain_with_accessors() {
        let (index, mut arena) = setup();
        let resolved = resolve(
            &index,
            &mut arena,
            "Order",
            Side::Source,
            "customer.fullName",
            "s1",
        )
        .unwrap();
        assert_eq!(resolved.roles, vec![NodeRole::Intermediate, NodeRole::Leaf]);
        let leaf = arena.get(resolved.leaf_node());
        let getter = leaf.getter.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(getter.method, "getFullName");
        // source side resolves no setters
        assert!(leaf.setter.is_none());
    }

    #[test]
    fn shares_one_node_per_token_path() {
        let (index, mut arena) = setup();
        let a = resolve(
            &index,
            &mut arena,
            "Order",
            Side::Source,
            "customer.fullName",
            "s1",
        )
        .unwrap();
        let before = arena.len();
        let b = resolve(&index, &mut arena, "Order", Side::Source, "customer", "s2").unwrap();
        assert_eq!(arena.len(), before);
        assert_eq!(a.nodes[0], b.nodes[0]);
        let shared = arena.get(a.nodes[0]);
        assert!(shared.scripts.contains("s1") && shared.scripts.contains("s2"));
    }

    #[test]
    fn unknown_field_names_script_and_token() {
        let (index, mut arena) = setup();
        let err = resolve(
            &index,
            &mut arena,
            "Order",
            Side::Source,
            "customer.nickname",
            "s9",
        )
        .unwrap_err();
        assert_eq!(err.script_id(), "s9");
        assert_eq!(err.token_path(), Some("customer.nickname"));
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn notation_must_agree_with_cardinality() {
        let (index, mut arena) = setup();
        // collection without brackets
        assert!(resolve(
            &index,
            &mut arena,
            "Order",
            Side::Source,
            "cells.value",
            "s1"
        )
        .is_err());
        // plain field with brackets
        assert!(resolve(
            &index,
            &mut arena,
            "Order",
            Side::Source,
            "customer[].fullName",
            "s2"
        )
        .is_err());
        // map without slot marker
        assert!(resolve(
            &index,
            &mut arena,
            "OrderView",
            Side::Target,
            "labels",
            "s3"
        )
        .is_err());
    }

    #[test]
    fn abstract_element_uses_field_default_concrete() {
        let (index, mut arena) = setup();
        let resolved = resolve(
            &index,
            &mut arena,
            "OrderView",
            Side::Target,
            "rows[].cells[].value",
            "s1",
        )
        .unwrap();
        let rows = arena.get(resolved.nodes[0]);
        assert_eq!(rows.concrete_type, Some(index.lookup("DenseRow").unwrap()));
    }

    #[test]
    fn source_side_reuse_ignores_concrete_overrides() {
        let (index, mut arena) = setup();
        resolve(&index, &mut arena, "Order", Side::Source, "cells[].value", "s1").unwrap();

        let chain = TokenizedChain::tokenize("s2", "cells[].value").unwrap();
        let mut sink = DiagnosticSink::new();
        let specs = [crate::scripts::OverrideSpec {
            path: "cells".into(),
            concrete_type: Some("Cell".into()),
            access: None,
        }];
        let overrides = attach_overrides(&chain, &specs, "s2", &mut sink).unwrap();
        let root_id = index.lookup("Order").unwrap();
        let resolved = Resolver::new(&index, &mut arena)
            .resolve_chain(root_id, Side::Source, &chain, &overrides, "s2", &mut sink)
            .unwrap();

        let cells = arena.get(resolved.nodes[0]);
        assert!(cells.concrete_type.is_none());
        assert!(cells.scripts.contains("s2"));
    }

    #[test]
    fn map_key_segment_resolves_to_key_type() {
        let (index, mut arena) = setup();
        let resolved = resolve(
            &index,
            &mut arena,
            "OrderView",
            Side::Target,
            "labels<K>",
            "s1",
        )
        .unwrap();
        assert_eq!(resolved.leaf_role(), NodeRole::MapKey);
        assert_eq!(
            resolved.leaf_type(),
            ResolvedType::Scalar(ScalarType::String)
        );
        // the shared node keeps the structural classification
        assert_eq!(arena.get(resolved.leaf_node()).role, NodeRole::MapContainer);
    }
}
