/*!
# Unified Type Index

Registry over all declared types of both object graphs with O(1) name lookup,
`extends`-chain assignability and instantiation checks. The index is built
once per compile run and never mutated afterwards.
*/

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::entity::{FieldDef, ResolvedType, ScalarType, TypeDef, TypeId, TypeKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeIndex {
    types: Vec<TypeDef>,
    by_name: HashMap<String, TypeId>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, def: TypeDef) -> Result<TypeId> {
        if ScalarType::from_name(&def.name).is_some() {
            bail!("type name '{}' shadows a built-in scalar", def.name);
        }
        if self.by_name.contains_key(&def.name) {
            bail!("duplicate type name '{}'", def.name);
        }
        let id = TypeId(self.types.len() as u32);
        debug!(type_name = %def.name, id = %id, "registered type");
        self.by_name.insert(def.name.clone(), id);
        self.types.push(def);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: TypeId) -> &str {
        &self.get(id).name
    }

    /// Renders a resolved type for diagnostics.
    pub fn display(&self, ty: ResolvedType) -> String {
        match ty {
            ResolvedType::Scalar(s) => s.name().to_string(),
            ResolvedType::Object(id) | ResolvedType::Enum(id) => self.name_of(id).to_string(),
        }
    }

    /// Resolves a type name as written in descriptors: scalars first, then
    /// declared types.
    pub fn resolve_name(&self, name: &str) -> Result<ResolvedType> {
        if let Some(scalar) = ScalarType::from_name(name) {
            return Ok(ResolvedType::Scalar(scalar));
        }
        let id = self
            .lookup(name)
            .ok_or_else(|| anyhow!("unknown type '{}'", name))?;
        Ok(match self.get(id).kind {
            TypeKind::Object => ResolvedType::Object(id),
            TypeKind::Enum => ResolvedType::Enum(id),
        })
    }

    pub fn field_of(&self, id: TypeId, name: &str) -> Option<&FieldDef> {
        self.get(id).field(name)
    }

    /// Walks the `extends` chain from `sub` looking for `ancestor`.
    pub fn extends_or_is(&self, sub: TypeId, ancestor: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self
                .get(id)
                .extends
                .as_deref()
                .and_then(|name| self.lookup(name));
        }
        false
    }

    /// Assignment compatibility between leaf or element types: identity,
    /// subtype via the `extends` chain, integer-to-float widening.
    pub fn is_assignable(&self, from: ResolvedType, to: ResolvedType) -> bool {
        match (from, to) {
            (ResolvedType::Scalar(a), ResolvedType::Scalar(b)) => {
                a == b || (a == ScalarType::Integer && b == ScalarType::Float)
            }
            (ResolvedType::Object(a), ResolvedType::Object(b)) => self.extends_or_is(a, b),
            (ResolvedType::Enum(a), ResolvedType::Enum(b)) => a == b,
            _ => false,
        }
    }

    /// Validates a concrete instantiation type against a declared element
    /// type: it must exist, be non-abstract and assignable to the declared
    /// type.
    pub fn concrete_for(&self, declared: ResolvedType, concrete_name: &str) -> Result<TypeId> {
        let id = self
            .lookup(concrete_name)
            .ok_or_else(|| anyhow!("unknown concrete type '{}'", concrete_name))?;
        let def = self.get(id);
        if def.is_abstract {
            bail!("concrete type '{}' is itself abstract", concrete_name);
        }
        match declared {
            ResolvedType::Object(declared_id) if self.extends_or_is(id, declared_id) => Ok(id),
            _ => bail!(
                "concrete type '{}' is not assignable to declared type '{}'",
                concrete_name,
                self.display(declared)
            ),
        }
    }

    /// Resolves the helper type attached to a declaring type, if any.
    pub fn helper_of(&self, id: TypeId) -> Option<TypeId> {
        self.get(id)
            .helper
            .as_deref()
            .and_then(|name| self.lookup(name))
    }

    /// Cross-checks referential integrity after loading: every field type,
    /// key type, `extends` and `helper` reference must resolve.
    pub fn validate(&self) -> Result<()> {
        for def in &self.types {
            if let Some(parent) = &def.extends {
                if self.lookup(parent).is_none() {
                    bail!("type '{}' extends unknown type '{}'", def.name, parent);
                }
            }
            if let Some(helper) = &def.helper {
                if self.lookup(helper).is_none() {
                    bail!("type '{}' names unknown helper '{}'", def.name, helper);
                }
            }
            for field in &def.fields {
                self.resolve_name(&field.ty).map_err(|e| {
                    anyhow!("field '{}.{}': {}", def.name, field.name, e)
                })?;
                if let Some(key) = &field.key_type {
                    let key_ty = self.resolve_name(key).map_err(|e| {
                        anyhow!("field '{}.{}' key: {}", def.name, field.name, e)
                    })?;
                    if !key_ty.is_scalar() {
                        bail!(
                            "field '{}.{}' key type '{}' must be a scalar",
                            def.name,
                            field.name,
                            key
                        );
                    }
                }
                if let Some(concrete) = &field.concrete {
                    let declared = self.resolve_name(&field.ty)?;
                    self.concrete_for(declared, concrete).map_err(|e| {
                        anyhow!("field '{}.{}': {}", def.name, field.name, e)
                    })?;
                }
            }
        }
        Ok(())
    }
}
