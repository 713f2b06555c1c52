/*!
# Accessor Resolution Strategies

Ordered list of resolution strategies for getter/setter bindings: explicit
declaration from the type model, helper-type access when an override requests
it, then the naming convention (`get`/`is`/`set` + capitalized field, boolean
getters preferring `is`). The first success wins; failures are collected into
one diagnostic note instead of being thrown away.
*/

use crate::path_tree::AccessorBinding;
use crate::typemodel::{Cardinality, FieldDef, ResolvedType, ScalarType, TypeId, TypeIndex};

/// Which accessor is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Getter,
    Setter,
}

/// Resolution context for one node's accessor
pub struct ResolutionRequest<'a> {
    pub index: &'a TypeIndex,
    pub declaring: TypeId,
    pub field: &'a FieldDef,
    /// Set when the script's override asks for helper-style access
    pub helper_requested: bool,
}

enum StrategyOutcome {
    /// Strategy does not apply to this request
    Skip,
    Resolved(AccessorBinding),
    Failed(String),
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Convention method name for a field and accessor kind. Boolean getters
/// prefer `is`; `prefer_is` selects between the two getter candidates.
fn convention_name(field: &FieldDef, kind: AccessorKind, prefer_is: bool) -> String {
    let suffix = capitalize(&field.name);
    match kind {
        AccessorKind::Getter if prefer_is => format!("is{}", suffix),
        AccessorKind::Getter => format!("get{}", suffix),
        AccessorKind::Setter => format!("set{}", suffix),
    }
}

fn is_boolean_field(index: &TypeIndex, field: &FieldDef) -> bool {
    field.cardinality == Cardinality::Single
        && matches!(
            index.resolve_name(&field.ty),
            Ok(ResolvedType::Scalar(ScalarType::Boolean))
        )
}

fn explicit(req: &ResolutionRequest<'_>, kind: AccessorKind) -> StrategyOutcome {
    let name = match (&req.field.accessors, kind) {
        (Some(spec), AccessorKind::Getter) => spec.getter.clone(),
        (Some(spec), AccessorKind::Setter) => spec.setter.clone(),
        (None, _) => None,
    };
    match name {
        None => StrategyOutcome::Skip,
        Some(name) => {
            if req.index.get(req.declaring).declares_method(&name) {
                StrategyOutcome::Resolved(AccessorBinding::direct(name))
            } else {
                StrategyOutcome::Failed(format!(
                    "explicit accessor '{}' is not declared by type '{}'",
                    name,
                    req.index.name_of(req.declaring)
                ))
            }
        }
    }
}

fn helper(req: &ResolutionRequest<'_>, kind: AccessorKind) -> StrategyOutcome {
    if !req.helper_requested {
        return StrategyOutcome::Skip;
    }
    let helper_id = match req.index.helper_of(req.declaring) {
        Some(id) => id,
        None => {
            return StrategyOutcome::Failed(format!(
                "helper access requested but type '{}' declares no helper",
                req.index.name_of(req.declaring)
            ))
        }
    };
    let name = convention_name(req.field, kind, false);
    if req.index.get(helper_id).declares_method(&name) {
        StrategyOutcome::Resolved(AccessorBinding::on_helper(name, helper_id))
    } else {
        StrategyOutcome::Failed(format!(
            "helper '{}' declares no method '{}'",
            req.index.name_of(helper_id),
            name
        ))
    }
}

fn convention(req: &ResolutionRequest<'_>, kind: AccessorKind) -> StrategyOutcome {
    let declaring = req.index.get(req.declaring);
    let mut failures = Vec::new();

    let mut candidates = Vec::new();
    if kind == AccessorKind::Getter && is_boolean_field(req.index, req.field) {
        candidates.push(convention_name(req.field, kind, true));
    }
    candidates.push(convention_name(req.field, kind, false));

    for name in candidates {
        if declaring.declares_method(&name) {
            return StrategyOutcome::Resolved(AccessorBinding::direct(name));
        }
        failures.push(format!(
            "type '{}' declares no method '{}'",
            declaring.name, name
        ));
    }
    StrategyOutcome::Failed(failures.join("; "))
}

/// Runs the strategy list, short-circuiting on the first success. On overall
/// failure the collected per-strategy notes are joined into one message.
pub fn resolve_accessor(
    req: &ResolutionRequest<'_>,
    kind: AccessorKind,
) -> Result<AccessorBinding, String> {
    let strategies: [fn(&ResolutionRequest<'_>, AccessorKind) -> StrategyOutcome; 3] =
        [explicit, helper, convention];

    let mut failures = Vec::new();
    for strategy in strategies {
        match strategy(req, kind) {
            StrategyOutcome::Skip => {}
            StrategyOutcome::Resolved(binding) => return Ok(binding),
            StrategyOutcome::Failed(note) => failures.push(note),
        }
    }
    Err(failures.join("; "))
}
