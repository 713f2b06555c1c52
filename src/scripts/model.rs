/*!
# Script File Data Model

Serde model of one mapping-script document: an ordered list of script
records bound to a (source root, target root) type pair. Records are
immutable after parse; depth counts are derived during compilation.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::CompileError;

/// Accessor style requested by an override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Default,
    Helper,
}

/// One per-token override carried by a locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSpec {
    /// Dotted sanitized token path the override targets
    pub path: String,
    #[serde(default)]
    pub concrete_type: Option<String>,
    #[serde(default)]
    pub access: Option<AccessKind>,
}

/// A path chain plus its overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub path: String,
    #[serde(default)]
    pub overrides: Vec<OverrideSpec>,
}

impl Locator {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            overrides: Vec::new(),
        }
    }
}

/// Literal value usable in a literal-values script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Null => write!(f, "null"),
            LiteralValue::Bool(b) => write!(f, "{}", b),
            LiteralValue::Int(i) => write!(f, "{}", i),
            LiteralValue::Float(x) => write!(f, "{}", x),
            LiteralValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Execution order for delegated-execute scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecOrder {
    #[default]
    ConverterFirst,
    ModuleFirst,
}

/// Delegated-execute descriptor: sub-module namespace and/or converter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSpec {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub converter: Option<String>,
    /// Source chain the delegate reads from; omitted, the delegate receives
    /// the source root itself
    #[serde(default)]
    pub source: Option<Locator>,
    /// Explicit order is honored verbatim; default is converter-before-module.
    #[serde(default)]
    pub order: Option<ExecOrder>,
}

impl ExecuteSpec {
    pub fn effective_order(&self) -> ExecOrder {
        self.order.unwrap_or_default()
    }
}

fn default_enabled() -> bool {
    true
}

/// One mapping-script record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub target: Locator,
    #[serde(default)]
    pub source: Option<Locator>,
    #[serde(default)]
    pub values: Option<Vec<LiteralValue>>,
    #[serde(default)]
    pub execute: Option<ExecuteSpec>,
}

/// The exactly-one source form of a record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptForm<'a> {
    Copy(&'a Locator),
    Values(&'a [LiteralValue]),
    Execute(&'a ExecuteSpec),
}

impl ScriptRecord {
    /// Classifies the record's source form; more or fewer than one form is a
    /// configuration error.
    pub fn form(&self) -> Result<ScriptForm<'_>, CompileError> {
        match (&self.source, &self.values, &self.execute) {
            (Some(source), None, None) => Ok(ScriptForm::Copy(source)),
            (None, Some(values), None) => Ok(ScriptForm::Values(values)),
            (None, None, Some(execute)) => {
                if execute.module.is_none() && execute.converter.is_none() {
                    Err(CompileError::config(
                        &self.id,
                        "execute descriptor names neither a module nor a converter",
                    ))
                } else {
                    Ok(ScriptForm::Execute(execute))
                }
            }
            (None, None, None) => Err(CompileError::config(
                &self.id,
                "record carries no source chain, value list or execute descriptor",
            )),
            _ => Err(CompileError::config(
                &self.id,
                "record carries more than one of source chain, value list and execute descriptor",
            )),
        }
    }
}

/// One script document bound to a root type pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFile {
    pub target_root: String,
    pub source_root: String,
    pub scripts: Vec<ScriptRecord>,
}
