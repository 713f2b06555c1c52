/*!
# Type Model Entities

Data-driven descriptions of the two object graphs a mapping binds. The
compiler resolves fields, accessors and instantiation types against these
records instead of host reflection.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer handle into the [`TypeIndex`](super::index::TypeIndex) arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Built-in scalar leaf types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
}

impl ScalarType {
    /// Parses a scalar type name as written in descriptors and field types.
    pub fn from_name(name: &str) -> Option<ScalarType> {
        match name {
            "String" | "string" | "Str" => Some(ScalarType::String),
            "Integer" | "integer" | "Int" | "int" => Some(ScalarType::Integer),
            "Float" | "float" | "Double" | "double" => Some(ScalarType::Float),
            "Boolean" | "boolean" | "Bool" | "bool" => Some(ScalarType::Boolean),
            "Date" | "date" => Some(ScalarType::Date),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "String",
            ScalarType::Integer => "Integer",
            ScalarType::Float => "Float",
            ScalarType::Boolean => "Boolean",
            ScalarType::Date => "Date",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Field cardinality as declared in the type descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    List,
    Map,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Single => write!(f, "single"),
            Cardinality::List => write!(f, "list"),
            Cardinality::Map => write!(f, "map"),
        }
    }
}

/// Explicit accessor names overriding the naming convention
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorSpec {
    #[serde(default)]
    pub getter: Option<String>,
    #[serde(default)]
    pub setter: Option<String>,
}

/// One declared field of an object type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Element/value type name: a scalar name or a declared type name.
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Map key type name; defaults to String for map fields.
    #[serde(default)]
    pub key_type: Option<String>,
    /// Default concrete instantiation type when `ty` names an abstract type.
    #[serde(default)]
    pub concrete: Option<String>,
    #[serde(default)]
    pub accessors: Option<AccessorSpec>,
}

/// Kind of a declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Object,
    Enum,
}

/// One declared type of the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Enum variants; only meaningful for `kind: enum`.
    #[serde(default)]
    pub variants: Vec<String>,
    /// Declared method names. When present, resolved accessors must appear
    /// here; when absent, convention accessors are assumed available.
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub extends: Option<String>,
    /// Helper type providing static-style accessors for this type's fields.
    #[serde(default)]
    pub helper: Option<String>,
}

impl TypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.iter().any(|v| v == name)
    }

    /// Whether the type exposes the given method. Types without an explicit
    /// `methods` list are trusted to follow the accessor convention.
    pub fn declares_method(&self, name: &str) -> bool {
        match &self.methods {
            Some(methods) => methods.iter().any(|m| m == name),
            None => true,
        }
    }
}

/// A fully resolved value type: scalar, object or enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedType {
    Scalar(ScalarType),
    Object(TypeId),
    Enum(TypeId),
}

impl ResolvedType {
    pub fn is_scalar(&self) -> bool {
        matches!(self, ResolvedType::Scalar(_))
    }

    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            ResolvedType::Object(id) | ResolvedType::Enum(id) => Some(*id),
            ResolvedType::Scalar(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_names_parse_both_spellings() {
        assert_eq!(ScalarType::from_name("Int"), Some(ScalarType::Integer));
        assert_eq!(ScalarType::from_name("string"), Some(ScalarType::String));
        assert_eq!(ScalarType::from_name("Order"), None);
    }

    #[test]
    fn missing_methods_list_trusts_convention() {
        let def = TypeDef {
            name: "Order".into(),
            kind: TypeKind::Object,
            fields: vec![],
            variants: vec![],
            methods: None,
            is_abstract: false,
            extends: None,
            helper: None,
        };
        assert!(def.declares_method("getTotal"));

        let strict = TypeDef {
            methods: Some(vec!["getTotal".into()]),
            ..def
        };
        assert!(strict.declares_method("getTotal"));
        assert!(!strict.declares_method("setTotal"));
    }
}
