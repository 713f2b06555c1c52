/*!
# Leaf Compatibility

Convertibility rules for the innermost get/convert/set operation: dates
convert to/from strings and to each other, enums convert to/from strings,
anything else must be assignment-compatible.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scripts::LiteralValue;
use crate::typemodel::{ResolvedType, ScalarType, TypeId, TypeIndex};

/// Conversion applied between the retrieved source value and the assigned
/// target value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conversion {
    Identity,
    /// Integer to float widening
    Widen,
    DateToString,
    StringToDate,
    EnumToString,
    /// Target enum type the string is parsed into
    StringToEnum(TypeId),
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Identity => write!(f, "identity"),
            Conversion::Widen => write!(f, "widen"),
            Conversion::DateToString => write!(f, "date->string"),
            Conversion::StringToDate => write!(f, "string->date"),
            Conversion::EnumToString => write!(f, "enum->string"),
            Conversion::StringToEnum(_) => write!(f, "string->enum"),
        }
    }
}

/// Picks the conversion for a (source leaf, target leaf) type pair, or
/// reports a typed incompatibility.
pub fn leaf_conversion(
    index: &TypeIndex,
    from: ResolvedType,
    to: ResolvedType,
) -> Result<Conversion, String> {
    use ResolvedType::*;
    use ScalarType::*;

    match (from, to) {
        (Scalar(Date), Scalar(Date)) => Ok(Conversion::Identity),
        (Scalar(Date), Scalar(String)) => Ok(Conversion::DateToString),
        (Scalar(String), Scalar(Date)) => Ok(Conversion::StringToDate),
        (Enum(a), Enum(b)) if a == b => Ok(Conversion::Identity),
        (Enum(_), Scalar(String)) => Ok(Conversion::EnumToString),
        (Scalar(String), Enum(id)) => Ok(Conversion::StringToEnum(id)),
        (Scalar(Integer), Scalar(Float)) => Ok(Conversion::Widen),
        (from, to) if index.is_assignable(from, to) => Ok(Conversion::Identity),
        (from, to) => Err(format!(
            "incompatible leaf types: cannot convert '{}' to '{}'",
            index.display(from),
            index.display(to)
        )),
    }
}

/// Picks the conversion for a literal value landing on a target leaf.
/// Enum-typed leaves additionally require the string to name a declared
/// variant, checked at compile time.
pub fn literal_conversion(
    index: &TypeIndex,
    value: &LiteralValue,
    to: ResolvedType,
) -> Result<Conversion, String> {
    use ResolvedType::*;
    use ScalarType::*;

    match (value, to) {
        (LiteralValue::Null, _) => Ok(Conversion::Identity),
        (LiteralValue::Bool(_), Scalar(Boolean)) => Ok(Conversion::Identity),
        (LiteralValue::Int(_), Scalar(Integer)) => Ok(Conversion::Identity),
        (LiteralValue::Int(_), Scalar(Float)) => Ok(Conversion::Widen),
        (LiteralValue::Float(_), Scalar(Float)) => Ok(Conversion::Identity),
        (LiteralValue::Str(_), Scalar(String)) => Ok(Conversion::Identity),
        (LiteralValue::Str(_), Scalar(Date)) => Ok(Conversion::StringToDate),
        (LiteralValue::Str(s), Enum(id)) => {
            if index.get(id).variants.iter().any(|v| v == s) {
                Ok(Conversion::StringToEnum(id))
            } else {
                Err(format!(
                    "'{}' names no variant of enum '{}'",
                    s,
                    index.name_of(id)
                ))
            }
        }
        (value, to) => Err(format!(
            "literal {} cannot be assigned to '{}'",
            value,
            index.display(to)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemodel::{TypeDef, TypeKind};

    fn index_with_enum() -> (TypeIndex, TypeId) {
        let mut index = TypeIndex::new();
        let id = index
            .add_type(TypeDef {
                name: "Palette".into(),
                kind: TypeKind::Enum,
                fields: vec![],
                variants: vec!["RED".into(), "GREEN".into()],
                methods: None,
                is_abstract: false,
                extends: None,
                helper: None,
            })
            .unwrap();
        (index, id)
    }

    #[test]
    fn date_and_string_interconvert() {
        let index = TypeIndex::new();
        assert_eq!(
            leaf_conversion(
                &index,
                ResolvedType::Scalar(ScalarType::Date),
                ResolvedType::Scalar(ScalarType::String)
            ),
            Ok(Conversion::DateToString)
        );
        assert_eq!(
            leaf_conversion(
                &index,
                ResolvedType::Scalar(ScalarType::String),
                ResolvedType::Scalar(ScalarType::Date)
            ),
            Ok(Conversion::StringToDate)
        );
    }

    #[test]
    fn enums_convert_via_strings_only() {
        let (index, id) = index_with_enum();
        assert_eq!(
            leaf_conversion(
                &index,
                ResolvedType::Enum(id),
                ResolvedType::Scalar(ScalarType::String)
            ),
            Ok(Conversion::EnumToString)
        );
        assert_eq!(
            leaf_conversion(
                &index,
                ResolvedType::Scalar(ScalarType::String),
                ResolvedType::Enum(id)
            ),
            Ok(Conversion::StringToEnum(id))
        );
        assert!(leaf_conversion(
            &index,
            ResolvedType::Enum(id),
            ResolvedType::Scalar(ScalarType::Integer)
        )
        .is_err());
    }

    #[test]
    fn literal_enum_variant_is_checked() {
        let (index, id) = index_with_enum();
        assert_eq!(
            literal_conversion(
                &index,
                &LiteralValue::Str("RED".into()),
                ResolvedType::Enum(id)
            ),
            Ok(Conversion::StringToEnum(id))
        );
        let err = literal_conversion(
            &index,
            &LiteralValue::Str("MAUVE".into()),
            ResolvedType::Enum(id),
        )
        .unwrap_err();
        assert!(err.contains("no variant"));
    }

    #[test]
    fn incompatible_pair_names_both_types() {
        let index = TypeIndex::new();
        let err = leaf_conversion(
            &index,
            ResolvedType::Scalar(ScalarType::Boolean),
            ResolvedType::Scalar(ScalarType::Date),
        )
        .unwrap_err();
        assert!(err.contains("Boolean"));
        assert!(err.contains("Date"));
    }
}
