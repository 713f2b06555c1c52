/*!
# Type Model

Declarative descriptions of the source and target object graphs. Stands in
for host reflection: the resolver asks this index for fields, accessor
declarations, enum variants and `extends`-based assignability.
*/

pub mod entity;
pub mod index;
pub mod loader;

pub use entity::{
    AccessorSpec, Cardinality, FieldDef, ResolvedType, ScalarType, TypeDef, TypeId, TypeKind,
};
pub use index::TypeIndex;
pub use loader::TypeModelDoc;
