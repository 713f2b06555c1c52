/*!
# Type Descriptor Loader

Loads YAML type-descriptor documents into a [`TypeIndex`]. A descriptor file
holds a flat `types:` list; multiple files may be merged into one index as
long as type names stay unique.
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::entity::TypeDef;
use super::index::TypeIndex;

/// Top-level shape of a type-descriptor document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeModelDoc {
    pub types: Vec<TypeDef>,
}

impl TypeIndex {
    /// Builds an index from a single descriptor string.
    pub fn from_yaml(content: &str) -> Result<TypeIndex> {
        let mut index = TypeIndex::new();
        index.merge_yaml(content)?;
        index.validate()?;
        Ok(index)
    }

    /// Adds the types of one descriptor document to this index.
    pub fn merge_yaml(&mut self, content: &str) -> Result<()> {
        let doc: TypeModelDoc =
            serde_yaml::from_str(content).context("malformed type descriptor document")?;
        for def in doc.types {
            self.add_type(def)?;
        }
        Ok(())
    }

    /// Loads one descriptor file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<TypeIndex> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read type descriptor {}", path.display()))?;
        let index = TypeIndex::from_yaml(&content)
            .with_context(|| format!("in type descriptor {}", path.display()))?;
        info!(
            file = %path.display(),
            types = index.len(),
            "loaded type model"
        );
        Ok(index)
    }
}
