/*!
# Script File Loader

Deserializes script documents and performs the structural checks that must
reject malformed records before generation starts: duplicate ids, conflicting
source forms, missing mandatory parts. Rejection is per record; sibling
records of the same file still compile.
*/

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::core::CompileError;

use super::model::{ScriptFile, ScriptRecord};

impl ScriptFile {
    pub fn from_yaml(content: &str) -> Result<ScriptFile> {
        serde_yaml::from_str(content).context("malformed script document")
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<ScriptFile> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read script file {}", path.display()))?;
        let file = ScriptFile::from_yaml(&content)
            .with_context(|| format!("in script file {}", path.display()))?;
        info!(
            file = %path.display(),
            scripts = file.scripts.len(),
            target_root = %file.target_root,
            "loaded script file"
        );
        Ok(file)
    }

    /// Structural pre-generation validation. Returns the records that may
    /// proceed to generation and the per-record rejections.
    pub fn validate_records(&self) -> (Vec<&ScriptRecord>, Vec<CompileError>) {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for record in &self.scripts {
            if record.id.trim().is_empty() {
                rejected.push(CompileError::config("<unnamed>", "record has an empty id"));
                continue;
            }
            if !seen.insert(record.id.as_str()) {
                rejected.push(CompileError::config(
                    &record.id,
                    "duplicate script id within one file",
                ));
                continue;
            }
            if record.target.path.trim().is_empty() {
                rejected.push(CompileError::config(&record.id, "record has no target path"));
                continue;
            }
            if let Err(err) = record.form() {
                rejected.push(err);
                continue;
            }
            debug!(script_id = %record.id, "record accepted for generation");
            accepted.push(record);
        }

        (accepted, rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
target_root: OrderView
source_root: Order
scripts:
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
  - id: copy-name
    target: { path: "other" }
    source: { path: "customer.fullName" }
  - id: broken
    target: { path: "x" }
  - id: disabled-one
    enabled: false
    target: { path: "tags[]" }
    values: ["a"]
"#;

    #[test]
    fn duplicate_ids_and_missing_forms_are_rejected_per_record() {
        let file = ScriptFile::from_yaml(DOC).unwrap();
        let (accepted, rejected) = file.validate_records();
        let accepted_ids: Vec<&str> = accepted.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(accepted_ids, vec!["copy-name", "disabled-one"]);
        assert_eq!(rejected.len(), 2);
        assert!(rejected[0].to_string().contains("duplicate script id"));
        assert!(rejected[1].to_string().contains("no source chain"));
    }
}
