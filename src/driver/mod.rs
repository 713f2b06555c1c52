/*!
# Compilation Driver

Per-file and per-directory orchestration: load a script document, validate
its records, compile each accepted record through the generator and collect
the outcomes into reports. One script's failure never hides its siblings;
only a generation-engine invariant violation aborts the file.
*/

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::codegen::{Generator, PlanUnit};
use crate::core::{CompileError, DiagnosticSink, FileReport, RunReport, ScriptOutcome};
use crate::path_tree::NodeArena;
use crate::scripts::ScriptFile;
use crate::typemodel::TypeIndex;

/// Product of compiling one script file: the report, the emitted plan and
/// the Path-Tree the plan's node ids point into
#[derive(Debug)]
pub struct CompiledFile {
    pub report: FileReport,
    pub plan: PlanUnit,
    pub arena: NodeArena,
}

/// Compilation entry point seam, so embedders can swap the in-process
/// pipeline for a caching or remote one
pub trait CompilationDriver {
    fn compile(&self, index: &TypeIndex, file: &ScriptFile) -> CompiledFile;
}

/// The default single-process pipeline
#[derive(Debug, Default)]
pub struct InProcessDriver;

impl CompilationDriver for InProcessDriver {
    fn compile(&self, index: &TypeIndex, file: &ScriptFile) -> CompiledFile {
        compile_scripts(index, file)
    }
}

/// Compiles one parsed script document.
pub fn compile_scripts(index: &TypeIndex, file: &ScriptFile) -> CompiledFile {
    let mut report = FileReport::new(&file.target_root, &file.source_root);
    let mut arena = NodeArena::new();
    let mut plan = PlanUnit::new(&file.source_root, &file.target_root);

    let roots = (
        index.lookup(&file.target_root),
        index.lookup(&file.source_root),
    );
    let (target_root, source_root) = match roots {
        (Some(t), Some(s)) => (t, s),
        _ => {
            let missing = if roots.0.is_none() {
                &file.target_root
            } else {
                &file.source_root
            };
            report.aborted = Some(CompileError::config(
                "<file>",
                format!("unknown root type '{}'", missing),
            ));
            return CompiledFile {
                report,
                plan,
                arena,
            };
        }
    };

    let (accepted, rejected) = file.validate_records();
    for error in rejected {
        report.outcomes.push(ScriptOutcome::Failed {
            script_id: error.script_id().to_string(),
            error,
        });
    }

    let generator = Generator::new(index);
    for record in accepted {
        if !record.enabled {
            report.outcomes.push(ScriptOutcome::Skipped {
                script_id: record.id.clone(),
                reason: "record is disabled".into(),
            });
            continue;
        }

        let mut sink = DiagnosticSink::new();
        let result = generator.generate(&mut arena, target_root, source_root, record, &mut sink);
        report.diagnostics.merge(sink);

        match result {
            Ok(Some(unit)) => {
                plan.units.push(unit);
                report.outcomes.push(ScriptOutcome::Generated {
                    script_id: record.id.clone(),
                });
            }
            Ok(None) => {
                report.outcomes.push(ScriptOutcome::Skipped {
                    script_id: record.id.clone(),
                    reason: "value list is empty".into(),
                });
            }
            Err(error) if error.aborts_file() => {
                warn!(script_id = %record.id, %error, "file aborted");
                report.aborted = Some(error);
                break;
            }
            Err(error) => {
                report.outcomes.push(ScriptOutcome::Failed {
                    script_id: record.id.clone(),
                    error,
                });
            }
        }
    }

    info!(
        target_root = %file.target_root,
        generated = report.generated_count(),
        failed = report.failed_count(),
        "file compiled"
    );
    CompiledFile {
        report,
        plan,
        arena,
    }
}

/// Loads and compiles one script file from disk.
pub fn compile_file<P: AsRef<Path>>(index: &TypeIndex, path: P) -> Result<CompiledFile> {
    let path = path.as_ref();
    let file = ScriptFile::load_from_file(path)?;
    let mut compiled = compile_scripts(index, &file);
    compiled.report.file = Some(path.display().to_string());
    Ok(compiled)
}

/// Compiles every `.yaml`/`.yml` script file under a directory.
pub fn compile_directory<P: AsRef<Path>>(
    index: &TypeIndex,
    dir: P,
) -> Result<(RunReport, Vec<CompiledFile>)> {
    let dir = dir.as_ref();
    let mut run = RunReport::new();
    let mut compiled_files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("cannot walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_yaml = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }
        let compiled = compile_file(index, entry.path())?;
        run.add(compiled.report.clone());
        compiled_files.push(compiled);
    }

    Ok((run, compiled_files))
}

/// Builds one type index from a list of descriptor files.
pub fn load_type_index<P: AsRef<Path>>(paths: &[P]) -> Result<TypeIndex> {
    let mut index = TypeIndex::new();
    for path in paths {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read type descriptor {}", path.display()))?;
        index
            .merge_yaml(&content)
            .with_context(|| format!("in type descriptor {}", path.display()))?;
    }
    index.validate()?;
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
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
      - { name: rows, type: Row, cardinality: list }
  - name: Row
    fields:
      - { name: cells, type: CellView, cardinality: list }
  - name: CellView
    fields:
      - { name: value, type: String }
"#;

    const SCRIPTS: &str = r#"
target_root: OrderView
source_root: Order
scripts:
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
  - id: bad-field
    target: { path: "nickname" }
    source: { path: "customer.fullName" }
  - id: off
    enabled: false
    target: { path: "name" }
    source: { path: "customer.fullName" }
  - id: pair-cells
    target: { path: "rows[~].cells[].value" }
    source: { path: "cells[].value" }
"#;

    #[test]
    fn failures_are_contained_per_script() {
        let index = TypeIndex::from_yaml(MODEL).unwrap();
        let file = ScriptFile::from_yaml(SCRIPTS).unwrap();
        let compiled = compile_scripts(&index, &file);

        assert_eq!(compiled.report.generated_count(), 2);
        assert_eq!(compiled.report.failed_count(), 1);
        assert_eq!(compiled.report.skipped_count(), 1);
        assert!(compiled.report.is_success());
        assert_eq!(compiled.plan.units.len(), 2);
        assert!(compiled.plan.unit("copy-name").is_some());
        // the failed script emitted nothing
        assert!(compiled.plan.unit("bad-field").is_none());
    }

    #[test]
    fn unknown_root_type_aborts_the_file() {
        let index = TypeIndex::from_yaml(MODEL).unwrap();
        let mut file = ScriptFile::from_yaml(SCRIPTS).unwrap();
        file.source_root = "Nowhere".into();
        let compiled = compile_scripts(&index, &file);
        assert!(!compiled.report.is_success());
        assert!(compiled.report.aborted.is_some());
    }

    #[test]
    fn directory_compile_aggregates_reports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), SCRIPTS).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let index = TypeIndex::from_yaml(MODEL).unwrap();
        let (run, files) = compile_directory(&index, dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(run.is_success());
    }
}
