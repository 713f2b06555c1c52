/*!
# Compilation Reports

Per-file and per-run result structures consumed by the CLI reporters.
One script's failure never hides its siblings; a file-level abort is recorded
with its cause and the remaining scripts marked as not generated.
*/

use super::errors::{CompileError, DiagnosticSink};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of generating one script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScriptOutcome {
    /// Code was emitted for the script
    Generated { script_id: String },
    /// The script failed; no code was emitted for it
    Failed {
        script_id: String,
        error: CompileError,
    },
    /// The script was skipped (disabled record, empty value list)
    Skipped { script_id: String, reason: String },
}

impl ScriptOutcome {
    pub fn script_id(&self) -> &str {
        match self {
            ScriptOutcome::Generated { script_id }
            | ScriptOutcome::Failed { script_id, .. }
            | ScriptOutcome::Skipped { script_id, .. } => script_id,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, ScriptOutcome::Generated { .. })
    }
}

/// Result of compiling one script file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileReport {
    pub file: Option<String>,
    pub target_root: String,
    pub source_root: String,
    pub outcomes: Vec<ScriptOutcome>,
    pub diagnostics: DiagnosticSink,
    /// Set when a generation-engine invariant violation aborted the file
    pub aborted: Option<CompileError>,
}

impl FileReport {
    pub fn new(target_root: impl Into<String>, source_root: impl Into<String>) -> Self {
        Self {
            file: None,
            target_root: target_root.into(),
            source_root: source_root.into(),
            outcomes: Vec::new(),
            diagnostics: DiagnosticSink::new(),
            aborted: None,
        }
    }

    pub fn generated_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_generated()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScriptOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScriptOutcome::Skipped { .. }))
            .count()
    }

    /// A file succeeds when it was not aborted and at least one script was
    /// generated.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.generated_count() > 0
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} -> {}: {} generated, {} failed, {} skipped",
            self.source_root,
            self.target_root,
            self.generated_count(),
            self.failed_count(),
            self.skipped_count()
        )?;
        for outcome in &self.outcomes {
            match outcome {
                ScriptOutcome::Generated { .. } => {}
                ScriptOutcome::Failed { script_id, error } => {
                    writeln!(f, "  FAILED {}: {}", script_id, error)?;
                }
                ScriptOutcome::Skipped { script_id, reason } => {
                    writeln!(f, "  skipped {}: {}", script_id, reason)?;
                }
            }
        }
        if let Some(cause) = &self.aborted {
            writeln!(f, "  file aborted: {}", cause)?;
        }
        write!(f, "{}", self.diagnostics)
    }
}

/// Aggregated result of a multi-file compile run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: FileReport) {
        self.files.push(report);
    }

    pub fn success_count(&self) -> usize {
        self.files.iter().filter(|r| r.is_success()).count()
    }

    /// A run fails only when no file compiled successfully.
    pub fn is_success(&self) -> bool {
        self.success_count() > 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.files {
            if let Some(file) = &report.file {
                writeln!(f, "=== {} ===", file)?;
            }
            write!(f, "{}", report)?;
        }
        write!(
            f,
            "run: {}/{} files compiled",
            self.success_count(),
            self.files.len()
        )
    }
}
