/*!
# Error System for the Mapscript Compiler

Typed error taxonomy plus a diagnostic collector used by the per-file
compilation reports. Every failure carries the originating script id and,
where applicable, the offending token path.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Compilation error taxonomy.
///
/// `Syntax`, `Semantics` and `Config` errors are fatal for the owning script
/// only; `Generation` errors are internal invariant violations and abort the
/// whole file.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum CompileError {
    #[error("syntax error [{script_id}]: {message}")]
    Syntax {
        script_id: String,
        token_path: Option<String>,
        message: String,
    },

    #[error("semantics error [{script_id}]: {message}")]
    Semantics {
        script_id: String,
        token_path: Option<String>,
        message: String,
    },

    #[error("configuration error [{script_id}]: {message}")]
    Config {
        script_id: String,
        token_path: Option<String>,
        message: String,
    },

    #[error("generation error [{script_id}]: {message}")]
    Generation { script_id: String, message: String },
}

impl CompileError {
    pub fn syntax(script_id: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::Syntax {
            script_id: script_id.into(),
            token_path: None,
            message: message.into(),
        }
    }

    pub fn semantics(script_id: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::Semantics {
            script_id: script_id.into(),
            token_path: None,
            message: message.into(),
        }
    }

    pub fn config(script_id: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::Config {
            script_id: script_id.into(),
            token_path: None,
            message: message.into(),
        }
    }

    pub fn generation(script_id: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::Generation {
            script_id: script_id.into(),
            message: message.into(),
        }
    }

    /// Attaches the offending token path; the path also becomes part of the
    /// rendered message.
    pub fn at_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        match &mut self {
            CompileError::Syntax {
                token_path,
                message,
                ..
            }
            | CompileError::Semantics {
                token_path,
                message,
                ..
            }
            | CompileError::Config {
                token_path,
                message,
                ..
            } => {
                *message = format!("{} (at '{}')", message, path);
                *token_path = Some(path);
            }
            CompileError::Generation { .. } => {}
        }
        self
    }

    pub fn script_id(&self) -> &str {
        match self {
            CompileError::Syntax { script_id, .. }
            | CompileError::Semantics { script_id, .. }
            | CompileError::Config { script_id, .. }
            | CompileError::Generation { script_id, .. } => script_id,
        }
    }

    pub fn token_path(&self) -> Option<&str> {
        match self {
            CompileError::Syntax { token_path, .. }
            | CompileError::Semantics { token_path, .. }
            | CompileError::Config { token_path, .. } => token_path.as_deref(),
            CompileError::Generation { .. } => None,
        }
    }

    /// Generation errors abort the whole file; everything else is contained
    /// to the owning script.
    pub fn aborts_file(&self) -> bool {
        matches!(self, CompileError::Generation { .. })
    }
}

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorLevel {
    Error,
    Warning,
    Info,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLevel::Error => write!(f, "ERROR"),
            ErrorLevel::Warning => write!(f, "WARNING"),
            ErrorLevel::Info => write!(f, "INFO"),
        }
    }
}

/// One collected diagnostic with script context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: ErrorLevel,
    pub script_id: Option<String>,
    pub token_path: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: ErrorLevel::Warning,
            script_id: None,
            token_path: None,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ErrorLevel::Info,
            script_id: None,
            token_path: None,
            message: message.into(),
        }
    }

    pub fn for_script(mut self, script_id: impl Into<String>) -> Self {
        self.script_id = Some(script_id.into());
        self
    }

    pub fn at_path(mut self, path: impl Into<String>) -> Self {
        self.token_path = Some(path.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.level)?;
        if let Some(id) = &self.script_id {
            write!(f, " [{}]", id)?;
        }
        write!(f, " {}", self.message)?;
        if let Some(path) = &self.token_path {
            write!(f, " (at '{}')", path)?;
        }
        Ok(())
    }
}

/// Diagnostic collection shared across one file's compilation
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DiagnosticSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::warning(message));
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == ErrorLevel::Warning)
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == ErrorLevel::Warning)
            .count()
    }

    pub fn merge(&mut self, other: DiagnosticSink) {
        self.diagnostics.extend(other.diagnostics);
    }
}

impl fmt::Display for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_carries_script_id_and_path() {
        let err = CompileError::syntax("s1", "second alignment anchor").at_path("rows.cells");
        assert_eq!(err.script_id(), "s1");
        assert_eq!(err.token_path(), Some("rows.cells"));
        assert!(err.to_string().contains("rows.cells"));
        assert!(!err.aborts_file());
    }

    #[test]
    fn generation_errors_abort_file() {
        let err = CompileError::generation("s2", "loop stack underflow");
        assert!(err.aborts_file());
    }

    #[test]
    fn sink_counts_warnings() {
        let mut sink = DiagnosticSink::new();
        sink.warn("empty value list");
        sink.push(Diagnostic::info("skipped disabled script").for_script("s3"));
        assert!(sink.has_warnings());
        assert_eq!(sink.warning_count(), 1);
    }
}
