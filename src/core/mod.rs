/*!
# Core Module

Shared error taxonomy, diagnostic collection and compilation reports.
*/

pub mod errors;
pub mod report;

pub use errors::{CompileError, Diagnostic, DiagnosticSink, ErrorLevel};
pub use report::{FileReport, RunReport, ScriptOutcome};
