/*!
# Script Documents

Data model and loader for mapping-script files. One document per target root
type; each record copies a chain, distributes literal values, or delegates to
a named sub-module/converter.
*/

pub mod loader;
pub mod model;

pub use model::{
    AccessKind, ExecOrder, ExecuteSpec, LiteralValue, Locator, OverrideSpec, ScriptFile,
    ScriptForm, ScriptRecord,
};
