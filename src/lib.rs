/*!
# Mapscript Compiler

Compiler and runtime for declarative object-mapping scripts: short path
chains describe where values live on a source object graph and where they
land on a target graph, and the compiler turns a file of such scripts into
an executable mapping plan.

## Core Features

- **Path chain tokenizer** with collection (`[]`, `[2]`), alignment-anchor
  (`[~]`, `[~3]`, `[2~]`) and map slot (`<K>`, `<V>`) notation
- **Shared Path-Tree** - one resolved node per token path, reused across all
  scripts of a file with cached accessor bindings
- **Semantics resolver** - declared fields, notation/cardinality agreement,
  accessor strategy list with helper-type support
- **Alignment engine** - reconciles unequal source/target nesting through
  index pairing and the shared offset counter
- **Typed instruction plans** - guarded retrievals, loop pairs, element
  construction, leaf conversion, delegate calls
- **Runtime executor** - applies compiled plans to documents, with the
  Traversal Index keeping element construction at-most-once
- **CLI interface** - batch compilation, plan rendering and document
  application for CI integration

## Architecture

```text
Mapscript Compiler
├── tokenizer    - Chain lexer, notation parsing, overrides
├── typemodel    - Type descriptors, unified index
├── scripts      - Script documents and record validation
├── path_tree    - Shared resolved node arena
├── resolver     - Semantics, accessor strategies, conversions
├── codegen      - Alignment, instruction emission, rendering
├── runtime      - Value model, Traversal Index, executor
├── driver       - Per-file/per-directory compilation
└── core         - Error taxonomy, diagnostics, reports
```

## Usage

```no_run
use mapscript::{compile_scripts, ScriptFile, TypeIndex};

let index = TypeIndex::load_from_file("types.yaml").unwrap();
let file = ScriptFile::load_from_file("orders.map.yaml").unwrap();
let compiled = compile_scripts(&index, &file);
println!("{}", compiled.report);
```
*/

pub mod codegen;
pub mod core;
pub mod driver;
pub mod path_tree;
pub mod resolver;
pub mod runtime;
pub mod scripts;
pub mod tokenizer;
pub mod typemodel;

// Re-export main types for convenience
pub use codegen::{Generator, PlanBackend, PlanUnit, PseudoBackend, ScriptUnit};
pub use core::{CompileError, Diagnostic, DiagnosticSink, FileReport, RunReport, ScriptOutcome};
pub use driver::{
    compile_directory, compile_file, compile_scripts, load_type_index, CompilationDriver,
    CompiledFile, InProcessDriver,
};
pub use path_tree::{NodeArena, NodeId, NodeRole, PathNode, Side};
pub use resolver::{Conversion, ResolvedChain, Resolver};
pub use runtime::{DelegateRegistry, Executor, NoDelegates, RunOutcome, UnitOutcome, Value};
pub use scripts::{ScriptFile, ScriptRecord};
pub use tokenizer::TokenizedChain;
pub use typemodel::{TypeIndex, TypeModelDoc};

use anyhow::Result;
use std::path::Path;

/// Compiles every script file under a directory and returns the rendered
/// run report.
pub fn compile_directory_report<P: AsRef<Path>>(index: &TypeIndex, dir: P) -> Result<String> {
    let (run, _) = compile_directory(index, dir)?;
    Ok(run.to_string())
}

/// Compiles one script file and applies its plan to a JSON document.
pub fn apply_to_document<P: AsRef<Path>>(
    index: &TypeIndex,
    script_path: P,
    document: serde_json::Value,
) -> Result<RunOutcome> {
    let compiled = compile_file(index, script_path)?;
    if let Some(cause) = &compiled.report.aborted {
        anyhow::bail!("compilation aborted: {}", cause);
    }
    let source = Value::from(document);
    let executor = Executor::new(index, &compiled.arena, &NoDelegates);
    Ok(executor.run(&compiled.plan, &source))
}
