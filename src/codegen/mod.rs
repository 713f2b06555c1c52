/*!
# Alignment Engine and Plan Generation

Per-script pipeline from record to executable unit: tokenize, resolve
against the shared Path-Tree, classify depths, pick the emission strategy
and emit the typed instruction sequence. A failing script aborts with a
typed error and leaves zero emitted steps behind; its siblings keep
compiling.
*/

pub mod align;
pub mod emit;
pub mod ir;
pub mod render;

pub use align::{align, AlignmentState, LevelDriver, SizeClass};
pub use emit::{emit_copy, emit_delegate, emit_literal, ChainView};
pub use ir::{GuardAction, IndexSource, LoopVar, PlanUnit, ScriptUnit, SlotSel, Step};
pub use render::{PlanBackend, PseudoBackend};

use tracing::debug;

use crate::core::{CompileError, Diagnostic, DiagnosticSink};
use crate::path_tree::{NodeArena, Side};
use crate::resolver::{leaf_conversion, literal_conversion, Conversion, Resolver};
use crate::scripts::{ExecuteSpec, LiteralValue, ScriptForm, ScriptRecord};
use crate::tokenizer::{attach_overrides, TokenizedChain};
use crate::typemodel::{ResolvedType, TypeId, TypeIndex};

pub struct Generator<'a> {
    index: &'a TypeIndex,
}

impl<'a> Generator<'a> {
    pub fn new(index: &'a TypeIndex) -> Self {
        Self { index }
    }

    /// Compiles one script record into an executable unit. Returns `None`
    /// when the record legitimately produces nothing (empty value list).
    pub fn generate(
        &self,
        arena: &mut NodeArena,
        target_root: TypeId,
        source_root: TypeId,
        record: &ScriptRecord,
        sink: &mut DiagnosticSink,
    ) -> Result<Option<ScriptUnit>, CompileError> {
        let form = record.form()?;
        let target_chain = TokenizedChain::tokenize(&record.id, &record.target.path)?;
        let target_overrides =
            attach_overrides(&target_chain, &record.target.overrides, &record.id, sink)?;

        let unit = match form {
            ScriptForm::Copy(locator) => {
                let source_chain = TokenizedChain::tokenize(&record.id, &locator.path)?;
                if source_chain.anchor.is_some() {
                    return Err(CompileError::syntax(
                        &record.id,
                        "alignment anchor is only valid on target chains",
                    )
                    .at_path(&source_chain.sanitized()));
                }
                let source_overrides =
                    attach_overrides(&source_chain, &locator.overrides, &record.id, sink)?;

                let resolved_target = Resolver::new(self.index, arena).resolve_chain(
                    target_root,
                    Side::Target,
                    &target_chain,
                    &target_overrides,
                    &record.id,
                    sink,
                )?;
                let resolved_source = Resolver::new(self.index, arena).resolve_chain(
                    source_root,
                    Side::Source,
                    &source_chain,
                    &source_overrides,
                    &record.id,
                    sink,
                )?;

                // iterated object leaves on both sides pair element-wise
                // with no value transport
                let element_pair = target_chain.leaf().is_iterated()
                    && source_chain.leaf().is_iterated()
                    && matches!(resolved_target.leaf_type(), ResolvedType::Object(_))
                    && matches!(resolved_source.leaf_type(), ResolvedType::Object(_));
                let conversion = if element_pair {
                    None
                } else {
                    let conversion = leaf_conversion(
                        self.index,
                        resolved_source.leaf_type(),
                        resolved_target.leaf_type(),
                    )
                    .map_err(|msg| {
                        CompileError::semantics(&record.id, msg)
                            .at_path(&target_chain.sanitized())
                    })?;
                    Some(conversion)
                };

                let state = align(&record.id, &target_chain, source_chain.iterated_depth())?;
                debug!(
                    script_id = %record.id,
                    class = ?state.class,
                    drivers = ?state.target_drivers,
                    "alignment classified"
                );
                emit_copy(
                    arena,
                    &record.id,
                    ChainView::new(&target_chain, &resolved_target),
                    ChainView::new(&source_chain, &resolved_source),
                    &state,
                    conversion,
                )
            }

            ScriptForm::Values(values) => {
                if values.is_empty() {
                    sink.push(
                        Diagnostic::warning("literal script has no values; nothing generated")
                            .for_script(&record.id),
                    );
                    return Ok(None);
                }
                let resolved_target = Resolver::new(self.index, arena).resolve_chain(
                    target_root,
                    Side::Target,
                    &target_chain,
                    &target_overrides,
                    &record.id,
                    sink,
                )?;
                let checked = self.check_literals(record, &target_chain, values, resolved_target.leaf_type())?;

                // the value's list position substitutes for the paired
                // source index
                let depth = if target_chain.anchor.is_some() { 0 } else { 1 };
                let state = align(&record.id, &target_chain, depth)?;
                emit_literal(
                    arena,
                    &record.id,
                    ChainView::new(&target_chain, &resolved_target),
                    &checked,
                    &state,
                )
            }

            ScriptForm::Execute(spec) => {
                self.generate_delegate(
                    arena,
                    target_root,
                    source_root,
                    record,
                    &target_chain,
                    &target_overrides,
                    spec,
                    sink,
                )?
            }
        };

        Ok(Some(unit))
    }

    fn check_literals(
        &self,
        record: &ScriptRecord,
        target_chain: &TokenizedChain,
        values: &[LiteralValue],
        leaf_type: ResolvedType,
    ) -> Result<Vec<(LiteralValue, Conversion)>, CompileError> {
        values
            .iter()
            .map(|value| {
                literal_conversion(self.index, value, leaf_type)
                    .map(|conversion| (value.clone(), conversion))
                    .map_err(|msg| {
                        CompileError::config(&record.id, msg)
                            .at_path(&target_chain.sanitized())
                    })
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_delegate(
        &self,
        arena: &mut NodeArena,
        target_root: TypeId,
        source_root: TypeId,
        record: &ScriptRecord,
        target_chain: &TokenizedChain,
        target_overrides: &crate::tokenizer::AttachedOverrides,
        spec: &ExecuteSpec,
        sink: &mut DiagnosticSink,
    ) -> Result<ScriptUnit, CompileError> {
        if target_chain.anchor.is_some() {
            return Err(CompileError::config(
                &record.id,
                "alignment anchors are not valid on delegated-execute scripts",
            )
            .at_path(&target_chain.sanitized()));
        }

        let source = match &spec.source {
            None => None,
            Some(locator) => {
                let chain = TokenizedChain::tokenize(&record.id, &locator.path)?;
                if chain.anchor.is_some() {
                    return Err(CompileError::config(
                        &record.id,
                        "alignment anchors are not valid on delegated-execute scripts",
                    )
                    .at_path(&chain.sanitized()));
                }
                let overrides = attach_overrides(&chain, &locator.overrides, &record.id, sink)?;
                let resolved = Resolver::new(self.index, arena).resolve_chain(
                    source_root,
                    Side::Source,
                    &chain,
                    &overrides,
                    &record.id,
                    sink,
                )?;
                Some((chain, resolved))
            }
        };

        let source_nested = source
            .as_ref()
            .map(|(chain, _)| chain.iterated_depth() > 0)
            .unwrap_or(false);
        if target_chain.iterated_depth() > 0 && source_nested {
            return Err(CompileError::config(
                &record.id,
                "delegated-execute scripts may nest collections on at most one side",
            )
            .at_path(&target_chain.sanitized()));
        }

        let resolved_target = Resolver::new(self.index, arena).resolve_chain(
            target_root,
            Side::Target,
            target_chain,
            target_overrides,
            &record.id,
            sink,
        )?;

        // excess target levels are offset-driven; nothing pairs
        let state = align(&record.id, target_chain, 0)?;
        Ok(emit_delegate(
            arena,
            &record.id,
            ChainView::new(target_chain, &resolved_target),
            source
                .as_ref()
                .map(|(chain, resolved)| ChainView::new(chain, resolved)),
            &state,
            spec,
        ))
    }
}
