/*!
# Plan Rendering

Backend seam for turning a compiled plan into text. The pseudo-code backend
prints one indented block per script unit, naming the resolved accessor
methods so the emitted plan reads like the mapper it stands for.
*/

use std::fmt::Write as _;

use crate::path_tree::{NodeArena, NodeId};

use super::ir::{PlanUnit, ScriptUnit, Step};

/// Rendering backend for compiled plans
pub trait PlanBackend {
    fn render(&self, plan: &PlanUnit, arena: &NodeArena) -> String;
}

/// Human-readable pseudo-code renderer
#[derive(Debug, Default)]
pub struct PseudoBackend;

impl PseudoBackend {
    fn accessor(arena: &NodeArena, node: NodeId, setter: bool) -> String {
        let node = arena.get(node);
        let slot = if setter { &node.setter } else { &node.getter };
        match slot {
            Some(Ok(binding)) => binding.method.clone(),
            _ => node.field_name.clone(),
        }
    }

    fn render_unit(out: &mut String, unit: &ScriptUnit, arena: &NodeArena) {
        let mut indent = 1usize;
        let pad = |n: usize| "  ".repeat(n);

        writeln!(out, "{}script {}:", pad(indent), unit.script_id).unwrap();
        indent += 1;
        if let Some(seed) = unit.offset_seed {
            writeln!(out, "{}seed offset {}", pad(indent), seed).unwrap();
        }

        for step in &unit.steps {
            match step {
                Step::Retrieve { node, slot, leaf } => {
                    let verb = if *leaf { "load" } else { "descend" };
                    writeln!(
                        out,
                        "{}{} src.{}(){}",
                        pad(indent),
                        verb,
                        Self::accessor(arena, *node, false),
                        slot
                    )
                    .unwrap();
                }
                Step::Guard { on_absent, message } => {
                    writeln!(
                        out,
                        "{}if absent: {:?} ({})",
                        pad(indent),
                        on_absent,
                        message
                    )
                    .unwrap();
                }
                Step::LoopOpen { var, over } => {
                    writeln!(
                        out,
                        "{}for {} in src.{}()",
                        pad(indent),
                        var,
                        Self::accessor(arena, *over, false)
                    )
                    .unwrap();
                    indent += 1;
                }
                Step::LoopClose {
                    var,
                    advances_offset,
                } => {
                    indent -= 1;
                    let tail = if *advances_offset { ", offset += 1" } else { "" };
                    writeln!(out, "{}end {}{}", pad(indent), var, tail).unwrap();
                }
                Step::ConstructElement { node, slot } => {
                    writeln!(
                        out,
                        "{}construct tgt.{}{}",
                        pad(indent),
                        arena.get(*node).token_path,
                        slot
                    )
                    .unwrap();
                }
                Step::ProbeMapKey { node, ordinal } => {
                    writeln!(
                        out,
                        "{}probe key of tgt.{} @ {}",
                        pad(indent),
                        arena.get(*node).token_path,
                        ordinal
                    )
                    .unwrap();
                }
                Step::Rewind => {
                    writeln!(out, "{}rewind", pad(indent)).unwrap();
                }
                Step::LoadLiteral { value } => {
                    writeln!(out, "{}load {}", pad(indent), value).unwrap();
                }
                Step::Convert { conversion } => {
                    writeln!(out, "{}convert {}", pad(indent), conversion).unwrap();
                }
                Step::Assign { node, slot } => {
                    writeln!(
                        out,
                        "{}tgt.{}(reg){}",
                        pad(indent),
                        Self::accessor(arena, *node, true),
                        slot
                    )
                    .unwrap();
                }
                Step::DelegateCall {
                    module,
                    converter,
                    order,
                } => {
                    writeln!(
                        out,
                        "{}delegate module={} converter={} order={:?}",
                        pad(indent),
                        module.as_deref().unwrap_or("-"),
                        converter.as_deref().unwrap_or("-"),
                        order
                    )
                    .unwrap();
                }
                Step::AdvanceOffset => {
                    writeln!(out, "{}offset += 1", pad(indent)).unwrap();
                }
            }
        }
    }
}

impl PlanBackend for PseudoBackend {
    fn render(&self, plan: &PlanUnit, arena: &NodeArena) -> String {
        let mut out = String::new();
        writeln!(out, "plan {} -> {}:", plan.source_root, plan.target_root).unwrap();
        for unit in &plan.units {
            Self::render_unit(&mut out, unit, arena);
        }
        out
    }
}
