/*!
# Plan Executor

Interprets compiled script units against a source document, materializing
the target object graph. Execution state per unit is a pair of cursors into
the two value trees, a value register, and a loop-frame stack; the shared
offset counter and the two Traversal Index instances live in the run-wide
context and deliberately survive from one unit to the next, so successive
anchored scripts stack into the same collection.
*/

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::codegen::{GuardAction, IndexSource, LoopVar, PlanUnit, ScriptUnit, SlotSel, Step};
use crate::path_tree::{NodeArena, NodeId};
use crate::resolver::Conversion;
use crate::scripts::{ExecOrder, LiteralValue};
use crate::typemodel::TypeIndex;

use super::traversal::{trail_of, TraversalIndex};
use super::value::{ObjectValue, PathStep, Value};

/// Host-provided converters and sub-modules for delegated-execute scripts
pub trait DelegateRegistry {
    fn convert(&self, name: &str, source: &Value, target: &mut Value) -> Result<(), String>;
    fn invoke_module(&self, name: &str, source: &Value, target: &mut Value)
        -> Result<(), String>;
}

/// Registry that rejects every delegate call
#[derive(Debug, Default)]
pub struct NoDelegates;

impl DelegateRegistry for NoDelegates {
    fn convert(&self, name: &str, _source: &Value, _target: &mut Value) -> Result<(), String> {
        Err(format!("no converter '{}' is registered", name))
    }

    fn invoke_module(
        &self,
        name: &str,
        _source: &Value,
        _target: &mut Value,
    ) -> Result<(), String> {
        Err(format!("no sub-module '{}' is registered", name))
    }
}

/// Run-wide execution state shared by every unit of one invocation
#[derive(Debug, Default)]
pub struct ExecContext {
    /// The shared offset counter; advanced, never reset, within a run
    pub offset: usize,
}

/// How one unit's evaluation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed { assignments: usize },
    /// An absence guard outside any loop fired
    Aborted { reason: String },
    /// A conversion or delegate failed at runtime
    Failed { reason: String },
}

impl UnitOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, UnitOutcome::Completed { .. })
    }
}

/// Result of applying one plan to one source document
#[derive(Debug)]
pub struct RunOutcome {
    pub target: Value,
    pub units: Vec<(String, UnitOutcome)>,
}

struct Frame {
    var: LoopVar,
    open_pc: usize,
    idx: usize,
    len: usize,
    src_depth: usize,
    tgt_depth: usize,
}

pub struct Executor<'a> {
    index: &'a TypeIndex,
    arena: &'a NodeArena,
    delegates: &'a dyn DelegateRegistry,
}

impl<'a> Executor<'a> {
    pub fn new(
        index: &'a TypeIndex,
        arena: &'a NodeArena,
        delegates: &'a dyn DelegateRegistry,
    ) -> Self {
        Self {
            index,
            arena,
            delegates,
        }
    }

    /// Applies a compiled plan to one source document.
    pub fn run(&self, plan: &PlanUnit, source: &Value) -> RunOutcome {
        let mut target = Value::object(plan.target_root.clone());
        let mut ctx = ExecContext::default();
        let mut target_tvx = TraversalIndex::new();
        let mut source_tvx = TraversalIndex::new();

        let mut units = Vec::with_capacity(plan.units.len());
        for unit in &plan.units {
            let outcome = self.run_unit(
                unit,
                source,
                &mut target,
                &mut ctx,
                &mut target_tvx,
                &mut source_tvx,
            );
            match &outcome {
                UnitOutcome::Completed { assignments } => {
                    debug!(script_id = %unit.script_id, assignments, "unit completed")
                }
                UnitOutcome::Aborted { reason } => {
                    warn!(script_id = %unit.script_id, reason, "unit aborted")
                }
                UnitOutcome::Failed { reason } => {
                    warn!(script_id = %unit.script_id, reason, "unit failed")
                }
            }
            units.push((unit.script_id.clone(), outcome));
        }
        RunOutcome { target, units }
    }

    pub fn run_unit(
        &self,
        unit: &ScriptUnit,
        source: &Value,
        target: &mut Value,
        ctx: &mut ExecContext,
        target_tvx: &mut TraversalIndex,
        source_tvx: &mut TraversalIndex,
    ) -> UnitOutcome {
        if let Some(seed) = unit.offset_seed {
            if seed > ctx.offset {
                ctx.offset = seed;
            }
        }

        let close_of = close_table(&unit.steps);
        let mut frames: Vec<Frame> = Vec::new();
        let mut src_cursor: Vec<PathStep> = Vec::new();
        let mut tgt_cursor: Vec<PathStep> = Vec::new();
        let mut reg = Value::Null;
        let mut missing = false;
        let mut assignments = 0usize;

        let mut pc = 0usize;
        while pc < unit.steps.len() {
            match &unit.steps[pc] {
                Step::Retrieve { node, slot, leaf } => {
                    let node = self.arena.get(*node);
                    let selected = select_source(source, &src_cursor, &node.field_name, slot, |i| {
                        resolve_index(&frames, ctx, i)
                    });
                    match selected {
                        None => missing = true,
                        Some((value, step)) => {
                            if value.is_null() {
                                missing = true;
                            } else if *leaf {
                                reg = value.clone();
                            } else {
                                src_cursor.push(PathStep::Field(node.field_name.clone()));
                                if let Some(step) = step {
                                    src_cursor.push(step);
                                }
                                source_tvx.note_construct(node.id, trail_of(&src_cursor));
                            }
                        }
                    }
                }

                Step::Guard { on_absent, message } => {
                    if missing {
                        missing = false;
                        match on_absent {
                            GuardAction::AbortScript => {
                                return UnitOutcome::Aborted {
                                    reason: message.clone(),
                                }
                            }
                            GuardAction::SkipIteration => {
                                let frame =
                                    frames.last().expect("skip guard fires inside a loop");
                                pc = close_of[&frame.open_pc];
                                continue;
                            }
                        }
                    }
                }

                Step::LoopOpen { var, over } => {
                    let node = self.arena.get(*over);
                    let len = source
                        .at_path(&src_cursor)
                        .and_then(Value::as_object)
                        .map(|o| match o.field(&node.field_name) {
                            Value::List(items) => items.len(),
                            Value::Map(entries) => entries.len(),
                            _ => 0,
                        })
                        .unwrap_or(0);
                    frames.push(Frame {
                        var: *var,
                        open_pc: pc,
                        idx: 0,
                        len,
                        src_depth: src_cursor.len(),
                        tgt_depth: tgt_cursor.len(),
                    });
                    if len == 0 {
                        pc = close_of[&pc];
                        continue;
                    }
                }

                Step::LoopClose {
                    advances_offset, ..
                } => {
                    let frame = frames.last_mut().expect("close matches an open loop");
                    frame.idx += 1;
                    src_cursor.truncate(frame.src_depth);
                    tgt_cursor.truncate(frame.tgt_depth);
                    missing = false;
                    if frame.idx < frame.len {
                        pc = frame.open_pc + 1;
                        continue;
                    }
                    frames.pop();
                    if *advances_offset {
                        ctx.offset += 1;
                    }
                }

                Step::ConstructElement { node, slot } => {
                    if let Err(reason) = self.construct(
                        *node,
                        slot,
                        target,
                        &mut tgt_cursor,
                        target_tvx,
                        |i| resolve_index(&frames, ctx, i),
                    ) {
                        return UnitOutcome::Failed { reason };
                    }
                }

                Step::ProbeMapKey { node, ordinal } => {
                    let node = self.arena.get(*node);
                    let ordinal = resolve_index(&frames, ctx, *ordinal);
                    let mut trail = tgt_cursor.clone();
                    trail.push(PathStep::Field(node.field_name.clone()));
                    if target_tvx.key_at(&trail_of(&trail), ordinal).is_none() {
                        missing = true;
                    }
                }

                Step::Rewind => {
                    src_cursor.clear();
                    tgt_cursor.clear();
                    missing = false;
                }

                Step::LoadLiteral { value } => {
                    reg = literal_value(value);
                }

                Step::Convert { conversion } => match self.convert(reg.clone(), *conversion) {
                    Ok(value) => reg = value,
                    Err(reason) => return UnitOutcome::Failed { reason },
                },

                Step::Assign { node, slot } => {
                    match self.assign(
                        *node,
                        slot,
                        &reg,
                        target,
                        &tgt_cursor,
                        target_tvx,
                        |i| resolve_index(&frames, ctx, i),
                    ) {
                        Ok(()) => assignments += 1,
                        Err(reason) => return UnitOutcome::Failed { reason },
                    }
                }

                Step::DelegateCall {
                    module,
                    converter,
                    order,
                } => {
                    let src = source.at_path(&src_cursor).cloned().unwrap_or(Value::Null);
                    let tgt = match target.at_path_mut(&tgt_cursor) {
                        Some(v) => v,
                        None => {
                            return UnitOutcome::Failed {
                                reason: "delegate target position does not exist".into(),
                            }
                        }
                    };
                    let mut calls: Vec<(&str, bool)> = Vec::new();
                    match order {
                        ExecOrder::ConverterFirst => {
                            if let Some(c) = converter {
                                calls.push((c, true));
                            }
                            if let Some(m) = module {
                                calls.push((m, false));
                            }
                        }
                        ExecOrder::ModuleFirst => {
                            if let Some(m) = module {
                                calls.push((m, false));
                            }
                            if let Some(c) = converter {
                                calls.push((c, true));
                            }
                        }
                    }
                    for (name, is_converter) in calls {
                        let result = if is_converter {
                            self.delegates.convert(name, &src, tgt)
                        } else {
                            self.delegates.invoke_module(name, &src, tgt)
                        };
                        if let Err(reason) = result {
                            return UnitOutcome::Failed { reason };
                        }
                        assignments += 1;
                    }
                }

                Step::AdvanceOffset => {
                    ctx.offset += 1;
                }
            }
            pc += 1;
        }

        UnitOutcome::Completed { assignments }
    }

    /// Runtime type name used when constructing an element through a node.
    fn construct_type(&self, node: NodeId) -> String {
        let node = self.arena.get(node);
        let id = node
            .concrete_type
            .or(match node.resolved_type {
                crate::typemodel::ResolvedType::Object(id) => Some(id),
                _ => None,
            });
        match id {
            Some(id) => self.index.name_of(id).to_string(),
            None => String::new(),
        }
    }

    fn construct(
        &self,
        node_id: NodeId,
        slot: &SlotSel,
        target: &mut Value,
        tgt_cursor: &mut Vec<PathStep>,
        tvx: &mut TraversalIndex,
        resolve: impl Fn(IndexSource) -> usize,
    ) -> Result<(), String> {
        let node = self.arena.get(node_id);
        let type_name = self.construct_type(node_id);
        let field = node.field_name.clone();

        let key = if let SlotSel::MapValue(ordinal) = slot {
            let mut trail = tgt_cursor.clone();
            trail.push(PathStep::Field(field.clone()));
            let ordinal = resolve(*ordinal);
            Some(
                tvx.key_at(&trail_of(&trail), ordinal)
                    .ok_or_else(|| format!("no key recorded at ordinal {}", ordinal))?
                    .clone(),
            )
        } else {
            None
        };

        let parent = target
            .at_path_mut(tgt_cursor)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| format!("cannot construct '{}': parent is not an object", field))?;

        match slot {
            SlotSel::Field => {
                if !matches!(parent.field(&field), Value::Object(_)) {
                    parent.set_field(field.clone(), Value::object(type_name));
                }
                tgt_cursor.push(PathStep::Field(field));
            }
            SlotSel::Index(idx) => {
                let i = resolve(*idx);
                let list = match parent.fields.entry(field.clone()).or_insert(Value::Null) {
                    Value::List(items) => items,
                    slot_value => {
                        *slot_value = Value::List(Vec::new());
                        match slot_value {
                            Value::List(items) => items,
                            _ => unreachable!(),
                        }
                    }
                };
                if list.len() <= i {
                    list.resize(i + 1, Value::Null);
                }
                if list[i].is_null() {
                    list[i] = Value::object(type_name);
                }
                tgt_cursor.push(PathStep::Field(field));
                tgt_cursor.push(PathStep::Elem(i));
                tvx.note_construct(node_id, trail_of(tgt_cursor));
            }
            SlotSel::MapValue(_) => {
                let key = key.expect("map value slot resolved its key");
                let canonical = key.canonical_key();
                let entries = match parent.fields.entry(field.clone()).or_insert(Value::Null) {
                    Value::Map(entries) => entries,
                    slot_value => {
                        *slot_value = Value::Map(Vec::new());
                        match slot_value {
                            Value::Map(entries) => entries,
                            _ => unreachable!(),
                        }
                    }
                };
                let entry = match entries
                    .iter_mut()
                    .find(|(k, _)| k.canonical_key() == canonical)
                {
                    Some(entry) => entry,
                    None => {
                        entries.push((key, Value::Null));
                        entries.last_mut().expect("entry was just pushed")
                    }
                };
                if entry.1.is_null() {
                    entry.1 = Value::object(type_name);
                }
                tgt_cursor.push(PathStep::Field(field));
                tgt_cursor.push(PathStep::MapVal(canonical));
                tvx.note_construct(node_id, trail_of(tgt_cursor));
            }
            SlotSel::MapKey(_) => {
                return Err("map keys are assigned, not constructed".into());
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn assign(
        &self,
        node_id: NodeId,
        slot: &SlotSel,
        reg: &Value,
        target: &mut Value,
        tgt_cursor: &[PathStep],
        tvx: &mut TraversalIndex,
        resolve: impl Fn(IndexSource) -> usize,
    ) -> Result<(), String> {
        let node = self.arena.get(node_id);
        let field = node.field_name.clone();

        let map_trail = {
            let mut trail = tgt_cursor.to_vec();
            trail.push(PathStep::Field(field.clone()));
            trail_of(&trail)
        };

        let recorded_key = if let SlotSel::MapValue(ordinal) = slot {
            let ordinal = resolve(*ordinal);
            Some(
                tvx.key_at(&map_trail, ordinal)
                    .ok_or_else(|| format!("no key recorded at ordinal {}", ordinal))?
                    .clone(),
            )
        } else {
            None
        };

        let parent = target
            .at_path_mut(tgt_cursor)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| format!("cannot assign '{}': parent is not an object", field))?;

        match slot {
            SlotSel::Field => {
                parent.set_field(field, reg.clone());
            }
            SlotSel::Index(idx) => {
                let i = resolve(*idx);
                let list = match parent.fields.entry(field).or_insert(Value::Null) {
                    Value::List(items) => items,
                    slot_value => {
                        *slot_value = Value::List(Vec::new());
                        match slot_value {
                            Value::List(items) => items,
                            _ => unreachable!(),
                        }
                    }
                };
                if list.len() <= i {
                    list.resize(i + 1, Value::Null);
                }
                list[i] = reg.clone();
            }
            SlotSel::MapKey(ordinal) => {
                let ordinal = resolve(*ordinal);
                let canonical = reg.canonical_key();
                let entries = match parent.fields.entry(field).or_insert(Value::Null) {
                    Value::Map(entries) => entries,
                    slot_value => {
                        *slot_value = Value::Map(Vec::new());
                        match slot_value {
                            Value::Map(entries) => entries,
                            _ => unreachable!(),
                        }
                    }
                };
                if entries.iter().any(|(k, _)| k.canonical_key() == canonical) {
                    debug!(key = %canonical, "map already contains key; insertion skipped");
                } else {
                    entries.push((reg.clone(), Value::Null));
                }
                tvx.record_key(map_trail, ordinal, reg.clone());
            }
            SlotSel::MapValue(_) => {
                let key = recorded_key.expect("map value slot resolved its key");
                let canonical = key.canonical_key();
                let entries = match parent.fields.entry(field).or_insert(Value::Null) {
                    Value::Map(entries) => entries,
                    slot_value => {
                        *slot_value = Value::Map(Vec::new());
                        match slot_value {
                            Value::Map(entries) => entries,
                            _ => unreachable!(),
                        }
                    }
                };
                match entries
                    .iter_mut()
                    .find(|(k, _)| k.canonical_key() == canonical)
                {
                    Some(entry) => entry.1 = reg.clone(),
                    None => entries.push((key, reg.clone())),
                }
            }
        }
        Ok(())
    }

    fn convert(&self, value: Value, conversion: Conversion) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (conversion, value) {
            (Conversion::Identity, value) => Ok(value),
            (Conversion::Widen, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (Conversion::Widen, Value::Float(x)) => Ok(Value::Float(x)),
            (Conversion::DateToString, Value::Date(d)) => {
                Ok(Value::Str(d.format("%Y-%m-%d").to_string()))
            }
            (Conversion::StringToDate, Value::Str(s)) => {
                chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|_| format!("'{}' is not a date in ISO format", s))
            }
            // enum values travel as variant strings
            (Conversion::EnumToString, Value::Str(s)) => Ok(Value::Str(s)),
            (Conversion::StringToEnum(id), Value::Str(s)) => {
                if self.index.get(id).variants.iter().any(|v| *v == s) {
                    Ok(Value::Str(s))
                } else {
                    Err(format!(
                        "'{}' names no variant of enum '{}'",
                        s,
                        self.index.name_of(id)
                    ))
                }
            }
            (conversion, value) => Err(format!("cannot apply {} to {}", conversion, value)),
        }
    }
}

/// Matches every loop open to its close by step index.
fn close_table(steps: &[Step]) -> HashMap<usize, usize> {
    let mut table = HashMap::new();
    let mut stack = Vec::new();
    for (pc, step) in steps.iter().enumerate() {
        match step {
            Step::LoopOpen { .. } => stack.push(pc),
            Step::LoopClose { .. } => {
                let open = stack.pop().expect("close matches an open loop");
                table.insert(open, pc);
            }
            _ => {}
        }
    }
    table
}

fn resolve_index(frames: &[Frame], ctx: &ExecContext, idx: IndexSource) -> usize {
    match idx {
        IndexSource::Pinned(n) => n,
        IndexSource::Offset => ctx.offset,
        IndexSource::Loop(var) => frames
            .iter()
            .rev()
            .find(|f| f.var == var)
            .map(|f| f.idx)
            .unwrap_or(0),
    }
}

/// Reads the addressed slot of a source field. Returns the value and the
/// cursor step that descends into it, or `None` when the shape disagrees.
fn select_source<'v>(
    source: &'v Value,
    cursor: &[PathStep],
    field: &str,
    slot: &SlotSel,
    resolve: impl Fn(IndexSource) -> usize,
) -> Option<(&'v Value, Option<PathStep>)> {
    let object = source.at_path(cursor)?.as_object()?;
    let value = object.field(field);
    match slot {
        SlotSel::Field => Some((value, None)),
        SlotSel::Index(idx) => {
            let i = resolve(*idx);
            let item = value.as_list()?.get(i)?;
            Some((item, Some(PathStep::Elem(i))))
        }
        SlotSel::MapKey(ordinal) => {
            let i = resolve(*ordinal);
            let (key, _) = value.as_map()?.get(i)?;
            Some((key, None))
        }
        SlotSel::MapValue(ordinal) => {
            let i = resolve(*ordinal);
            let (key, entry) = value.as_map()?.get(i)?;
            Some((entry, Some(PathStep::MapVal(key.canonical_key()))))
        }
    }
}

fn literal_value(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Null => Value::Null,
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Int(i) => Value::Int(*i),
        LiteralValue::Float(x) => Value::Float(*x),
        LiteralValue::Str(s) => Value::Str(s.clone()),
    }
}
