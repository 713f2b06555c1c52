/*!
# Instruction Emission

Walks a resolved target chain level by level, opening paired source loops on
demand, and emits the guarded retrieve / construct / convert / assign step
sequence for one script. The same walk serves flat and collection-pair copy
scripts; literal and delegate scripts reuse its target descent.

Guard placement follows the absence policy: a failed retrieval inside an
open loop skips the current iteration, outside any loop it aborts the
script. Map-value slots carry an extra key probe with its own message.
*/

use crate::path_tree::{NodeArena, NodeId};
use crate::resolver::{Conversion, ResolvedChain};
use crate::scripts::{ExecuteSpec, LiteralValue};
use crate::tokenizer::{ChainSegment, CollectionNotation, MapSlot, TokenizedChain};
use crate::typemodel::ResolvedType;

use super::align::{AlignmentState, LevelDriver};
use super::ir::{GuardAction, IndexSource, LoopVar, ScriptUnit, SlotSel, Step};

/// A tokenized chain together with its resolution
#[derive(Clone, Copy)]
pub struct ChainView<'a> {
    pub chain: &'a TokenizedChain,
    pub resolved: &'a ResolvedChain,
}

impl<'a> ChainView<'a> {
    pub fn new(chain: &'a TokenizedChain, resolved: &'a ResolvedChain) -> Self {
        Self { chain, resolved }
    }

    fn len(&self) -> usize {
        self.chain.segments.len()
    }

    fn segment(&self, i: usize) -> &'a ChainSegment {
        &self.chain.segments[i]
    }

    fn node(&self, i: usize) -> NodeId {
        self.resolved.nodes[i]
    }
}

/// Slot addressing an element of an iterated or map level
fn element_slot(segment: &ChainSegment, idx: IndexSource) -> SlotSel {
    match segment.map_slot {
        Some(MapSlot::Key) => SlotSel::MapKey(idx),
        Some(MapSlot::Value) => SlotSel::MapValue(idx),
        None => SlotSel::Index(idx),
    }
}

fn pinned_index(segment: &ChainSegment) -> usize {
    match segment.collection {
        Some(CollectionNotation::Index(n)) => n,
        _ => unreachable!("pinned segment carries an index"),
    }
}

struct Emitter<'a> {
    arena: &'a NodeArena,
    unit: ScriptUnit,
    open_loops: Vec<LoopVar>,
    next_var: u16,
}

impl<'a> Emitter<'a> {
    fn new(arena: &'a NodeArena, script_id: &str, state: &AlignmentState) -> Self {
        let mut unit = ScriptUnit::new(script_id);
        unit.uses_offset = state.uses_offset();
        unit.offset_seed = state.offset_seed;
        Self {
            arena,
            unit,
            open_loops: Vec::new(),
            next_var: 0,
        }
    }

    fn push(&mut self, step: Step) {
        self.unit.steps.push(step);
    }

    fn guard_action(&self) -> GuardAction {
        if self.open_loops.is_empty() {
            GuardAction::AbortScript
        } else {
            GuardAction::SkipIteration
        }
    }

    fn guard(&mut self, message: String) {
        let on_absent = self.guard_action();
        self.push(Step::Guard { on_absent, message });
    }

    fn absent(&self, node: NodeId) -> String {
        format!("missing '{}'", self.arena.get(node).token_path)
    }

    fn open_loop(&mut self, over: NodeId) -> LoopVar {
        let var = LoopVar(self.next_var);
        self.next_var += 1;
        self.push(Step::LoopOpen { var, over });
        self.open_loops.push(var);
        var
    }

    /// Descends the source cursor one non-leaf level with its guard.
    fn descend_source(&mut self, node: NodeId, slot: SlotSel) {
        self.push(Step::Retrieve {
            node,
            slot,
            leaf: false,
        });
        self.guard(self.absent(node));
    }

    /// Constructs one target level, probing the paired key first for map
    /// value slots.
    fn construct_target(&mut self, node: NodeId, slot: SlotSel) {
        if let SlotSel::MapValue(ordinal) = slot {
            self.push(Step::ProbeMapKey { node, ordinal });
            self.guard(format!(
                "missing corresponding key for '{}'",
                self.arena.get(node).token_path
            ));
        }
        self.push(Step::ConstructElement { node, slot });
    }

    /// Probes the paired key before a map-value assignment.
    fn probe_for_assign(&mut self, node: NodeId, slot: SlotSel) {
        if let SlotSel::MapValue(ordinal) = slot {
            self.push(Step::ProbeMapKey { node, ordinal });
            self.guard(format!(
                "missing corresponding key for '{}'",
                self.arena.get(node).token_path
            ));
        }
    }

    /// Closes every open loop; the innermost close advances the offset
    /// counter when the unit consumes it. Units without loops advance it
    /// with an explicit step instead.
    fn finish(mut self, advance_at_end: bool) -> ScriptUnit {
        let uses = self.unit.uses_offset && advance_at_end;
        if self.open_loops.is_empty() {
            if uses {
                self.unit.steps.push(Step::AdvanceOffset);
            }
        } else {
            let mut innermost = true;
            while let Some(var) = self.open_loops.pop() {
                self.unit.steps.push(Step::LoopClose {
                    var,
                    advances_offset: innermost && uses,
                });
                innermost = false;
            }
        }
        self.unit
    }
}

/// Incremental left-to-right walk of the source chain. Loops open in chain
/// order; intervening single and pinned levels descend with guards.
struct SourceWalk<'a> {
    view: ChainView<'a>,
    pos: usize,
    /// Number of segments descended eagerly; the rest wait for a paired
    /// target level or the final flush
    stop: usize,
    vars: Vec<LoopVar>,
    leaf_loop_opened: bool,
}

impl<'a> SourceWalk<'a> {
    /// `full_descent` treats the last segment like any other (delegate
    /// scripts hand the delegate the element itself).
    fn new(view: ChainView<'a>, full_descent: bool) -> Self {
        let stop = if full_descent {
            view.len()
        } else {
            view.len() - 1
        };
        Self {
            view,
            pos: 0,
            stop,
            vars: Vec::new(),
            leaf_loop_opened: false,
        }
    }

    /// Processes segments until `want_loops` loops are open (or everything
    /// but the leaf is done when `None`).
    fn advance(&mut self, em: &mut Emitter<'_>, want_loops: Option<usize>) {
        while self.pos < self.stop {
            let segment = self.view.segment(self.pos);
            let node = self.view.node(self.pos);
            if segment.is_iterated() {
                if want_loops == Some(self.vars.len()) {
                    return;
                }
                let var = em.open_loop(node);
                self.vars.push(var);
                em.descend_source(node, element_slot(segment, IndexSource::Loop(var)));
            } else if segment.is_pinned() {
                em.descend_source(
                    node,
                    SlotSel::Index(IndexSource::Pinned(pinned_index(segment))),
                );
            } else {
                em.descend_source(node, SlotSel::Field);
            }
            self.pos += 1;
        }

        // an iterated leaf opens its loop here; the element load itself is
        // emitted by the leaf handling
        if self.stop < self.view.len() && !self.leaf_loop_opened {
            let leaf = self.view.segment(self.stop);
            if leaf.is_iterated() && want_loops != Some(self.vars.len()) {
                let var = em.open_loop(self.view.node(self.stop));
                self.vars.push(var);
                self.leaf_loop_opened = true;
            }
        }
    }

    /// Emits the leaf load into the value register with its guard.
    fn load_leaf(&self, em: &mut Emitter<'_>) {
        let i = self.view.len() - 1;
        let segment = self.view.segment(i);
        let node = self.view.node(i);
        let slot = if segment.is_iterated() {
            let var = *self.vars.last().expect("iterated leaf loop is open");
            element_slot(segment, IndexSource::Loop(var))
        } else if segment.is_pinned() {
            SlotSel::Index(IndexSource::Pinned(pinned_index(segment)))
        } else {
            SlotSel::Field
        };
        em.push(Step::Retrieve {
            node,
            slot,
            leaf: true,
        });
        em.guard(em.absent(node));
    }
}

/// Resolves one target level's driver to a runtime index, opening the
/// paired source loop first when needed.
fn driven_index(
    em: &mut Emitter<'_>,
    walk: &mut SourceWalk<'_>,
    driver: LevelDriver,
) -> IndexSource {
    match driver {
        LevelDriver::Paired(lv) => {
            walk.advance(em, Some(lv + 1));
            IndexSource::Loop(walk.vars[lv])
        }
        LevelDriver::Offset => IndexSource::Offset,
    }
}

/// Emits a flat or collection-pair copy script.
///
/// `conversion` is `None` when both leaves are iterated object elements;
/// the pair then reduces to per-element construction with no value
/// transport.
pub fn emit_copy(
    arena: &NodeArena,
    script_id: &str,
    target: ChainView<'_>,
    source: ChainView<'_>,
    state: &AlignmentState,
    conversion: Option<Conversion>,
) -> ScriptUnit {
    let mut em = Emitter::new(arena, script_id, state);
    let mut walk = SourceWalk::new(source, false);
    let mut level = 0usize;

    let last = target.len() - 1;
    for i in 0..last {
        let segment = target.segment(i);
        let node = target.node(i);
        if segment.is_iterated() {
            let idx = driven_index(&mut em, &mut walk, state.target_drivers[level]);
            level += 1;
            em.construct_target(node, element_slot(segment, idx));
        } else if segment.is_pinned() {
            em.construct_target(
                node,
                SlotSel::Index(IndexSource::Pinned(pinned_index(segment))),
            );
        } else {
            em.construct_target(node, SlotSel::Field);
        }
    }

    // remaining source levels loop freely with the target re-entering the
    // same element
    walk.advance(&mut em, None);

    let leaf_segment = target.segment(last);
    let leaf_node = target.node(last);
    let leaf_slot = if leaf_segment.is_iterated() {
        let idx = driven_index(&mut em, &mut walk, state.target_drivers[level]);
        element_slot(leaf_segment, idx)
    } else if leaf_segment.is_pinned() {
        SlotSel::Index(IndexSource::Pinned(pinned_index(leaf_segment)))
    } else {
        SlotSel::Field
    };

    match conversion {
        None => {
            // element pairing: guard the source element, then create or
            // reuse the target element through the Traversal Index
            walk.load_leaf(&mut em);
            em.construct_target(leaf_node, leaf_slot);
        }
        Some(conversion) => {
            walk.load_leaf(&mut em);
            if conversion != Conversion::Identity {
                em.push(Step::Convert { conversion });
            }
            em.probe_for_assign(leaf_node, leaf_slot);
            em.push(Step::Assign {
                node: leaf_node,
                slot: leaf_slot,
            });
        }
    }

    em.finish(true)
}

/// Emits a literal-values script, unrolled once per value. The value's list
/// position substitutes for the paired source index; offset-driven levels
/// advance the shared counter after every value.
pub fn emit_literal(
    arena: &NodeArena,
    script_id: &str,
    target: ChainView<'_>,
    values: &[(LiteralValue, Conversion)],
    state: &AlignmentState,
) -> ScriptUnit {
    let mut em = Emitter::new(arena, script_id, state);
    let last = target.len() - 1;

    for (ordinal, (value, conversion)) in values.iter().enumerate() {
        if ordinal > 0 {
            em.push(Step::Rewind);
        }
        let mut level = 0usize;
        let driven = |driver: LevelDriver| match driver {
            LevelDriver::Paired(_) => IndexSource::Pinned(ordinal),
            LevelDriver::Offset => IndexSource::Offset,
        };

        for i in 0..last {
            let segment = target.segment(i);
            let node = target.node(i);
            if segment.is_iterated() {
                let idx = driven(state.target_drivers[level]);
                level += 1;
                em.construct_target(node, element_slot(segment, idx));
            } else if segment.is_pinned() {
                em.construct_target(
                    node,
                    SlotSel::Index(IndexSource::Pinned(pinned_index(segment))),
                );
            } else {
                em.construct_target(node, SlotSel::Field);
            }
        }

        let leaf_segment = target.segment(last);
        let leaf_node = target.node(last);
        let leaf_slot = if leaf_segment.is_iterated() {
            element_slot(leaf_segment, driven(state.target_drivers[level]))
        } else if leaf_segment.is_pinned() {
            SlotSel::Index(IndexSource::Pinned(pinned_index(leaf_segment)))
        } else {
            SlotSel::Field
        };

        em.push(Step::LoadLiteral {
            value: value.clone(),
        });
        if *conversion != Conversion::Identity {
            em.push(Step::Convert {
                conversion: *conversion,
            });
        }
        em.probe_for_assign(leaf_node, leaf_slot);
        em.push(Step::Assign {
            node: leaf_node,
            slot: leaf_slot,
        });
        if em.unit.uses_offset {
            em.push(Step::AdvanceOffset);
        }
    }

    em.finish(false)
}

/// Emits a delegated-execute script: full descent on both sides, then one
/// delegate call per innermost repetition. At most one side is nested,
/// checked before emission.
pub fn emit_delegate(
    arena: &NodeArena,
    script_id: &str,
    target: ChainView<'_>,
    source: Option<ChainView<'_>>,
    state: &AlignmentState,
    spec: &ExecuteSpec,
) -> ScriptUnit {
    let mut em = Emitter::new(arena, script_id, state);
    let mut level = 0usize;

    // the delegate writes into the final element, so every object-typed
    // target segment is constructed; a scalar leaf leaves the delegate at
    // its parent
    for i in 0..target.len() {
        let segment = target.segment(i);
        let node = target.node(i);
        if i + 1 == target.len()
            && !matches!(target.resolved.types[i], ResolvedType::Object(_))
        {
            continue;
        }
        if segment.is_iterated() {
            let idx = match state.target_drivers[level] {
                // both-nested is rejected earlier, so nothing pairs here
                LevelDriver::Paired(_) => unreachable!("delegate target levels are offset-driven"),
                LevelDriver::Offset => IndexSource::Offset,
            };
            level += 1;
            em.construct_target(node, element_slot(segment, idx));
        } else if segment.is_pinned() {
            em.construct_target(
                node,
                SlotSel::Index(IndexSource::Pinned(pinned_index(segment))),
            );
        } else {
            em.construct_target(node, SlotSel::Field);
        }
    }

    if let Some(source) = source {
        let mut walk = SourceWalk::new(source, true);
        walk.advance(&mut em, None);
    }

    em.push(Step::DelegateCall {
        module: spec.module.clone(),
        converter: spec.converter.clone(),
        order: spec.effective_order(),
    });

    em.finish(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::align::align;
    use crate::core::DiagnosticSink;
    use crate::path_tree::Side;
    use crate::resolver::Resolver;
    use crate::tokenizer::attach_overrides;
    use crate::typemodel::TypeIndex;
    use pretty_assertions::assert_eq;

    const MODEL: &str = r#"
types:
  - name: Source
    fields:
      - { name: fullName, type: String }
      - { name: cells, type: Cell, cardinality: list }
      - { name: codes, type: String, cardinality: list }
  - name: Cell
    fields:
      - { name: value, type: String }
  - name: Target
    fields:
      - { name: name, type: String }
      - { name: rows, type: Row, cardinality: list }
      - { name: tags, type: String, cardinality: list }
      - { name: labels, type: String, cardinality: map }
  - name: Row
    fields:
      - { name: cells, type: CellView, cardinality: list }
      - { name: name, type: String }
  - name: CellView
    fields:
      - { name: value, type: String }
"#;

    struct Fixture {
        index: TypeIndex,
        arena: NodeArena,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                index: TypeIndex::from_yaml(MODEL).unwrap(),
                arena: NodeArena::new(),
            }
        }

        fn resolve(
            &mut self,
            root: &str,
            side: Side,
            raw: &str,
        ) -> (TokenizedChain, ResolvedChain) {
            let chain = TokenizedChain::tokenize("s", raw).unwrap();
            let mut sink = DiagnosticSink::new();
            let overrides = attach_overrides(&chain, &[], "s", &mut sink).unwrap();
            let root_id = self.index.lookup(root).unwrap();
            let resolved = Resolver::new(&self.index, &mut self.arena)
                .resolve_chain(root_id, side, &chain, &overrides, "s", &mut sink)
                .unwrap();
            (chain, resolved)
        }
    }

    fn guard_actions(unit: &ScriptUnit) -> Vec<GuardAction> {
        unit.steps
            .iter()
            .filter_map(|s| match s {
                Step::Guard { on_absent, .. } => Some(*on_absent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn flat_copy_is_one_retrieval_and_one_assignment() {
        let mut fx = Fixture::new();
        let (tc, tr) = fx.resolve("Target", Side::Target, "name");
        let (sc, sr) = fx.resolve("Source", Side::Source, "fullName");
        let state = align("s", &tc, sc.iterated_depth()).unwrap();
        let unit = emit_copy(
            &fx.arena,
            "s",
            ChainView::new(&tc, &tr),
            ChainView::new(&sc, &sr),
            &state,
            Some(Conversion::Identity),
        );

        assert_eq!(unit.loop_count(), 0);
        assert!(!unit.uses_offset);
        assert!(matches!(
            unit.steps[..],
            [
                Step::Retrieve { leaf: true, .. },
                Step::Guard { .. },
                Step::Assign { .. }
            ]
        ));
        assert_eq!(guard_actions(&unit), vec![GuardAction::AbortScript]);
    }

    #[test]
    fn equal_depth_pair_loops_without_offset() {
        let mut fx = Fixture::new();
        let (tc, tr) = fx.resolve("Target", Side::Target, "tags[]");
        let (sc, sr) = fx.resolve("Source", Side::Source, "codes[]");
        let state = align("s", &tc, sc.iterated_depth()).unwrap();
        let unit = emit_copy(
            &fx.arena,
            "s",
            ChainView::new(&tc, &tr),
            ChainView::new(&sc, &sr),
            &state,
            Some(Conversion::Identity),
        );

        assert_eq!(unit.loop_count(), 1);
        assert!(!unit.uses_offset);
        // absence inside the loop skips the iteration
        assert_eq!(guard_actions(&unit), vec![GuardAction::SkipIteration]);
        assert!(unit
            .steps
            .iter()
            .all(|s| !matches!(s, Step::AdvanceOffset)));
    }

    #[test]
    fn anchored_deeper_target_consumes_the_offset() {
        let mut fx = Fixture::new();
        let (tc, tr) = fx.resolve("Target", Side::Target, "rows[~].cells[].value");
        let (sc, sr) = fx.resolve("Source", Side::Source, "cells[].value");
        let state = align("s", &tc, sc.iterated_depth()).unwrap();
        let unit = emit_copy(
            &fx.arena,
            "s",
            ChainView::new(&tc, &tr),
            ChainView::new(&sc, &sr),
            &state,
            Some(Conversion::Identity),
        );

        assert!(unit.uses_offset);
        assert_eq!(unit.loop_count(), 1);
        // the excess row level is offset-driven, before any loop opens
        assert!(matches!(
            unit.steps[0],
            Step::ConstructElement {
                slot: SlotSel::Index(IndexSource::Offset),
                ..
            }
        ));
        // the innermost close advances the counter once per pass
        assert!(matches!(
            unit.steps.last(),
            Some(Step::LoopClose {
                advances_offset: true,
                ..
            })
        ));
    }

    #[test]
    fn map_value_assignment_probes_the_paired_key() {
        let mut fx = Fixture::new();
        let (tc, tr) = fx.resolve("Target", Side::Target, "labels<V>");
        let (sc, sr) = fx.resolve("Source", Side::Source, "codes[]");
        let state = align("s", &tc, sc.iterated_depth()).unwrap();
        let unit = emit_copy(
            &fx.arena,
            "s",
            ChainView::new(&tc, &tr),
            ChainView::new(&sc, &sr),
            &state,
            Some(Conversion::Identity),
        );

        let probe_pos = unit
            .steps
            .iter()
            .position(|s| matches!(s, Step::ProbeMapKey { .. }))
            .expect("map value assignment probes its key");
        match &unit.steps[probe_pos + 1] {
            Step::Guard { message, .. } => assert!(message.contains("corresponding key")),
            other => panic!("expected guard after probe, found {:?}", other),
        }
        assert!(matches!(
            unit.steps[probe_pos + 2],
            Step::Assign {
                slot: SlotSel::MapValue(_),
                ..
            }
        ));
    }

    #[test]
    fn object_element_pair_constructs_without_assigning() {
        let mut fx = Fixture::new();
        let (tc, tr) = fx.resolve("Target", Side::Target, "rows[]");
        let (sc, sr) = fx.resolve("Source", Side::Source, "cells[]");
        let state = align("s", &tc, sc.iterated_depth()).unwrap();
        let unit = emit_copy(
            &fx.arena,
            "s",
            ChainView::new(&tc, &tr),
            ChainView::new(&sc, &sr),
            &state,
            None,
        );

        assert_eq!(unit.loop_count(), 1);
        assert_eq!(unit.construct_count(), 1);
        assert!(unit.steps.iter().all(|s| !matches!(s, Step::Assign { .. })));
    }

    #[test]
    fn literal_unrolls_one_block_per_value() {
        let mut fx = Fixture::new();
        let (tc, tr) = fx.resolve("Target", Side::Target, "rows[~].name");
        let state = align("s", &tc, 0).unwrap();
        let values: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|s| (LiteralValue::Str(s.into()), Conversion::Identity))
            .collect();
        let unit = emit_literal(&fx.arena, "s", ChainView::new(&tc, &tr), &values, &state);

        assert_eq!(unit.loop_count(), 0);
        assert_eq!(unit.construct_count(), 3);
        let advances = unit
            .steps
            .iter()
            .filter(|s| matches!(s, Step::AdvanceOffset))
            .count();
        assert_eq!(advances, 3);
    }

    #[test]
    fn delegate_call_sits_inside_the_source_loop() {
        let mut fx = Fixture::new();
        let (tc, tr) = fx.resolve("Target", Side::Target, "name");
        let (sc, sr) = fx.resolve("Source", Side::Source, "cells[]");
        let state = align("s", &tc, 0).unwrap();
        let spec = ExecuteSpec {
            module: Some("cellMapper".into()),
            converter: None,
            source: None,
            order: None,
        };
        let unit = emit_delegate(
            &fx.arena,
            "s",
            ChainView::new(&tc, &tr),
            Some(ChainView::new(&sc, &sr)),
            &state,
            &spec,
        );

        let open = unit
            .steps
            .iter()
            .position(|s| matches!(s, Step::LoopOpen { .. }))
            .unwrap();
        let call = unit
            .steps
            .iter()
            .position(|s| matches!(s, Step::DelegateCall { .. }))
            .unwrap();
        let close = unit
            .steps
            .iter()
            .position(|s| matches!(s, Step::LoopClose { .. }))
            .unwrap();
        assert!(open < call && call < close);
    }
}
