/*!
# Plan Instruction IR

Typed instruction set the alignment engine emits instead of templated text:
guarded retrievals, loop open/close pairs, element construction, leaf
conversion and assignment, delegate calls. A plan unit is rendered by a
[`PlanBackend`](super::render::PlanBackend) or interpreted directly by the
runtime executor.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::path_tree::NodeId;
use crate::resolver::Conversion;
use crate::scripts::{ExecOrder, LiteralValue};

/// Loop variable handle, allocated per script unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopVar(pub u16);

impl fmt::Display for LoopVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Where a level's runtime index comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexSource {
    /// Fixed index written in the chain (`[2]`)
    Pinned(usize),
    /// Paired loop variable
    Loop(LoopVar),
    /// The shared offset counter
    Offset,
}

impl fmt::Display for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSource::Pinned(n) => write!(f, "{}", n),
            IndexSource::Loop(var) => write!(f, "{}", var),
            IndexSource::Offset => write!(f, "offset"),
        }
    }
}

/// How a retrieval, construction or assignment addresses its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotSel {
    /// Plain single-cardinality field
    Field,
    /// Collection element at an index; a construction miss appends
    Index(IndexSource),
    /// Map key slot at an ordinal
    MapKey(IndexSource),
    /// Map value slot at an ordinal, paired with the key recorded under the
    /// same ordinal
    MapValue(IndexSource),
}

impl fmt::Display for SlotSel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotSel::Field => Ok(()),
            SlotSel::Index(idx) => write!(f, "[{}]", idx),
            SlotSel::MapKey(idx) => write!(f, "<K@{}>", idx),
            SlotSel::MapValue(idx) => write!(f, "<V@{}>", idx),
        }
    }
}

/// What a failed guard does with the current script evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardAction {
    /// Log and skip the current iteration of the innermost open loop
    SkipIteration,
    /// Log and abort the whole script
    AbortScript,
}

/// One emitted instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// Source-side retrieval. `leaf` loads the value register instead of
    /// descending the cursor. Always followed by a `Guard`.
    Retrieve {
        node: NodeId,
        slot: SlotSel,
        leaf: bool,
    },
    /// Checks the preceding retrieval's outcome
    Guard {
        on_absent: GuardAction,
        message: String,
    },
    /// Opens a loop over the collection/map field `over` of the current
    /// source cursor object
    LoopOpen { var: LoopVar, over: NodeId },
    /// Closes the matching loop; the innermost close of an offset-consuming
    /// unit advances the shared counter once per completed pass
    LoopClose { var: LoopVar, advances_offset: bool },
    /// Target-side retrieval-or-creation, probing the Traversal Index first
    ConstructElement { node: NodeId, slot: SlotSel },
    /// Probes the target Traversal Index for the map key recorded under the
    /// ordinal before a map-value construction or assignment. Always followed
    /// by a `Guard`.
    ProbeMapKey { node: NodeId, ordinal: IndexSource },
    /// Resets both cursors to their roots (between unrolled literal values)
    Rewind,
    /// Loads a literal into the value register
    LoadLiteral { value: LiteralValue },
    /// Converts the value register in place
    Convert { conversion: Conversion },
    /// Stores the value register through the node's setter/slot on the
    /// current target cursor
    Assign { node: NodeId, slot: SlotSel },
    /// Invokes the named converter and/or sub-module for the current
    /// (source, target) cursor pair
    DelegateCall {
        module: Option<String>,
        converter: Option<String>,
        order: ExecOrder,
    },
    /// Advances the shared offset counter (units without loops)
    AdvanceOffset,
}

/// Executable unit generated for one script id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptUnit {
    pub script_id: String,
    pub steps: Vec<Step>,
    /// Whether any step reads the shared offset counter
    pub uses_offset: bool,
    /// Anchor starting slot; raises the shared counter before the first read
    pub offset_seed: Option<usize>,
}

impl ScriptUnit {
    pub fn new(script_id: impl Into<String>) -> Self {
        Self {
            script_id: script_id.into(),
            steps: Vec::new(),
            uses_offset: false,
            offset_seed: None,
        }
    }

    pub fn loop_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::LoopOpen { .. }))
            .count()
    }

    pub fn construct_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::ConstructElement { .. }))
            .count()
    }
}

/// One compiled script file: a plan binding a source and target root type,
/// internally invoking one generated unit per script id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanUnit {
    pub source_root: String,
    pub target_root: String,
    pub units: Vec<ScriptUnit>,
}

impl PlanUnit {
    pub fn new(source_root: impl Into<String>, target_root: impl Into<String>) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
            units: Vec::new(),
        }
    }

    pub fn unit(&self, script_id: &str) -> Option<&ScriptUnit> {
        self.units.iter().find(|u| u.script_id == script_id)
    }
}
