/*!
# Alignment State

Per-script, transient reconciliation of source and target nesting depth:
iterated-level extraction (pinned levels excluded), size classification,
pivot computation and per-level driver assignment. The anchor-present branch
is evaluated before the excess-depth branch.
*/

use serde::{Deserialize, Serialize};

use crate::core::CompileError;
use crate::tokenizer::{CollectionNotation, TokenizedChain};

/// Relative nesting depth of the two chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeClass {
    Equal,
    TargetLarger,
    SourceLarger,
}

/// What drives one iterated target level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelDriver {
    /// Paired 1:1 with the given source iterated level
    Paired(usize),
    /// Driven by the shared offset counter
    Offset,
}

/// Transient per-script alignment state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentState {
    pub source_depth: usize,
    pub target_depth: usize,
    pub class: SizeClass,
    /// Pivot position among iterated target levels; 0 when no anchor
    pub pivot: usize,
    pub anchored: bool,
    /// Starting slot written with the anchor (`[~N]` / `[N~]`); seeds the
    /// shared offset counter on first consumption
    pub offset_seed: Option<usize>,
    /// One driver per iterated target level, outermost first
    pub target_drivers: Vec<LevelDriver>,
}

impl AlignmentState {
    pub fn uses_offset(&self) -> bool {
        self.target_drivers.contains(&LevelDriver::Offset)
    }

    /// Source iterated levels beyond every paired target level; they loop
    /// with the target re-entering the same element.
    pub fn free_source_levels(&self) -> usize {
        self.source_depth.saturating_sub(
            self.target_drivers
                .iter()
                .filter(|d| matches!(d, LevelDriver::Paired(_)))
                .count(),
        )
    }
}

/// Classifies depths and assigns drivers for one script.
///
/// Pairing is right-aligned around the pivot: levels before the pivot pair
/// with the first source levels, the remaining source levels pair with the
/// innermost target levels, and the excess levels at/after the pivot consume
/// the shared offset counter.
pub fn align(
    script_id: &str,
    target: &TokenizedChain,
    source_depth: usize,
) -> Result<AlignmentState, CompileError> {
    let target_depth = target.iterated_depth();

    let anchored = target.anchor.is_some();
    let pivot = if anchored {
        // anchor branch first: the anchored level marks where the excess sits
        target.anchor_level().expect("anchor index is an iterated level")
    } else {
        0
    };

    if anchored && pivot > source_depth {
        return Err(CompileError::config(
            script_id,
            format!(
                "anchor sits below level {}, but the source provides only {} iterated level(s) to pair above it",
                pivot, source_depth
            ),
        )
        .at_path(&target.sanitized()));
    }

    let class = match target_depth.cmp(&source_depth) {
        std::cmp::Ordering::Equal => SizeClass::Equal,
        std::cmp::Ordering::Greater => SizeClass::TargetLarger,
        std::cmp::Ordering::Less => SizeClass::SourceLarger,
    };

    let excess = target_depth.saturating_sub(source_depth);
    let mut target_drivers = Vec::with_capacity(target_depth);
    for i in 0..target_depth {
        let driver = if i < pivot {
            LevelDriver::Paired(i)
        } else if i < pivot + excess {
            LevelDriver::Offset
        } else {
            LevelDriver::Paired(i - excess)
        };
        target_drivers.push(driver);
    }

    let offset_seed = target.anchor.and_then(|seg| {
        match target.segments[seg].collection {
            Some(CollectionNotation::Anchor { start, .. }) if start > 0 => Some(start),
            _ => None,
        }
    });

    Ok(AlignmentState {
        source_depth,
        target_depth,
        class,
        pivot,
        anchored,
        offset_seed,
        target_drivers,
    })
}
