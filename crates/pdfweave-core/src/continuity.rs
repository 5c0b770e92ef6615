//! Continuity propagation between sequential conversion units.
//!
//! Unit N+1 is told how unit N ended (its last paragraph, verbatim), what the
//! document has been about so far (a rolling summary), and which
//! cross-references are still dangling. That is the whole state; it is
//! replaced, not accumulated, on every fold so its size stays bounded by one
//! unit's output.
//!
//! The state machine is linear: "awaiting unit N" → fold(result N) →
//! "awaiting unit N+1". There is no rollback. A failed unit folds
//! [`ConversionResult::degraded`], which clears the tail and summary but
//! leaves pending references alone.

use crate::model::{ConversionResult, PendingReference};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// State threaded through the units of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityState {
    /// Last paragraph of the previous unit.
    pub previous_tail: String,
    /// Rolling summary reported by the previous unit.
    pub previous_summary: String,
    pub pending_references: BTreeSet<PendingReference>,
    /// Number of results folded so far; the next unit to process has this index.
    pub units_folded: usize,
}

impl ContinuityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the unit whose result is expected next.
    pub fn awaiting_unit(&self) -> usize {
        self.units_folded
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending_references.iter().any(|r| r.id == id)
    }
}

/// Fold one unit's result into the state, producing the state for the next unit.
///
/// Newly reported unresolved references are added before resolved ids are
/// removed, so a unit that both mentions and resolves a reference leaves it
/// resolved.
pub fn fold_continuity(state: ContinuityState, result: &ConversionResult) -> ContinuityState {
    let ContinuityState {
        mut pending_references,
        units_folded,
        ..
    } = state;

    pending_references.extend(result.unresolved_references.iter().cloned());
    pending_references.retain(|r| !result.resolved_references.contains(&r.id));

    ContinuityState {
        previous_tail: result.last_paragraph.clone(),
        previous_summary: result.summary.clone(),
        pending_references,
        units_folded: units_folded + 1,
    }
}
