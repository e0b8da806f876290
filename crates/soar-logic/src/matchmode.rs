// crates/soar-logic/src/matchmode.rs
// ============================================================================
// Module: Trigger Match Mode
// Description: ALL/ANY short-circuit combinators over ordered tri-state results.
// Purpose: Decide whether an ordered condition list matches an alert.
// Dependencies: crate::tristate
// ============================================================================

//! ## Overview
//! A trigger's condition list is evaluated in declared order under one of two
//! match modes. `ALL` short-circuits on the first `false`; `ANY` short-circuits
//! on the first `true`. `Unknown` never ends the scan early — it only changes
//! the final verdict when the list is exhausted without an early exit.

use serde::Deserialize;
use serde::Serialize;

use crate::tristate::TriState;

/// Trigger condition-list match mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchMode {
    /// Every condition must hold.
    All,
    /// At least one condition must hold.
    Any,
}

/// Evaluates an ordered list of condition outcomes against a match mode.
///
/// Conditions are supplied lazily via `conditions`, a closure invoked with the
/// index of the next condition to evaluate; evaluation stops as soon as the
/// match mode's short-circuit rule is satisfied, so conditions after the
/// deciding one are never evaluated. Returns `true` when the trigger matches.
#[must_use]
pub fn evaluate_conditions<F>(mode: MatchMode, count: usize, mut conditions: F) -> bool
where
    F: FnMut(usize) -> TriState,
{
    match mode {
        MatchMode::All => {
            for index in 0..count {
                if conditions(index).is_false() {
                    return false;
                }
            }
            true
        }
        MatchMode::Any => {
            for index in 0..count {
                if conditions(index).is_true() {
                    return true;
                }
            }
            false
        }
    }
}
