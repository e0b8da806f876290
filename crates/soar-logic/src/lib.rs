// crates/soar-logic/src/lib.rs
// ============================================================================
// Module: SOAR Logic
// Description: Tri-state truth values and match-mode combinators.
// Purpose: Provide deterministic tri-state evaluation shared by the trigger
//          evaluator and the condition step dispatcher.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Defines tri-state truth values (`true/false/unknown`) and the logic tables
//! used to combine them. Trigger conditions and playbook condition steps both
//! reduce to a tri-state outcome before a branch decision is made; keeping the
//! combinators here, independent of the JSON comparator layer, lets both
//! callers share the same short-circuit semantics.

#![deny(missing_docs)]

mod matchmode;
mod tristate;

pub use matchmode::MatchMode;
pub use matchmode::evaluate_conditions;
pub use tristate::BochvarLogic;
pub use tristate::GroupCounts;
pub use tristate::KleeneLogic;
pub use tristate::LogicMode;
pub use tristate::TriLogic;
pub use tristate::TriState;
