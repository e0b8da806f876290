// crates/soar-core/src/lib.rs
// ============================================================================
// Crate: soar-core
// Description: The synchronous playbook execution engine.
// Purpose: Own the entity model, validation, trigger evaluation, template
//          resolution, SLA tracking, and the step-interpreter engine loop
//          that `soar-api` and `soar-cli` drive.
// Dependencies: soar-logic, serde, serde_json, serde_jcs, sha2, thiserror,
//               bigdecimal, time, tracing
// ============================================================================

//! # soar-core
//!
//! This crate is synchronous end to end: every public entry point is a plain
//! blocking function returning `Result<T, EngineError>`. The HTTP boundary in
//! `soar-api` is the only async layer in the workspace; it calls into this
//! crate through `tokio::task::spawn_blocking`. This mirrors how evidence
//! providers and the control plane are written upstream: the network layer
//! is async, the decision logic underneath it is not.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod clock;
pub mod connector;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod identifiers;
pub mod model;
pub mod sla;
pub mod store;
pub mod template;
pub mod trigger;
pub mod validator;

pub use clock::Clock;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use engine::Engine;
pub use error::EngineError;
pub use error::EngineErrorCode;
pub use error::IngressErrorCode;
