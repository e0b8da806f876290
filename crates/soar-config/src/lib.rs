// crates/soar-config/src/lib.rs
// ============================================================================
// Module: SOAR Config Library
// Description: Canonical startup configuration model, loading, and validation.
// Purpose: Single source of truth for `soar.toml` / environment semantics.
// Dependencies: soar-core, serde, toml, thiserror
// ============================================================================

//! ## Overview
//! `soar-config` defines the canonical startup configuration for the engine,
//! ingress, and SLA subsystems. Configuration loads in three layers: compiled
//! defaults, an optional TOML file, then environment variables, each
//! overriding the last. Security posture: config inputs are operator-
//! controlled, not attacker-controlled, but still fail closed on malformed
//! values rather than silently falling back to a default.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod examples;

pub use config::EngineConfig;
pub use config::IngressConfig;
pub use config::RateLimitConfig;
pub use config::SlaThresholds;
pub use config::SoarConfig;
pub use config::SoarConfigError;
pub use examples::config_toml_example;
