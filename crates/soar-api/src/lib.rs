// crates/soar-api/src/lib.rs
// ============================================================================
// Crate: soar-api
// Description: The async HTTP boundary over the synchronous soar-core engine.
// Purpose: Expose webhook ingress and the playbook/execution/approval/
//          connector/webhook REST surface (§6), bridging to the blocking
//          engine via `spawn_blocking` and a per-execution lock (§5).
// Dependencies: axum, tokio, soar-core, soar-config, soar-connectors,
//               soar-store-sqlite, hmac, sha2, subtle, tracing
// ============================================================================

//! # soar-api
//!
//! This is the only async crate in the workspace. Every route handler either
//! answers directly from a store (a cheap, synchronous call wrapped in
//! `spawn_blocking` is unnecessary overhead, so those go through the trait
//! object directly) or bridges into [`soar_core::Engine`] through
//! `tokio::task::spawn_blocking`, serialized per `execution_id` by
//! [`state::AppState::execution_lock`].

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod connector_registry;
pub mod ingress;
pub mod nonce_cache;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod sla_monitor;
pub mod state;

pub use server::build_router;
pub use server::build_state;
pub use server::serve;
pub use state::AppState;
