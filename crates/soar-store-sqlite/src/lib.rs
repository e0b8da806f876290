// crates/soar-store-sqlite/src/lib.rs
// ============================================================================
// Crate: soar-store-sqlite
// Description: Durable SQLite-backed implementation of every soar-core store trait.
// Purpose: Give `soar-api` and `soar-cli` a single-file, WAL-mode entity store.
// Dependencies: soar-core, rusqlite, serde_json, thiserror, time
// ============================================================================

//! # soar-store-sqlite
//!
//! One [`SqliteStore`] wraps a single `SQLite` connection behind a mutex and
//! implements every `soar-core` store trait by serializing each entity to
//! canonical JSON in its own table. A single connection, rather than a pool,
//! is deliberate: `SQLite`'s own writer serialization makes a pool mostly
//! useful for read concurrency, which this workspace does not need at the
//! scale a single playbook engine runs at (§6).

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod store;

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
