// crates/soar-connectors/src/lib.rs
// ============================================================================
// Module: Connectors
// Description: Concrete Connector implementations: a generic HTTP adapter
//              and a deterministic stub used in tests.
// Purpose: Give `soar-api` something to register into the connector registry.
// Dependencies: soar-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! This crate ships the HTTP connector used by the reference deployment and a
//! stub connector used by tests and shadow-mode demos. Neither connector
//! knows about playbooks, steps, or executions; they only implement
//! [`soar_core::connector::Connector`].

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod http;
pub mod stub;

pub use http::ActionBinding;
pub use http::HttpConnector;
pub use http::HttpConnectorConfig;
pub use stub::StubConnector;
