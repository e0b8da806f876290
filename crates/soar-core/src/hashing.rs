// crates/soar-core/src/hashing.rs
// ============================================================================
// Module: Canonical Hashing
// Description: RFC 8785 JSON canonicalization and content hashing utilities.
// Purpose: Provide deterministic hashes for webhook nonces and audit payloads.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! The ingress nonce cache and the audit log both need a stable digest of a
//! JSON payload. Canonicalizing via RFC 8785 (JCS) before hashing guarantees
//! the same logical payload always produces the same digest regardless of key
//! order, which matters for nonce replay suppression (§4.1).

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

/// Deterministic content hash representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self { algorithm, value: hex_encode(bytes) }
    }
}

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

/// Hashes canonical JSON using SHA-256.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<HashDigest, HashError> {
    let bytes = serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))?;
    Ok(hash_bytes(&bytes))
}

/// Hashes raw bytes using SHA-256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    HashDigest::new(HashAlgorithm::Sha256, &digest)
}

/// Computes the webhook replay nonce for `(webhook_id, timestamp, body)`.
#[must_use]
pub fn webhook_nonce(webhook_id: &str, timestamp: i64, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(webhook_id.as_bytes());
    hasher.update(b".");
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(b".");
    hasher.update(body);
    hex_encode(&hasher.finalize())
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_deterministic() {
        let a = webhook_nonce("WH-1", 1000, b"{}");
        let b = webhook_nonce("WH-1", 1000, b"{}");
        assert_eq!(a, b);
    }

    #[test]
    fn nonce_changes_with_body() {
        let a = webhook_nonce("WH-1", 1000, b"{}");
        let b = webhook_nonce("WH-1", 1000, b"{\"x\":1}");
        assert_ne!(a, b);
    }
}
