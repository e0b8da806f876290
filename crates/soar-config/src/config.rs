// crates/soar-config/src/config.rs
// ============================================================================
// Module: SOAR Configuration
// Description: Layered configuration loading and validation (§6).
// Purpose: Produce immutable EngineConfig/IngressConfig/SlaThresholds structs.
// Dependencies: soar-core, serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration loads in three layers, each overriding the last: compiled
//! defaults, an optional TOML file (path from `SOAR_CONFIG_FILE` or the
//! explicit `path` argument), then environment variables. A missing file is
//! not an error; a malformed one is.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV_VAR: &str = "SOAR_CONFIG_FILE";
/// Maximum configuration file size accepted, in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

const fn default_max_step_executions() -> u32 {
    1000
}
const fn default_max_step_timeout_seconds() -> u64 {
    30
}
const fn default_per_ip_per_minute() -> u32 {
    60
}
const fn default_playbook_floods_per_minute() -> u32 {
    120
}
const fn default_timestamp_tolerance_seconds() -> i64 {
    300
}
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}
const fn default_nonce_cache_capacity() -> usize {
    65_536
}
const fn default_acknowledge_ms() -> u64 {
    5 * 60 * 1000
}
const fn default_containment_ms() -> u64 {
    30 * 60 * 1000
}
const fn default_resolution_ms() -> u64 {
    4 * 60 * 60 * 1000
}

// ============================================================================
// SECTION: Top-level Config
// ============================================================================

/// The complete, validated startup configuration (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SoarConfig {
    /// Execution engine configuration.
    pub engine: EngineConfig,
    /// Webhook ingress configuration.
    pub ingress: IngressConfig,
    /// Default SLA thresholds, applied when no playbook- or severity-scoped
    /// policy matches.
    pub sla: SlaThresholds,
}

impl Default for SoarConfig {
    fn default() -> Self {
        Self { engine: EngineConfig::default(), ingress: IngressConfig::default(), sla: SlaThresholds::default() }
    }
}

impl SoarConfig {
    /// Loads configuration from compiled defaults, an optional TOML file,
    /// then environment variables, in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`SoarConfigError`] when a file is present but unreadable,
    /// oversized, not valid UTF-8, not valid TOML, or when the merged result
    /// fails [`SoarConfig::validate`].
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, SoarConfigError> {
        let mut config = Self::default();
        if let Some(path) = resolve_path(explicit_path) {
            config = load_file(&path)?;
        }
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), SoarConfigError> {
        if let Some(value) = parse_env("SOAR_ENGINE_MAX_STEP_EXECUTIONS")? {
            self.engine.max_step_executions = value;
        }
        if let Some(value) = parse_env("SOAR_ENGINE_MAX_STEP_TIMEOUT_SECONDS")? {
            self.engine.max_step_timeout_seconds = value;
        }
        if let Some(value) = parse_env("SOAR_INGRESS_PER_IP_PER_MINUTE")? {
            self.ingress.rate_limit.per_ip_per_minute = value;
        }
        if let Some(value) = parse_env("SOAR_INGRESS_PLAYBOOK_FLOODS_PER_MINUTE")? {
            self.ingress.rate_limit.playbook_floods_per_minute = value;
        }
        if let Some(value) = parse_env("SOAR_INGRESS_TIMESTAMP_TOLERANCE_SECONDS")? {
            self.ingress.timestamp_tolerance_seconds = value;
        }
        if let Some(value) = parse_env("SOAR_INGRESS_MAX_BODY_BYTES")? {
            self.ingress.max_body_bytes = value;
        }
        if let Some(value) = parse_env("SOAR_SLA_ACKNOWLEDGE_MS")? {
            self.sla.acknowledge_ms = value;
        }
        if let Some(value) = parse_env("SOAR_SLA_CONTAINMENT_MS")? {
            self.sla.containment_ms = value;
        }
        if let Some(value) = parse_env("SOAR_SLA_RESOLUTION_MS")? {
            self.sla.resolution_ms = value;
        }
        Ok(())
    }

    /// Validates internal consistency of the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SoarConfigError::Invalid`] when any field is out of range.
    pub fn validate(&self) -> Result<(), SoarConfigError> {
        self.engine.validate()?;
        self.ingress.validate()?;
        self.sla.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Engine Configuration
// ============================================================================

/// Execution engine tuning (§4.4.3, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Loop guard: maximum step advances before an execution is failed with
    /// `LOOP_DETECTED`.
    pub max_step_executions: u32,
    /// Maximum wall-clock time a connector invocation may take, in seconds.
    pub max_step_timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_step_executions: default_max_step_executions(),
            max_step_timeout_seconds: default_max_step_timeout_seconds(),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), SoarConfigError> {
        if self.max_step_executions == 0 {
            return Err(SoarConfigError::Invalid("engine.max_step_executions must be greater than zero".to_string()));
        }
        if self.max_step_timeout_seconds == 0 {
            return Err(SoarConfigError::Invalid("engine.max_step_timeout_seconds must be greater than zero".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Ingress Configuration
// ============================================================================

/// Webhook ingress tuning (§4.1, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Tolerance for wall-clock skew of signed requests, in seconds.
    pub timestamp_tolerance_seconds: i64,
    /// Maximum accepted request body size, in bytes.
    pub max_body_bytes: usize,
    /// Number of recent nonces retained per webhook for replay detection.
    pub nonce_cache_capacity: usize,
    /// Default per-webhook rate limits, used when a webhook record does not
    /// override them.
    pub rate_limit: RateLimitConfig,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_seconds: default_timestamp_tolerance_seconds(),
            max_body_bytes: default_max_body_bytes(),
            nonce_cache_capacity: default_nonce_cache_capacity(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl IngressConfig {
    fn validate(&self) -> Result<(), SoarConfigError> {
        if self.timestamp_tolerance_seconds <= 0 {
            return Err(SoarConfigError::Invalid("ingress.timestamp_tolerance_seconds must be positive".to_string()));
        }
        if self.max_body_bytes == 0 {
            return Err(SoarConfigError::Invalid("ingress.max_body_bytes must be greater than zero".to_string()));
        }
        if self.nonce_cache_capacity == 0 {
            return Err(SoarConfigError::Invalid("ingress.nonce_cache_capacity must be greater than zero".to_string()));
        }
        self.rate_limit.validate()
    }
}

/// Default webhook flood limits (§3.4, §4.1), overridable per webhook record.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum accepted requests per source IP per minute.
    pub per_ip_per_minute: u32,
    /// Maximum accepted requests for one playbook across all sources per
    /// minute, the "flood" limit.
    pub playbook_floods_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { per_ip_per_minute: default_per_ip_per_minute(), playbook_floods_per_minute: default_playbook_floods_per_minute() }
    }
}

impl RateLimitConfig {
    fn validate(&self) -> Result<(), SoarConfigError> {
        if self.per_ip_per_minute == 0 {
            return Err(SoarConfigError::Invalid("ingress.rate_limit.per_ip_per_minute must be greater than zero".to_string()));
        }
        if self.playbook_floods_per_minute == 0 {
            return Err(SoarConfigError::Invalid("ingress.rate_limit.playbook_floods_per_minute must be greater than zero".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: SLA Configuration
// ============================================================================

/// Default SLA thresholds (§4.7, §6), used when a playbook/severity-scoped
/// policy is absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlaThresholds {
    /// Maximum time to acknowledge, from webhook receipt, in milliseconds.
    pub acknowledge_ms: u64,
    /// Maximum time to first completed action step, in milliseconds.
    pub containment_ms: u64,
    /// Maximum time to a terminal state, in milliseconds.
    pub resolution_ms: u64,
}

impl Default for SlaThresholds {
    fn default() -> Self {
        Self {
            acknowledge_ms: default_acknowledge_ms(),
            containment_ms: default_containment_ms(),
            resolution_ms: default_resolution_ms(),
        }
    }
}

impl SlaThresholds {
    fn validate(&self) -> Result<(), SoarConfigError> {
        if self.acknowledge_ms == 0 || self.containment_ms == 0 || self.resolution_ms == 0 {
            return Err(SoarConfigError::Invalid("sla thresholds must all be greater than zero".to_string()));
        }
        if self.acknowledge_ms > self.containment_ms || self.containment_ms > self.resolution_ms {
            return Err(SoarConfigError::Invalid(
                "sla thresholds must be non-decreasing: acknowledge <= containment <= resolution".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors and Helpers
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum SoarConfigError {
    /// I/O failure while reading the config file.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// An environment variable held a value of the wrong type.
    #[error("invalid environment override {name}: {value}")]
    Env {
        /// Name of the offending environment variable.
        name: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
    /// The merged configuration failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn load_file(path: &Path) -> Result<SoarConfig, SoarConfigError> {
    let bytes = fs::read(path).map_err(|err| SoarConfigError::Io(err.to_string()))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(SoarConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes).map_err(|_| SoarConfigError::Invalid("config file must be utf-8".to_string()))?;
    toml::from_str(content).map_err(|err| SoarConfigError::Parse(err.to_string()))
}

fn parse_env<T>(name: &'static str) -> Result<Option<T>, SoarConfigError>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(value) => value.parse().map(Some).map_err(|_| SoarConfigError::Env { name, value }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(SoarConfigError::Env { name, value: "<non-utf8>".to_string() }),
    }
}
