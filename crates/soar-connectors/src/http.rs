// crates/soar-connectors/src/http.rs
// ============================================================================
// Module: HTTP Connector
// Description: A generic, SSRF-hardened HTTP connector for action/notification steps.
// Purpose: Invoke third-party REST APIs by action_type with bounded, pinned requests.
// Dependencies: soar-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! One `HttpConnector` instance is built from a [`HttpConnectorConfig`] at
//! registration time and is immutable afterward (§5). Each supported
//! `action_type` maps to one HTTP call: a method, a path template (with
//! `{field}` placeholders substituted from resolved inputs), and an optional
//! declared input schema. Outbound hardening mirrors the evidence-provider
//! pattern used elsewhere in this workspace: host allow/deny policy, blocked
//! private/loopback/link-local targets (including IPv4-mapped IPv6), pinned
//! DNS resolution, disabled redirects, and a capped response size.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::Read;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use soar_core::connector::ActionSchema;
use soar_core::connector::Connector;
use soar_core::connector::ConnectorError;

/// One supported `action_type`'s HTTP binding.
#[derive(Debug, Clone)]
pub struct ActionBinding {
    /// HTTP method to issue.
    pub method: reqwest::Method,
    /// Path template, relative to `base_url`. `{field}` placeholders are
    /// substituted from resolved inputs; unsubstituted inputs become the
    /// JSON request body for non-GET methods.
    pub path_template: String,
    /// Declared input schema, enforced before the request is sent.
    pub schema: ActionSchema,
}

/// Configuration for an [`HttpConnector`], read from a connector record's
/// opaque `config` at registration time.
#[derive(Debug, Clone)]
pub struct HttpConnectorConfig {
    /// Base URL every action path is resolved against.
    pub base_url: Url,
    /// Supported actions, keyed by `action_type`.
    pub actions: BTreeMap<String, ActionBinding>,
    /// Static headers applied to every request (e.g. an API key).
    pub static_headers: BTreeMap<String, String>,
    /// Allow cleartext HTTP. Disabled by default.
    pub allow_http: bool,
    /// Optional host allowlist; when set, only listed hosts are permitted.
    pub allowed_hosts: Option<BTreeSet<String>>,
    /// Allow requests to private/link-local/loopback targets.
    pub allow_private_networks: bool,
    /// Maximum response body size, in bytes.
    pub max_response_bytes: usize,
    /// Default request timeout when the caller does not supply one.
    pub default_timeout: Duration,
}

/// Settings a connector record supplies via its JSON `config` (§3.7).
#[derive(Debug, Deserialize)]
struct RawConfig {
    base_url: String,
    #[serde(default)]
    allow_http: bool,
    #[serde(default)]
    allowed_hosts: Option<BTreeSet<String>>,
    #[serde(default)]
    allow_private_networks: bool,
    #[serde(default = "default_max_response_bytes")]
    max_response_bytes: usize,
    #[serde(default)]
    static_headers: BTreeMap<String, String>,
}

const fn default_max_response_bytes() -> usize {
    1024 * 1024
}

impl HttpConnectorConfig {
    /// Parses a connector record's opaque `config` JSON into typed settings,
    /// pairing it with the action bindings this connector instance supports.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidInput`] when `config` is malformed.
    pub fn from_record_config(config: &Value, actions: BTreeMap<String, ActionBinding>) -> Result<Self, ConnectorError> {
        let raw: RawConfig = serde_json::from_value(config.clone())
            .map_err(|err| ConnectorError::InvalidInput(format!("invalid connector config: {err}")))?;
        let base_url = Url::parse(&raw.base_url).map_err(|_| ConnectorError::InvalidInput("invalid base_url".to_string()))?;
        Ok(Self {
            base_url,
            actions,
            static_headers: raw.static_headers,
            allow_http: raw.allow_http,
            allowed_hosts: raw.allowed_hosts,
            allow_private_networks: raw.allow_private_networks,
            max_response_bytes: raw.max_response_bytes,
            default_timeout: Duration::from_secs(30),
        })
    }
}

/// An SSRF-hardened, generic HTTP connector (§4.5, §9).
pub struct HttpConnector {
    config: HttpConnectorConfig,
}

impl HttpConnector {
    /// Builds a connector from configuration resolved at registration time.
    #[must_use]
    pub const fn new(config: HttpConnectorConfig) -> Self {
        Self { config }
    }

    fn build_url(&self, binding: &ActionBinding, inputs: &BTreeMap<String, Value>) -> Result<(Url, BTreeMap<String, Value>), ConnectorError> {
        let mut path = binding.path_template.clone();
        let mut remaining = inputs.clone();
        for (key, value) in inputs {
            let placeholder = format!("{{{key}}}");
            if path.contains(&placeholder) {
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                path = path.replace(&placeholder, &rendered);
                remaining.remove(key);
            }
        }
        let joined = self
            .config
            .base_url
            .join(&path)
            .map_err(|_| ConnectorError::InvalidInput(format!("could not build URL from path template {path}")))?;
        Ok((joined, remaining))
    }

    fn send(&self, url: &Url, method: &reqwest::Method, body: Option<&Value>, timeout: Duration) -> Result<Response, ConnectorError> {
        validate_scheme_and_host(url, &self.config)?;
        let resolved = resolve_request_host(url, &self.config)?;
        let mut last_error = None;
        for ip in &resolved.ips {
            let client = self.client_for(&resolved, *ip, timeout)?;
            let mut request = client.request(method.clone(), url.as_str());
            for (name, value) in &self.config.static_headers {
                request = request.header(name, value);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            let Ok(response) = request.send() else {
                last_error = Some(ConnectorError::ConnectionFailed(format!("request to {ip} failed")));
                continue;
            };
            if response.url() != url {
                return Err(ConnectorError::Internal("redirect not allowed".to_string()));
            }
            enforce_ip_policy(ip, self.config.allow_private_networks)?;
            return Ok(response);
        }
        Err(last_error.unwrap_or(ConnectorError::Timeout))
    }

    fn client_for(&self, resolved: &ResolvedHost, ip: IpAddr, timeout: Duration) -> Result<Client, ConnectorError> {
        let mut builder = Client::builder().timeout(timeout).redirect(Policy::none());
        if resolved.is_domain {
            builder = builder.resolve(&resolved.host, SocketAddr::new(ip, resolved.port));
        }
        builder.build().map_err(|_| ConnectorError::Internal("http client build failed".to_string()))
    }
}

impl Connector for HttpConnector {
    fn schema(&self, action_type: &str) -> Option<ActionSchema> {
        self.config.actions.get(action_type).map(|binding| binding.schema.clone())
    }

    fn execute(&self, action_type: &str, inputs: &Value, timeout: Duration) -> Result<Value, ConnectorError> {
        let binding = self.config.actions.get(action_type).ok_or_else(|| ConnectorError::InvalidAction(action_type.to_string()))?;
        binding.schema.validate(inputs)?;
        let Value::Object(map) = inputs else {
            return Err(ConnectorError::InvalidInput("inputs must be a JSON object".to_string()));
        };
        let inputs: BTreeMap<String, Value> = map.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
        let (url, remaining) = self.build_url(binding, &inputs)?;
        let body = (binding.method != reqwest::Method::GET).then(|| serde_json::to_value(&remaining).unwrap_or(Value::Null));
        let mut response = self.send(&url, &binding.method, body.as_ref(), timeout)?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body_hint = read_limited(&mut response, 4096).unwrap_or_default();
            return Err(ConnectorError::from_http_status(status, &String::from_utf8_lossy(&body_hint)));
        }
        let body = read_limited(&mut response, self.config.max_response_bytes)?;
        serde_json::from_slice(&body).or_else(|_| Ok(Value::String(String::from_utf8_lossy(&body).into_owned())))
    }
}

fn validate_scheme_and_host(url: &Url, config: &HttpConnectorConfig) -> Result<(), ConnectorError> {
    match url.scheme() {
        "https" => {}
        "http" if config.allow_http => {}
        _ => return Err(ConnectorError::InvalidInput("unsupported url scheme".to_string())),
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ConnectorError::InvalidInput("url credentials are not allowed".to_string()));
    }
    if let Some(allowlist) = &config.allowed_hosts {
        let host = normalize_host_label(url.host_str().ok_or_else(|| ConnectorError::InvalidInput("url host required".to_string()))?);
        if !allowlist.iter().any(|entry| normalize_host_label(entry) == host) {
            return Err(ConnectorError::Forbidden);
        }
    }
    Ok(())
}

struct ResolvedHost {
    host: String,
    port: u16,
    ips: Vec<IpAddr>,
    is_domain: bool,
}

fn resolve_request_host(url: &Url, config: &HttpConnectorConfig) -> Result<ResolvedHost, ConnectorError> {
    let host = url.host_str().ok_or_else(|| ConnectorError::InvalidInput("url host required".to_string()))?;
    let host_for_resolution = host.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')).unwrap_or(host);
    let port = url.port_or_known_default().ok_or_else(|| ConnectorError::InvalidInput("url port required".to_string()))?;
    let mut ips = resolve_host_ips(host_for_resolution, port)?;
    if ips.is_empty() {
        return Err(ConnectorError::ConnectionFailed("no resolved addresses".to_string()));
    }
    for ip in &ips {
        enforce_ip_policy(ip, config.allow_private_networks)?;
    }
    dedupe_ips(&mut ips);
    Ok(ResolvedHost { host: host_for_resolution.to_string(), port, ips, is_domain: host_for_resolution.parse::<IpAddr>().is_err() })
}

fn resolve_host_ips(host: &str, port: u16) -> Result<Vec<IpAddr>, ConnectorError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    (host, port)
        .to_socket_addrs()
        .map(|iter| iter.map(|addr| addr.ip()).collect())
        .map_err(|_| ConnectorError::ConnectionFailed("dns resolution failed".to_string()))
}

fn enforce_ip_policy(ip: &IpAddr, allow_private_networks: bool) -> Result<(), ConnectorError> {
    if allow_private_networks {
        return Ok(());
    }
    if is_private_or_link_local(ip) {
        return Err(ConnectorError::Forbidden);
    }
    Ok(())
}

const fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private() || addr.is_loopback() || addr.is_link_local() || addr.is_unspecified() || addr.is_multicast() || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            let mapped_private = if let Some(mapped) = addr.to_ipv4_mapped() {
                mapped.is_private() || mapped.is_loopback() || mapped.is_link_local() || mapped.is_unspecified() || mapped.is_multicast() || mapped.is_broadcast()
            } else {
                false
            };
            mapped_private || addr.is_loopback() || addr.is_unique_local() || addr.is_unicast_link_local() || addr.is_unspecified() || addr.is_multicast()
        }
    }
}

fn normalize_host_label(host: &str) -> String {
    let trimmed = host.trim_end_matches('.');
    let trimmed = trimmed.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')).unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

fn dedupe_ips(ips: &mut Vec<IpAddr>) {
    let mut unique = Vec::with_capacity(ips.len());
    for ip in ips.drain(..) {
        if !unique.contains(&ip) {
            unique.push(ip);
        }
    }
    *ips = unique;
}

fn read_limited(response: &mut Response, max_bytes: usize) -> Result<Vec<u8>, ConnectorError> {
    let mut buf = Vec::new();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    response
        .take(limit)
        .read_to_end(&mut buf)
        .map_err(|err| ConnectorError::Internal(format!("failed to read response: {err}")))?;
    if buf.len() > max_bytes {
        return Err(ConnectorError::Internal("response exceeds size limit".to_string()));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(method: reqwest::Method, path: &str) -> ActionBinding {
        ActionBinding { method, path_template: path.to_string(), schema: ActionSchema::default() }
    }

    #[test]
    fn private_address_is_rejected_by_default() {
        let config = HttpConnectorConfig {
            base_url: Url::parse("https://127.0.0.1/").expect("valid url"),
            actions: BTreeMap::from([("block_ip".to_string(), binding(reqwest::Method::POST, "block"))]),
            static_headers: BTreeMap::new(),
            allow_http: false,
            allowed_hosts: None,
            allow_private_networks: false,
            max_response_bytes: 1024,
            default_timeout: Duration::from_secs(1),
        };
        let connector = HttpConnector::new(config);
        let err = connector.execute("block_ip", &serde_json::json!({"ip": "10.0.0.5"}), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let config = HttpConnectorConfig {
            base_url: Url::parse("https://example.com/").expect("valid url"),
            actions: BTreeMap::new(),
            static_headers: BTreeMap::new(),
            allow_http: false,
            allowed_hosts: None,
            allow_private_networks: false,
            max_response_bytes: 1024,
            default_timeout: Duration::from_secs(1),
        };
        let connector = HttpConnector::new(config);
        let err = connector.execute("does_not_exist", &serde_json::json!({}), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code(), "INVALID_ACTION");
    }
}
