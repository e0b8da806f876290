// soar-system-tests/tests/support/mod.rs
// ============================================================================
// Module: System Test Harness
// Description: Shared server/client scaffolding for end-to-end scenarios.
// Purpose: Spin up a real soar-api server over an in-memory store and sign
//          webhook requests the way a real caller would (§4.1, §8).
// Dependencies: soar-api, soar-core, soar-config, tokio, hmac, sha2
// ============================================================================

#![allow(dead_code, reason = "not every scenario binary exercises every helper")]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;

use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use soar_api::server::ServerError;
use soar_api::AppState;
use soar_config::SoarConfig;
use soar_core::model::ConnectorRecord;
use soar_core::store::MemoryStore;
use soar_core::Engine;
use soar_core::SystemClock;
use tokio::task::JoinHandle;

/// A deterministic, fixed-length hex secret usable as a webhook HMAC key.
pub const TEST_SECRET_HEX: &str = "ab11ab11ab11ab11ab11ab11ab11ab11ab11ab11ab11ab11ab11ab11ab11ab";

/// A running `soar-api` server bound to a loopback port.
pub struct ServerHandle {
    base_url: String,
    join: JoinHandle<Result<(), ServerError>>,
}

impl ServerHandle {
    /// Returns the server's base URL, with no trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Aborts the server task and waits for it to unwind.
    pub async fn shutdown(self) {
        self.join.abort();
        let _ = self.join.await;
    }
}

/// Returns a free loopback address, reserved until `release_bind_addr` runs.
///
/// Mirrors the reserve-then-release-then-bind pattern every real caller of
/// `soar_api::serve` follows: a held listener prevents another test from
/// racing onto the same ephemeral port between allocation and the real bind.
///
/// # Errors
///
/// Returns an error if no loopback port is available or the reservation
/// table's mutex is poisoned.
pub fn allocate_bind_addr() -> Result<SocketAddr, String> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(|err| format!("failed to bind loopback: {err}"))?;
    let addr = listener.local_addr().map_err(|err| format!("failed to read listener address: {err}"))?;
    reserve_port(addr.port(), listener)?;
    Ok(addr)
}

/// Releases a port reserved by `allocate_bind_addr`, just before the real
/// server binds it.
pub fn release_bind_addr(addr: SocketAddr) {
    if let Ok(mut guard) = port_reservations().lock() {
        drop(guard.remove(&addr.port()));
    }
}

fn reserve_port(port: u16, listener: TcpListener) -> Result<(), String> {
    port_reservations().lock().map_err(|_| "port reservation mutex poisoned".to_string())?.insert(port, listener);
    Ok(())
}

fn port_reservations() -> &'static Mutex<HashMap<u16, TcpListener>> {
    static PORT_RESERVATIONS: OnceLock<Mutex<HashMap<u16, TcpListener>>> = OnceLock::new();
    PORT_RESERVATIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Builds an `AppState` wired to a fresh `MemoryStore`, with `connector_records`
/// registered both into the connector store and the live connector registry.
#[must_use]
pub fn build_state(connector_records: Vec<ConnectorRecord>, config: SoarConfig) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let (registry, _failures) = soar_api::connector_registry::build_registry(&connector_records);
    for record in connector_records {
        let _ = soar_core::store::ConnectorStore::put(store.as_ref(), record);
    }
    let config = Arc::new(config);
    let engine = Arc::new(
        Engine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(registry),
            store.clone(),
            store.clone(),
            Arc::new(SystemClock),
        )
        .with_max_step_executions(config.engine.max_step_executions),
    );
    let state = soar_api::build_state(
        engine,
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        config,
    );
    (state, store)
}

/// Spawns a real `soar-api` server over `state` and waits for `/healthz`.
///
/// # Errors
///
/// Returns an error if no port can be reserved or the server never answers
/// `/healthz` within the wait budget.
pub async fn spawn_server(state: AppState) -> Result<ServerHandle, String> {
    let addr = allocate_bind_addr()?;
    let base_url = format!("http://{addr}");
    release_bind_addr(addr);
    let join = tokio::spawn(soar_api::serve(addr, state));
    wait_for_ready(&base_url).await?;
    Ok(ServerHandle { base_url, join })
}

async fn wait_for_ready(base_url: &str) -> Result<(), String> {
    let client = reqwest::Client::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(response) = client.get(format!("{base_url}/healthz")).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        if std::time::Instant::now() >= deadline {
            return Err("server did not become ready within 5s".to_string());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Signs `body` the way a real webhook caller would (§4.1): HMAC-SHA256 over
/// `"{timestamp}."` concatenated with the raw body bytes, hex-encoded.
///
/// # Errors
///
/// Returns an error if `secret_hex` is not valid hex.
pub fn sign_webhook(secret_hex: &str, timestamp: i64, body: &[u8]) -> Result<String, String> {
    let key = hex_decode(secret_hex)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key).map_err(|err| err.to_string())?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(body);
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn hex_decode(text: &str) -> Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err("hex string has odd length".to_string());
    }
    (0..text.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&text[index..index + 2], 16).map_err(|err| err.to_string()))
        .collect()
}

/// Current unix timestamp, for signing live requests.
#[must_use]
pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
