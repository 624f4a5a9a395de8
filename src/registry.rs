//! The heartbeat registry: a directory of live servers.
//!
//! Servers POST a heartbeat carrying their address in `X-Geerpc-Server`;
//! clients GET the current fleet back in `X-Geerpc-Servers`. An entry that
//! misses heartbeats for longer than the timeout is pruned lazily the next
//! time the list is read.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::routing::get;
use axum::Router;
use gee_rpc_core::error::RpcError;
use log::*;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_PATH: &str = "/_geerpc_/registry";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const SERVERS_HEADER: &str = "X-Geerpc-Servers";
const SERVER_HEADER: &str = "X-Geerpc-Server";

/// Tracks last-heartbeat times per server address. Cheap to clone; clones
/// share the table.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Zero disables expiry.
    timeout: Duration,
    servers: Mutex<HashMap<String, Instant>>,
}

static DEFAULT_REGISTRY: LazyLock<Registry> = LazyLock::new(|| Registry::new(DEFAULT_TIMEOUT));

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Registry {
    pub fn new(timeout: Duration) -> Self {
        Self { inner: Arc::new(RegistryInner { timeout, servers: Mutex::new(HashMap::new()) }) }
    }

    /// The process-wide instance, for servers that just want
    /// [serve](Self::serve) somewhere and forget about it.
    pub fn default_global() -> &'static Registry {
        &DEFAULT_REGISTRY
    }

    /// Records a heartbeat, registering the address on first sight.
    pub fn put_server(&self, addr: &str) {
        let mut servers = self.inner.servers.lock().unwrap();
        servers.insert(addr.to_string(), Instant::now());
    }

    /// The currently-alive addresses, sorted so every client walks the
    /// fleet in the same order (round-robin stays fair across clients).
    /// Dead entries are deleted on the way.
    pub fn alive_servers(&self) -> Vec<String> {
        let timeout = self.inner.timeout;
        let now = Instant::now();
        let mut servers = self.inner.servers.lock().unwrap();
        servers.retain(|_, last| timeout.is_zero() || *last + timeout > now);
        let mut alive: Vec<String> = servers.keys().cloned().collect();
        alive.sort();
        alive
    }

    /// The HTTP surface, mounted at [DEFAULT_PATH]. GET lists, POST beats,
    /// anything else is 405.
    pub fn router(&self) -> Router {
        Router::new()
            .route(DEFAULT_PATH, get(list_servers).post(heartbeat_once))
            .with_state(self.clone())
    }

    /// Serves the registry on `listener` until the process exits.
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> io::Result<()> {
        info!("rpc registry path: {}", DEFAULT_PATH);
        axum::serve(listener, self.router()).await
    }
}

async fn list_servers(State(registry): State<Registry>) -> (StatusCode, HeaderMap) {
    let alive = registry.alive_servers().join(",");
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&alive) {
        Ok(v) => {
            headers.insert(SERVERS_HEADER, v);
            (StatusCode::OK, headers)
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, headers),
    }
}

async fn heartbeat_once(State(registry): State<Registry>, headers: HeaderMap) -> StatusCode {
    match headers.get(SERVER_HEADER).and_then(|v| v.to_str().ok()) {
        None | Some("") => StatusCode::INTERNAL_SERVER_ERROR,
        Some(addr) => {
            registry.put_server(addr);
            StatusCode::OK
        }
    }
}

/// Announces `addr` to the registry now, then keeps beating on a background
/// task until a send fails. A zero period defaults to the registry timeout
/// minus a minute, leaving one full period of slack before expiry.
///
/// Returns the first heartbeat's outcome so a server can fail fast when the
/// registry is down at startup.
pub async fn heartbeat(registry: &str, addr: &str, period: Duration) -> Result<(), RpcError> {
    let period = if period.is_zero() {
        DEFAULT_TIMEOUT - Duration::from_secs(60)
    } else {
        period
    };
    let http = reqwest::Client::new();
    send_heartbeat(&http, registry, addr).await?;
    let registry = registry.to_string();
    let addr = addr.to_string();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.tick().await; // the immediate first tick
        loop {
            tick.tick().await;
            if send_heartbeat(&http, &registry, &addr).await.is_err() {
                return;
            }
        }
    });
    Ok(())
}

async fn send_heartbeat(
    http: &reqwest::Client, registry: &str, addr: &str,
) -> Result<(), RpcError> {
    info!("{} send heart beat to registry {}", addr, registry);
    http.post(registry)
        .header(SERVER_HEADER, addr)
        .send()
        .await
        .map_err(|e| {
            error!("rpc server: heart beat err: {}", e);
            RpcError::Registry(e.to_string())
        })?;
    Ok(())
}
