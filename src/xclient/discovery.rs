//! Endpoint discovery with load-balancing selection.

use gee_rpc_core::error::RpcError;
use log::*;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// How [get](Discovery::get) picks one endpoint out of many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    Random,
    RoundRobin,
}

/// A source of server endpoints.
///
/// `get`/`get_all` are async because registry-backed implementations may
/// have to fetch before they can answer.
pub trait Discovery: Send + Sync + 'static {
    /// Re-fetches the endpoint list from wherever it originates. A no-op
    /// for manual lists.
    fn refresh(&self) -> impl Future<Output = Result<(), RpcError>> + Send;

    /// Replaces the endpoint list.
    fn update(&self, servers: Vec<String>) -> impl Future<Output = Result<(), RpcError>> + Send;

    /// Picks one endpoint; errors when the list is empty.
    fn get(&self, mode: SelectMode) -> impl Future<Output = Result<String, RpcError>> + Send;

    /// A copy of every known endpoint.
    fn get_all(&self) -> impl Future<Output = Result<Vec<String>, RpcError>> + Send;
}

/// A hand-maintained endpoint list, no registry involved.
pub struct MultiServersDiscovery {
    servers: RwLock<Vec<String>>,
    /// Round-robin cursor. Starts at a random offset so a fleet of fresh
    /// clients does not converge on the same first endpoint.
    index: AtomicUsize,
}

impl MultiServersDiscovery {
    pub fn new(servers: Vec<String>) -> Self {
        let index = rand::thread_rng().gen_range(0..i32::MAX as usize);
        Self { servers: RwLock::new(servers), index: AtomicUsize::new(index) }
    }
}

impl Discovery for MultiServersDiscovery {
    async fn refresh(&self) -> Result<(), RpcError> {
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<(), RpcError> {
        *self.servers.write().unwrap() = servers;
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String, RpcError> {
        let servers = self.servers.read().unwrap();
        let n = servers.len();
        if n == 0 {
            return Err(RpcError::NoAvailableServers);
        }
        match mode {
            SelectMode::Random => Ok(servers[rand::thread_rng().gen_range(0..n)].clone()),
            SelectMode::RoundRobin => {
                let i = self.index.fetch_add(1, Ordering::Relaxed);
                Ok(servers[i % n].clone())
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<String>, RpcError> {
        Ok(self.servers.read().unwrap().clone())
    }
}

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Discovery backed by a gee-rpc registry.
///
/// The endpoint list is re-fetched lazily whenever it is older than the
/// update interval, by reading the `X-Geerpc-Servers` header off a GET.
pub struct RegistryDiscovery {
    servers: MultiServersDiscovery,
    registry: String,
    update_interval: Duration,
    last_update: Mutex<Option<Instant>>,
    http: reqwest::Client,
}

impl RegistryDiscovery {
    /// `update_interval` of zero selects the 10 s default.
    pub fn new(registry: &str, update_interval: Duration) -> Self {
        let update_interval = if update_interval.is_zero() {
            DEFAULT_UPDATE_INTERVAL
        } else {
            update_interval
        };
        Self {
            servers: MultiServersDiscovery::new(Vec::new()),
            registry: registry.to_string(),
            update_interval,
            last_update: Mutex::new(None),
            http: reqwest::Client::new(),
        }
    }

    async fn ensure_fresh(&self) -> Result<(), RpcError> {
        let stale = match *self.last_update.lock().unwrap() {
            None => true,
            Some(at) => at.elapsed() > self.update_interval,
        };
        if stale {
            self.refresh().await?;
        }
        Ok(())
    }
}

impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<(), RpcError> {
        debug!("rpc discovery: refresh servers from registry {}", self.registry);
        let resp = self
            .http
            .get(&self.registry)
            .send()
            .await
            .map_err(|e| RpcError::Registry(e.to_string()))?;
        let list = resp
            .headers()
            .get("X-Geerpc-Servers")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RpcError::Registry("missing X-Geerpc-Servers header".to_string()))?;
        let servers: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        self.servers.update(servers).await?;
        *self.last_update.lock().unwrap() = Some(Instant::now());
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<(), RpcError> {
        self.servers.update(servers).await?;
        *self.last_update.lock().unwrap() = Some(Instant::now());
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String, RpcError> {
        self.ensure_fresh().await?;
        self.servers.get(mode).await
    }

    async fn get_all(&self) -> Result<Vec<String>, RpcError> {
        self.ensure_fresh().await?;
        self.servers.get_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_empty_list_is_an_error() {
        let d = MultiServersDiscovery::new(Vec::new());
        assert_eq!(d.get(SelectMode::Random).await, Err(RpcError::NoAvailableServers));
        assert_eq!(d.get(SelectMode::RoundRobin).await, Err(RpcError::NoAvailableServers));
    }

    #[tokio::test]
    async fn test_round_robin_frequency() {
        let endpoints: Vec<String> = (0..3).map(|i| format!("tcp@server-{}", i)).collect();
        let d = MultiServersDiscovery::new(endpoints.clone());

        // Each endpoint exactly once per window of n consecutive gets,
        // regardless of the random starting offset.
        for _ in 0..4 {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for _ in 0..endpoints.len() {
                let got = d.get(SelectMode::RoundRobin).await.expect("get");
                *counts.entry(got).or_default() += 1;
            }
            assert!(counts.values().all(|&c| c == 1), "uneven window: {:?}", counts);
        }
    }

    #[tokio::test]
    async fn test_random_stays_in_list() {
        let endpoints: Vec<String> = (0..3).map(|i| format!("tcp@server-{}", i)).collect();
        let d = MultiServersDiscovery::new(endpoints.clone());
        for _ in 0..32 {
            let got = d.get(SelectMode::Random).await.expect("get");
            assert!(endpoints.contains(&got));
        }
    }

    #[tokio::test]
    async fn test_update_replaces_list() {
        let d = MultiServersDiscovery::new(vec!["tcp@a".to_string()]);
        d.update(vec!["tcp@b".to_string()]).await.expect("update");
        assert_eq!(d.get_all().await.expect("get_all"), vec!["tcp@b".to_string()]);
        d.refresh().await.expect("refresh is a no-op");
    }
}
