//! The fan-out client: discovery-driven selection, per-endpoint connection
//! reuse, and first-success broadcast.

mod discovery;
pub use discovery::{Discovery, MultiServersDiscovery, RegistryDiscovery, SelectMode};

use crate::client::Client;
use gee_rpc_core::error::RpcError;
use gee_rpc_core::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// A load-balancing client over a fleet of servers.
///
/// Endpoints come from the [Discovery]; one [Client] per endpoint is kept
/// in a pool and reused across calls. Cheap to clone; clones share the
/// pool.
pub struct XClient<D: Discovery> {
    inner: Arc<XClientInner<D>>,
}

impl<D: Discovery> Clone for XClient<D> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct XClientInner<D: Discovery> {
    d: D,
    mode: SelectMode,
    opt: Options,
    /// One mutex over the whole lookup-evict-dial sequence, so two tasks
    /// racing for the same endpoint share one connection.
    clients: tokio::sync::Mutex<HashMap<String, Client>>,
}

impl<D: Discovery> XClient<D> {
    pub fn new(d: D, mode: SelectMode, opt: Options) -> Self {
        Self {
            inner: Arc::new(XClientInner {
                d,
                mode,
                opt,
                clients: tokio::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Closes and drops every pooled client.
    pub async fn close(&self) {
        let mut clients = self.inner.clients.lock().await;
        for (_, client) in clients.drain() {
            let _ = client.close().await;
        }
    }

    async fn dial(&self, rpc_addr: &str) -> Result<Client, RpcError> {
        let mut clients = self.inner.clients.lock().await;
        if let Some(client) = clients.get(rpc_addr) {
            if client.is_available() {
                return Ok(client.clone());
            }
            let dead = clients.remove(rpc_addr);
            if let Some(dead) = dead {
                let _ = dead.close().await;
            }
        }
        let client = Client::xdial(rpc_addr, &self.inner.opt).await?;
        clients.insert(rpc_addr.to_string(), client.clone());
        Ok(client)
    }

    async fn call_addr<A, R>(&self, rpc_addr: &str, service_method: &str, args: &A) -> Result<R, RpcError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let client = self.dial(rpc_addr).await?;
        client.call(service_method, args).await
    }

    /// One call against one endpoint picked by the discovery's selection
    /// mode.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R, RpcError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let rpc_addr = self.inner.d.get(self.inner.mode).await?;
        self.call_addr(&rpc_addr, service_method, args).await
    }

    /// Invokes the method on every known endpoint concurrently.
    ///
    /// The first failure aborts the in-flight siblings and becomes the
    /// return value; otherwise the first reply to arrive wins (which of
    /// several concurrent successes wins is unspecified). Aborted calls
    /// withdraw their pending entries, so a server that answers anyway is
    /// drained without effect.
    pub async fn broadcast<A, R>(&self, service_method: &str, args: &A) -> Result<R, RpcError>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let servers = self.inner.d.get_all().await?;
        let mut tasks: JoinSet<Result<R, RpcError>> = JoinSet::new();
        for rpc_addr in servers {
            let xc = self.clone();
            let service_method = service_method.to_string();
            let args = args.clone();
            tasks.spawn(async move { xc.call_addr(&rpc_addr, &service_method, &args).await });
        }
        let mut first_err: Option<RpcError> = None;
        let mut reply: Option<R> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(r)) => {
                    if reply.is_none() {
                        reply = Some(r);
                    }
                }
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                        tasks.abort_all();
                    }
                }
                // An aborted sibling; its call was already withdrawn.
                Err(_) => {}
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => reply.ok_or(RpcError::NoAvailableServers),
        }
    }
}
