//! The server side: accept loop, per-connection dispatch, HTTP tunnel.

use crate::debug;
use crate::service::{MethodType, Service};
use gee_rpc_codec::AnyCodec;
use gee_rpc_core::error::{DispatchError, RpcError};
use gee_rpc_core::net::{UnifyListener, UnifyStream};
use gee_rpc_core::proto::{FrameReader, FrameWriter, Header};
use gee_rpc_core::{Codec, MAGIC_NUMBER};
use log::*;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};

/// Status line sent after a successful CONNECT, also the token the client
/// checks before switching the connection to the RPC protocol.
pub(crate) const CONNECTED: &str = "HTTP/1.0 200 Connected to Gee RPC";
/// Path the CONNECT tunnel is served on.
pub const DEFAULT_RPC_PATH: &str = "/_geerpc_";
/// Path of the HTML status view.
pub const DEFAULT_DEBUG_PATH: &str = "/debug/geerpc";

/// A response queued for the connection's writer task.
type Response = (Header, Vec<u8>);

/// The RPC server: a set of registered services plus the loops that serve
/// them over stream connections.
///
/// Cheap to clone; clones share the service table.
#[derive(Clone, Default)]
pub struct Server {
    inner: Arc<ServerInner>,
}

#[derive(Default)]
struct ServerInner {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

static DEFAULT_SERVER: LazyLock<Server> = LazyLock::new(Server::new);

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance behind [crate::register] and
    /// [crate::listen]. Prefer constructing your own in tests.
    pub fn default_global() -> &'static Server {
        &DEFAULT_SERVER
    }

    /// Publishes a service. Duplicate names are rejected so a later
    /// registration can never silently shadow live methods.
    pub fn register(&self, service: Service) -> Result<(), RpcError> {
        let mut services = self.inner.services.write().unwrap();
        let name = service.name().to_string();
        if services.contains_key(&name) {
            return Err(RpcError::DuplicateService(name));
        }
        services.insert(name, Arc::new(service));
        Ok(())
    }

    fn find_service(
        &self, service_method: &str,
    ) -> Result<(Arc<Service>, Arc<MethodType>), DispatchError> {
        let Some((service_name, method_name)) = service_method.rsplit_once('.') else {
            return Err(DispatchError::IllFormed(service_method.to_string()));
        };
        let svc = self
            .inner
            .services
            .read()
            .unwrap()
            .get(service_name)
            .cloned()
            .ok_or_else(|| DispatchError::ServiceNotFound(service_name.to_string()))?;
        let mtype = svc
            .find_method(method_name)
            .ok_or_else(|| DispatchError::MethodNotFound(method_name.to_string()))?;
        Ok((svc, mtype))
    }

    pub(crate) fn services_snapshot(&self) -> Vec<Arc<Service>> {
        let services = self.inner.services.read().unwrap();
        let mut all: Vec<_> = services.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Binds `addr` and serves plain RPC connections on a background task.
    /// Returns the bound address, which is what you want with `:0`.
    pub async fn listen(&self, addr: &str) -> io::Result<String> {
        let listener = UnifyListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let server = self.clone();
        tokio::spawn(async move { server.accept(listener).await });
        Ok(local_addr)
    }

    /// Same as [listen](Self::listen), but connections open with an HTTP
    /// request head: CONNECT switches to RPC, the debug path serves the
    /// status page.
    pub async fn listen_http(&self, addr: &str) -> io::Result<String> {
        let listener = UnifyListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let server = self.clone();
        tokio::spawn(async move { server.accept_http(listener).await });
        Ok(local_addr)
    }

    /// Accepts connections until the listener fails, each served on its own
    /// task.
    pub async fn accept(&self, listener: UnifyListener) {
        loop {
            match listener.accept().await {
                Err(e) => {
                    error!("rpc server: accept error: {}", e);
                    return;
                }
                Ok(stream) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_conn(stream).await });
                }
            }
        }
    }

    pub async fn accept_http(&self, listener: UnifyListener) {
        loop {
            match listener.accept().await {
                Err(e) => {
                    error!("rpc server: accept error: {}", e);
                    return;
                }
                Ok(stream) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_http_conn(stream).await });
                }
            }
        }
    }

    /// Serves one connection: option preamble, then framed dispatch.
    ///
    /// A bad magic number or a broken preamble is logged and the connection
    /// dropped without a response.
    pub async fn serve_conn<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (r, w) = tokio::io::split(stream);
        let reader = FrameReader::new(r);
        self.serve_parts(reader, w).await;
    }

    async fn serve_parts<S>(&self, mut reader: FrameReader<ReadHalf<S>>, w: WriteHalf<S>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let opt = match reader.read_options().await {
            Err(e) => {
                error!("rpc server: options error: {}", e);
                return;
            }
            Ok(opt) => opt,
        };
        if opt.magic_number != MAGIC_NUMBER {
            error!("rpc server: invalid magic number {:#x}", opt.magic_number);
            return;
        }
        let codec = AnyCodec::new(opt.codec_type);
        self.serve_codec(reader, w, codec, opt.handle_timeout).await;
    }

    /// The dispatch loop proper.
    ///
    /// Reads frames sequentially and hands every well-formed request to a
    /// fresh task, so a slow method never blocks the connection. All
    /// responses funnel through one writer task, which keeps header+body
    /// pairs from interleaving on the wire. The writer exits (closing the
    /// connection) only after the read loop and every handler have dropped
    /// their senders, so in-flight requests always drain.
    async fn serve_codec<S>(
        &self, mut reader: FrameReader<ReadHalf<S>>, w: WriteHalf<S>, codec: AnyCodec,
        handle_timeout: Duration,
    ) where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<Response>();

        let writer_task = tokio::spawn(async move {
            let mut writer = FrameWriter::new(w);
            while let Some((header, body)) = resp_rx.recv().await {
                let head_buf = match codec.encode(&header) {
                    Ok(buf) => buf,
                    Err(e) => {
                        error!("rpc server: encode header error: {}", e);
                        continue;
                    }
                };
                // A write failure poisons the stream; keep draining so
                // handlers never block, the reader will hit the error too.
                if let Err(e) = writer.write_frame(&head_buf, &body).await {
                    error!("rpc server: write response error: {}", e);
                }
            }
            let _ = writer.shutdown().await;
        });

        loop {
            let head_buf = match reader.read_chunk().await {
                Err(e) => {
                    if !is_disconnect(&e) {
                        error!("rpc server: read header error: {}", e);
                    }
                    break;
                }
                Ok(buf) => buf,
            };
            let header: Header = match codec.decode(&head_buf) {
                Err(e) => {
                    error!("rpc server: decode header error: {}", e);
                    break;
                }
                Ok(h) => h,
            };
            // The body chunk is consumed unconditionally, so a dispatch
            // failure never desynchronizes the stream.
            let body = match reader.read_chunk().await {
                Err(e) => {
                    error!("rpc server: read body error: {}", e);
                    break;
                }
                Ok(buf) => buf,
            };
            trace!("rpc server: request {:?}", header);
            match self.find_service(&header.service_method) {
                Err(e) => {
                    let mut header = header;
                    header.error = e.to_string();
                    let _ = resp_tx.send((header, placeholder(codec)));
                }
                Ok((_svc, mtype)) => {
                    let tx = resp_tx.clone();
                    tokio::spawn(handle_request(mtype, codec, header, body, tx, handle_timeout));
                }
            }
        }
        drop(resp_tx);
        let _ = writer_task.await;
    }

    /// One HTTP-fronted connection. Only a CONNECT on the RPC path upgrades
    /// to the protocol; the debug path answers with the status page.
    async fn serve_http_conn(&self, stream: UnifyStream) {
        let (r, mut w) = tokio::io::split(stream);
        let mut reader = FrameReader::new(r);
        let request_line = match reader.read_http_head().await {
            Err(e) => {
                warn!("rpc server: http head error: {}", e);
                return;
            }
            Ok(line) => line,
        };
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();
        match (method, path) {
            ("CONNECT", DEFAULT_RPC_PATH) => {
                if let Err(e) = w.write_all(format!("{}\n\n", CONNECTED).as_bytes()).await {
                    warn!("rpc server: hijack reply error: {}", e);
                    return;
                }
                self.serve_parts(reader, w).await;
            }
            ("GET", DEFAULT_DEBUG_PATH) => {
                let body = debug::render(self);
                let resp = format!(
                    "HTTP/1.0 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = w.write_all(resp.as_bytes()).await;
                let _ = w.shutdown().await;
            }
            _ => {
                let body = "405 must CONNECT\n";
                let resp = format!(
                    "HTTP/1.0 405 Method Not Allowed\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = w.write_all(resp.as_bytes()).await;
                let _ = w.shutdown().await;
            }
        }
    }
}

/// Runs the method on its own task and races it against the handle
/// timeout. On expiry the response goes out immediately; the invocation
/// keeps running in the background and its eventual result lands in the
/// buffered oneshot, where it is discarded.
async fn handle_request(
    mtype: Arc<MethodType>, codec: AnyCodec, mut header: Header, body: Vec<u8>,
    tx: mpsc::UnboundedSender<Response>, handle_timeout: Duration,
) {
    let (done_tx, done_rx) = oneshot::channel::<Result<Vec<u8>, String>>();
    let fut = mtype.call(codec, body);
    tokio::spawn(async move {
        let _ = done_tx.send(fut.await);
    });

    let result = if handle_timeout.is_zero() {
        done_rx.await
    } else {
        match tokio::time::timeout(handle_timeout, done_rx).await {
            Ok(result) => result,
            Err(_) => {
                header.error = format!(
                    "rpc server: request handle timeout: expect within {:?}",
                    handle_timeout
                );
                let _ = tx.send((header, placeholder(codec)));
                return;
            }
        }
    };
    match result {
        Ok(Ok(reply)) => {
            let _ = tx.send((header, reply));
        }
        Ok(Err(err)) => {
            header.error = err;
            let _ = tx.send((header, placeholder(codec)));
        }
        // The invocation task can only vanish at runtime shutdown.
        Err(_) => {
            header.error = "rpc server: handler aborted".to_string();
            let _ = tx.send((header, placeholder(codec)));
        }
    }
}

/// The body accompanying an error response.
fn placeholder(codec: AnyCodec) -> Vec<u8> {
    codec.encode(&()).unwrap_or_default()
}

fn is_disconnect(e: &RpcError) -> bool {
    matches!(e, RpcError::Eof)
}

/// Registers `service` on the default server.
pub fn register(service: Service) -> Result<(), RpcError> {
    Server::default_global().register(service)
}

/// Binds `addr` on the default server and serves in the background.
pub async fn listen(addr: &str) -> io::Result<String> {
    Server::default_global().listen(addr).await
}
