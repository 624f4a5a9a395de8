//! The client side: one multiplexed connection.
//!
//! A [Client] pipelines any number of concurrent calls over a single
//! stream. Requests get a monotonically increasing sequence number and a
//! slot in the pending table; a background receive task correlates
//! responses by seq and completes each call's oneshot exactly once,
//! whether by matching response, transport failure, or local cancellation
//! (dropping the unresolved [Call] future).

use gee_rpc_codec::AnyCodec;
use gee_rpc_core::error::RpcError;
use gee_rpc_core::net::{UnifyAddr, UnifyStream};
use gee_rpc_core::proto::{FrameReader, FrameWriter, Header};
use gee_rpc_core::{Codec, Options};
use log::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;

use crate::server::{CONNECTED, DEFAULT_RPC_PATH};

/// Type-erased connection, so tcp, unix and test streams share one client.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

type BoxStream = Box<dyn AsyncStream>;
type CallSlot = oneshot::Sender<Result<Vec<u8>, RpcError>>;

struct ClientState {
    seq: u64,
    pending: HashMap<u64, CallSlot>,
    /// set by user close
    closing: bool,
    /// set when the receive side dies
    shutdown: bool,
}

struct ClientInner {
    codec: AnyCodec,
    /// The send mutex: holds the write half, so concurrent senders queue
    /// FIFO and a frame is never interleaved with another.
    writer: tokio::sync::Mutex<FrameWriter<tokio::io::WriteHalf<BoxStream>>>,
    /// The state mutex: seq assignment, the pending table, and the two
    /// one-way flags. When both are needed, the send mutex comes first.
    state: Mutex<ClientState>,
}

/// A connection-level RPC client. Cheap to clone; clones share the
/// connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Performs the preamble handshake on an established stream and starts
    /// the receive task. Fails (and hangs up) if the preamble cannot be
    /// written.
    pub async fn new<S: AsyncStream + 'static>(stream: S, opt: &Options) -> Result<Self, RpcError> {
        let codec = AnyCodec::new(opt.codec_type);
        let (r, w) = tokio::io::split(Box::new(stream) as BoxStream);
        let mut writer = FrameWriter::new(w);
        if let Err(e) = writer.write_options(opt).await {
            error!("rpc client: options error: {}", e);
            let _ = writer.shutdown().await;
            return Err(e);
        }
        let inner = Arc::new(ClientInner {
            codec,
            writer: tokio::sync::Mutex::new(writer),
            state: Mutex::new(ClientState {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
        });
        let recv_inner = inner.clone();
        tokio::spawn(async move { recv_inner.receive(FrameReader::new(r)).await });
        Ok(Self { inner })
    }

    /// Connects to `addr` (tcp `host:port`, or a unix socket path) and
    /// handshakes. The whole dial phase races `opt.connect_timeout` when it
    /// is non-zero.
    pub async fn dial(addr: &str, opt: &Options) -> Result<Self, RpcError> {
        let uaddr: UnifyAddr = addr.parse().map_err(RpcError::from)?;
        let connect = async {
            let stream = UnifyStream::connect(&uaddr).await?;
            Self::new(stream, opt).await
        };
        if opt.connect_timeout.is_zero() {
            return connect.await;
        }
        match tokio::time::timeout(opt.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Io(format!(
                "connect timeout: expect within {:?}",
                opt.connect_timeout
            ))),
        }
    }

    /// Connects through the server's HTTP CONNECT tunnel, then switches to
    /// the RPC protocol.
    pub async fn dial_http(addr: &str, opt: &Options) -> Result<Self, RpcError> {
        let uaddr: UnifyAddr = addr.parse().map_err(RpcError::from)?;
        let connect = async {
            let stream = UnifyStream::connect(&uaddr).await?;
            let mut stream = BufReader::new(stream);
            stream
                .write_all(format!("CONNECT {} HTTP/1.0\n\n", DEFAULT_RPC_PATH).as_bytes())
                .await?;
            stream.flush().await?;
            let mut status = String::new();
            stream.read_line(&mut status).await?;
            if status.trim_end() != CONNECTED {
                return Err(RpcError::HttpResponse(status.trim_end().to_string()));
            }
            let mut blank = String::new();
            stream.read_line(&mut blank).await?;
            Self::new(stream, opt).await
        };
        if opt.connect_timeout.is_zero() {
            return connect.await;
        }
        match tokio::time::timeout(opt.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Io(format!(
                "connect timeout: expect within {:?}",
                opt.connect_timeout
            ))),
        }
    }

    /// Dials a `protocol@addr` URI: `http@host:port` goes through the
    /// CONNECT tunnel, `tcp@host:port` and `unix@/path` dial plain.
    pub async fn xdial(rpc_addr: &str, opt: &Options) -> Result<Self, RpcError> {
        let Some((protocol, addr)) = rpc_addr.split_once('@') else {
            return Err(RpcError::AddrFormat(rpc_addr.to_string()));
        };
        match protocol {
            "http" => Self::dial_http(addr, opt).await,
            "tcp" | "unix" => Self::dial(addr, opt).await,
            other => Err(RpcError::Protocol(format!("unsupported protocol {:?}", other))),
        }
    }

    /// False once the user has closed the client or the transport has
    /// failed.
    pub fn is_available(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        !state.closing && !state.shutdown
    }

    /// Closes the connection. Closing twice returns the shutdown sentinel.
    pub async fn close(&self) -> Result<(), RpcError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
        }
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }

    /// Starts a call and returns a [Call] future resolving to its outcome.
    /// The request is on the wire (or the error is known) when this
    /// returns; awaiting the `Call` only waits for the response.
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> Result<Call<R>, RpcError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let body = self.inner.codec.encode(args)?;
        let (seq, rx) = self.inner.send(service_method, body).await?;
        Ok(Call {
            seq,
            rx,
            codec: self.inner.codec,
            client: self.inner.clone(),
            completed: false,
            _reply: PhantomData,
        })
    }

    /// One round trip. Cancel-safe: dropping the returned future (for
    /// example from inside `tokio::time::timeout`) withdraws the pending
    /// call, and a late response is drained without effect.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R, RpcError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.go(service_method, args).await?.await
    }
}

impl ClientInner {
    /// The send path. The writer lock is taken first and held across the
    /// whole frame write; registration happens under the state lock inside
    /// it.
    async fn send(
        &self, service_method: &str, body: Vec<u8>,
    ) -> Result<(u64, oneshot::Receiver<Result<Vec<u8>, RpcError>>), RpcError> {
        let mut writer = self.writer.lock().await;
        let (seq, rx) = {
            let mut state = self.state.lock().unwrap();
            if state.closing || state.shutdown {
                return Err(RpcError::Shutdown);
            }
            let seq = state.seq;
            state.seq += 1;
            let (tx, rx) = oneshot::channel();
            state.pending.insert(seq, tx);
            (seq, rx)
        };
        let header = Header {
            service_method: service_method.to_string(),
            seq,
            error: String::new(),
        };
        let result = async {
            let head_buf = self.codec.encode(&header)?;
            writer.write_frame(&head_buf, &body).await
        }
        .await;
        if let Err(e) = result {
            // The receive task may have completed the call concurrently;
            // only fail it if the slot is still ours.
            self.state.lock().unwrap().pending.remove(&seq);
            return Err(e);
        }
        Ok((seq, rx))
    }

    /// The receive task: the single reader of this connection. Runs until
    /// any read error, then fails every pending call with that error.
    async fn receive(self: Arc<Self>, mut reader: FrameReader<tokio::io::ReadHalf<BoxStream>>) {
        let err = loop {
            let head_buf = match reader.read_chunk().await {
                Err(e) => break e,
                Ok(buf) => buf,
            };
            let header: Header = match self.codec.decode(&head_buf) {
                Err(e) => break e,
                Ok(h) => h,
            };
            // Body bytes are always consumed; without a pending entry
            // (call cancelled, or never fully sent) they are dropped here.
            let body = match reader.read_chunk().await {
                Err(e) => break e,
                Ok(buf) => buf,
            };
            let slot = self.state.lock().unwrap().pending.remove(&header.seq);
            match slot {
                None => {
                    trace!("rpc client: discard response for seq {}", header.seq);
                }
                Some(tx) => {
                    if header.error.is_empty() {
                        let _ = tx.send(Ok(body));
                    } else {
                        let _ = tx.send(Err(RpcError::Server(header.error)));
                    }
                }
            }
        };
        if !matches!(err, RpcError::Eof) {
            warn!("rpc client: receive error: {}", err);
        }
        self.terminate_calls(err).await;
    }

    /// Transport failure: flip to shutdown and deliver the error to every
    /// pending call. Takes the send mutex first so no sender is mid-frame
    /// while the table drains.
    async fn terminate_calls(&self, err: RpcError) {
        let _writer = self.writer.lock().await;
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        for (_, tx) in state.pending.drain() {
            let _ = tx.send(Err(err.clone()));
        }
    }
}

/// One in-flight call. Resolves to the typed reply or the call's error;
/// dropping it unresolved cancels the call locally.
pub struct Call<R> {
    seq: u64,
    rx: oneshot::Receiver<Result<Vec<u8>, RpcError>>,
    codec: AnyCodec,
    client: Arc<ClientInner>,
    completed: bool,
    _reply: PhantomData<fn() -> R>,
}

impl<R> Call<R> {
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl<R: DeserializeOwned> Future for Call<R> {
    type Output = Result<R, RpcError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let call = self.get_mut();
        match Pin::new(&mut call.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                call.completed = true;
                match result {
                    Ok(Ok(body)) => Poll::Ready(call.codec.decode::<R>(&body)),
                    Ok(Err(e)) => Poll::Ready(Err(e)),
                    // Sender dropped without completing: the client was
                    // torn down under us.
                    Err(_) => Poll::Ready(Err(RpcError::Shutdown)),
                }
            }
        }
    }
}

impl<R> Drop for Call<R> {
    fn drop(&mut self) {
        if !self.completed {
            self.client.state.lock().unwrap().pending.remove(&self.seq);
        }
    }
}
