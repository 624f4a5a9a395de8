//! # gee-rpc
//!
//! A message-oriented RPC framework over stream transports (tcp, unix
//! sockets, and an HTTP CONNECT tunnel):
//!
//! - A [Server] exposes named methods of registered [Service]s and
//!   pipelines many in-flight requests per connection, with an optional
//!   per-call handle timeout.
//! - A [Client] multiplexes any number of concurrent calls over one
//!   connection, correlating responses by sequence number.
//! - An [XClient](xclient::XClient) fans calls out across a fleet found
//!   through a [Discovery](xclient::Discovery), with random / round-robin
//!   selection and first-success broadcast.
//! - A [Registry](registry::Registry) tracks live servers via heartbeats
//!   and hands the fleet to registry-backed discovery.
//!
//! Connections negotiate their payload codec (msgpack by default, json as
//! an alternative) in a one-line JSON preamble; see
//! [gee-rpc-core](https://docs.rs/gee-rpc-core) for the frame layout.
//!
//! ## Example
//!
//! ```no_run
//! use gee_rpc::{Client, Options, Server, Service};
//! use serde_derive::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Clone)]
//! struct Args { num1: i64, num2: i64 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new();
//!     server.register(Service::new("Foo").method("Sum", |args: Args| async move {
//!         Ok::<_, String>(args.num1 + args.num2)
//!     }))?;
//!     let addr = server.listen("127.0.0.1:0").await?;
//!
//!     let client = Client::dial(&addr, &Options::default()).await?;
//!     let sum: i64 = client.call("Foo.Sum", &Args { num1: 1, num2: 2 }).await?;
//!     assert_eq!(sum, 3);
//!     Ok(())
//! }
//! ```

mod client;
mod debug;
pub mod registry;
mod server;
mod service;
pub mod xclient;

pub use client::{AsyncStream, Call, Client};
pub use gee_rpc_codec::{AnyCodec, JsonCodec, MsgpCodec};
pub use gee_rpc_core::error::{DispatchError, RpcError};
pub use gee_rpc_core::{net, proto, Codec, CodecType, Options, MAGIC_NUMBER};
pub use server::{listen, register, Server, DEFAULT_DEBUG_PATH, DEFAULT_RPC_PATH};
pub use service::{MethodType, Service};
