//! # gee-rpc-core
//!
//! Core building blocks shared by the gee-rpc server, client and codec
//! crates:
//!
//! - [Options]: the per-connection preamble exchanged before any framed
//!   traffic, always encoded as one line of JSON.
//! - [Codec]: the pluggable serialization seam. Implementations live in
//!   [gee-rpc-codec](https://docs.rs/gee-rpc-codec).
//! - [proto]: the frame layer. Every request and every response is exactly
//!   one header chunk followed by one body chunk, both length-delimited and
//!   encoded with the connection's negotiated codec.
//! - [net]: tcp / unix-socket unification, so servers and clients accept a
//!   plain `host:port` or an absolute socket path interchangeably.

mod codec;
pub use codec::Codec;
mod config;
pub use config::{CodecType, Options, MAGIC_NUMBER};
pub mod error;
pub mod net;
pub mod proto;
