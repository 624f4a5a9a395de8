//! # gee-rpc-codec
//!
//! [Codec] implementations for `gee-rpc`:
//!
//! - [MsgpCodec]: self-describing binary encoding, the default.
//! - [JsonCodec]: text encoding, convenient when inspecting traffic.
//! - [AnyCodec]: runtime dispatcher built from the [CodecType] tag a
//!   connection negotiated in its preamble.

pub use gee_rpc_core::{Codec, CodecType};
use gee_rpc_core::error::RpcError;
use serde::{Deserialize, Serialize};

mod json;
mod msgpack;
pub use json::JsonCodec;
pub use msgpack::MsgpCodec;

/// Dispatches to the codec a connection negotiated.
///
/// Both sides of a connection resolve the preamble's [CodecType] into one
/// of these; everything downstream (frame encode/decode, method
/// trampolines) takes it by value.
#[derive(Clone, Copy, Debug)]
pub enum AnyCodec {
    Msgp(MsgpCodec),
    Json(JsonCodec),
}

impl AnyCodec {
    pub fn new(t: CodecType) -> Self {
        match t {
            CodecType::Msgpack => Self::Msgp(MsgpCodec::default()),
            CodecType::Json => Self::Json(JsonCodec::default()),
        }
    }
}

impl Default for AnyCodec {
    fn default() -> Self {
        Self::Msgp(MsgpCodec::default())
    }
}

impl Codec for AnyCodec {
    #[inline(always)]
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, RpcError> {
        match self {
            Self::Msgp(c) => c.encode(msg),
            Self::Json(c) => c.encode(msg),
        }
    }

    #[inline(always)]
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, RpcError> {
        match self {
            Self::Msgp(c) => c.decode(buf),
            Self::Json(c) => c.decode(buf),
        }
    }
}
