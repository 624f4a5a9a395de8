use crate::error::RpcError;
use serde::{Deserialize, Serialize};

/// Interface for the payload codecs in
/// [gee-rpc-codec](https://docs.rs/gee-rpc-codec).
///
/// A codec turns one header or one body into a byte chunk and back; the
/// frame layer owns the lengths and the stream. Implementations must be
/// stateless or internally synchronized, because the read and write sides
/// of a connection use the same instance concurrently.
pub trait Codec: Default + Send + Sync + 'static {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, RpcError>;

    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, RpcError>;
}
