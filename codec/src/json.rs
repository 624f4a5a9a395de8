use gee_rpc_core::error::RpcError;
use gee_rpc_core::Codec;
use serde::{Deserialize, Serialize};

#[derive(Default, Clone, Copy, Debug)]
pub struct JsonCodec();

impl Codec for JsonCodec {
    #[inline(always)]
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, RpcError> {
        match serde_json::to_vec(msg) {
            Ok(buf) => Ok(buf),
            Err(e) => {
                log::error!("json encode error: {:?}", e);
                Err(RpcError::Encode(e.to_string()))
            }
        }
    }

    #[inline(always)]
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, RpcError> {
        match serde_json::from_slice::<T>(buf) {
            Ok(msg) => Ok(msg),
            Err(e) => {
                log::warn!("json decode error: {:?}", e);
                Err(RpcError::Decode(e.to_string()))
            }
        }
    }
}
