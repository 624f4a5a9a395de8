use gee_rpc_core::error::RpcError;
use gee_rpc_core::Codec;
use serde::{Deserialize, Serialize};

/// MessagePack codec, encoding structs as named maps so either side can
/// evolve fields the way the json codec allows.
#[derive(Default, Clone, Copy, Debug)]
pub struct MsgpCodec();

impl Codec for MsgpCodec {
    #[inline(always)]
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, RpcError> {
        match rmp_serde::encode::to_vec_named(msg) {
            Ok(buf) => Ok(buf),
            Err(e) => {
                log::error!("msgpack encode error: {:?}", e);
                Err(RpcError::Encode(e.to_string()))
            }
        }
    }

    #[inline(always)]
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, RpcError> {
        match rmp_serde::decode::from_slice::<T>(buf) {
            Ok(msg) => Ok(msg),
            Err(e) => {
                log::warn!("msgpack decode error: {:?}", e);
                Err(RpcError::Decode(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_derive::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    #[test]
    fn test_msgp() {
        let codec = MsgpCodec::default();
        let encoded = codec.encode(&()).expect("encode");
        let _decoded: () = codec.decode(&encoded).expect("decode");

        let encoded = codec.encode(&Args { num1: 3, num2: 4 }).expect("encode");
        let decoded: Args = codec.decode(&encoded).expect("decode");
        assert_eq!(decoded, Args { num1: 3, num2: 4 });
        assert!(codec.decode::<String>(&encoded).is_err());
    }
}
