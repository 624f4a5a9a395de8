use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Every connection opens with this constant; anything else is not speaking
/// our protocol and is dropped without a response.
pub const MAGIC_NUMBER: u64 = 0x3bef5c;

/// Wire tag selecting the codec used for all frames on a connection.
///
/// The preamble carries the tag as a string; an unrecognized tag fails the
/// preamble decode, which the server treats as a protocol error.
#[derive(strum::Display, strum::EnumString, strum::AsRefStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// Self-describing binary encoding, the default.
    #[strum(serialize = "application/msgpack")]
    Msgpack,
    #[strum(serialize = "application/json")]
    Json,
}

impl serde::Serialize for CodecType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl<'de> serde::Deserialize<'de> for CodecType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        Self::from_str(&s)
            .map_err(|_| serde::de::Error::custom(format!("invalid codec type {}", s)))
    }
}

/// The connection preamble.
///
/// Sent exactly once by the client, as a single line of JSON, before any
/// framed traffic. Field names are fixed by the wire protocol, durations
/// travel as nanoseconds.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Options {
    pub magic_number: u64,
    pub codec_type: CodecType,
    /// Zero means the dial never times out.
    #[serde(with = "duration_nanos")]
    pub connect_timeout: Duration,
    /// Budget for one method invocation on the server. Zero means unlimited.
    #[serde(with = "duration_nanos")]
    pub handle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: CodecType::Msgpack,
            connect_timeout: Duration::from_secs(10),
            handle_timeout: Duration::ZERO,
        }
    }
}

mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
