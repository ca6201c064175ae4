//! JSON codec

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Codec, guard_decode};
use crate::{ProtocolError, Result};

/// Compact JSON encoding via `serde_json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::encode("json", e))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        guard_decode("json", || {
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::decode("json", e))
        })
    }
}
