//! Binary codec

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Codec, guard_decode};
use crate::{ProtocolError, Result};

/// Compact binary encoding via `postcard`.
///
/// Not self-describing: both peers must agree on the exact types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        postcard::to_allocvec(value).map_err(|e| ProtocolError::encode("binary", e))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        guard_decode("binary", || {
            postcard::from_bytes(bytes).map_err(|e| ProtocolError::decode("binary", e))
        })
    }
}
