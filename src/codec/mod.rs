//! Pluggable encode/decode contract.
//!
//! The same [`Codec`] encodes the batch envelopes and the user payloads they
//! carry. Two implementations ship with the crate:
//!
//! - [`JsonCodec`]: compact JSON via `serde_json` (the default)
//! - [`BinaryCodec`]: compact binary via `postcard`
//!
//! [`WireCodec`] picks one of them from [`CodecKind`] at runtime, which is what
//! [`ProtocolConfig`](crate::ProtocolConfig) selects.
//!
//! Decoding never panics through to the caller: every decode runs behind
//! [`guard_decode`], which turns a panic raised inside a `Deserialize` impl
//! into [`ProtocolError::Decode`].
//!
//! ```rust
//! use crudwire::{Codec, JsonCodec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct User { name: String }
//!
//! let codec = JsonCodec;
//! let bytes = codec.encode(&User { name: "Alice".into() }).unwrap();
//! let user: User = codec.decode(&bytes).unwrap();
//! assert_eq!(user.name, "Alice");
//! ```

mod binary;
mod json;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::{ProtocolError, Result};

pub use binary::BinaryCodec;
pub use json::JsonCodec;

/// Encode/decode contract for envelopes and payloads.
///
/// Implementations must be safe to share between concurrent batch
/// invocations.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Encode any serializable value.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes into a fresh value of type `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// A value that can be encoded by codec `C` without knowing its concrete type.
///
/// Blanket-implemented for every `Serialize + Send` type. Handler outputs are
/// erased to this trait so the dispatcher can hand back one result type for
/// every registered handler.
pub trait Payload<C: Codec>: Send {
    /// Encode this value with `codec`.
    fn encode_with(&self, codec: &C) -> Result<Vec<u8>>;
}

impl<C: Codec, T: Serialize + Send> Payload<C> for T {
    fn encode_with(&self, codec: &C) -> Result<Vec<u8>> {
        codec.encode(self)
    }
}

/// Type-erased handler output.
pub type ErasedPayload<C> = Box<dyn Payload<C>>;

/// Codec selection for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Json,
    Binary,
}

/// Codec chosen at runtime from a [`CodecKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCodec {
    Json(JsonCodec),
    Binary(BinaryCodec),
}

impl WireCodec {
    /// Build the codec named by `kind`.
    pub fn from_kind(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Json => WireCodec::Json(JsonCodec),
            CodecKind::Binary => WireCodec::Binary(BinaryCodec),
        }
    }

    /// Which kind this codec is.
    pub fn kind(&self) -> CodecKind {
        match self {
            WireCodec::Json(_) => CodecKind::Json,
            WireCodec::Binary(_) => CodecKind::Binary,
        }
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        WireCodec::from_kind(CodecKind::default())
    }
}

impl Codec for WireCodec {
    fn name(&self) -> &'static str {
        match self {
            WireCodec::Json(codec) => codec.name(),
            WireCodec::Binary(codec) => codec.name(),
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            WireCodec::Json(codec) => codec.encode(value),
            WireCodec::Binary(codec) => codec.encode(value),
        }
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            WireCodec::Json(codec) => codec.decode(bytes),
            WireCodec::Binary(codec) => codec.decode(bytes),
        }
    }
}

/// Run a decode closure, converting a panic into [`ProtocolError::Decode`].
pub fn guard_decode<T>(context: &str, decode: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(decode)) {
        Ok(result) => result,
        Err(panic) => Err(ProtocolError::decode(
            context,
            format!("panic in decode: {}", panic_message(panic.as_ref())),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
