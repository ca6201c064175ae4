//! Error types for the batching protocol.
//!
//! Every failure the protocol can produce is a [`ProtocolError`]. Most of them
//! never escape [`Protocol::process_batch`](crate::Protocol::process_batch):
//! they are folded into an Error-typed [`PacketResult`](crate::PacketResult)
//! for the packet that caused them, and sibling packets keep going.
//!
//! ## Error Categories
//!
//! - **Envelope errors**: [`ProtocolError::Decode`] and [`ProtocolError::Encode`]
//! - **Lookup errors**: unknown handler slot or unknown action byte
//! - **Handler errors**: validation, unimplemented actions, handler bodies and
//!   broadcast responses that report their own failure
//! - **Context errors**: cancellation and deadlines
//! - **Setup errors**: registration and configuration
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use crudwire::ProtocolError;
//!
//! let error = ProtocolError::cancelled(3);
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Boxed source error carried by codec failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for protocol operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("decode error in {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("encode error in {context}: {source}")]
    Encode {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("no handler found for id: {handler_id} ({registered} registered)")]
    NoHandler { handler_id: u8, registered: usize },

    #[error("unknown action code {code:#04x} for handler id: {handler_id}")]
    UnknownAction { code: u8, handler_id: u8 },

    #[error("action '{action}' not implemented for handler {handler}")]
    NotImplemented { action: char, handler: String },

    #[error("validation failed for handler {handler}: {reason}")]
    Validation { handler: String, reason: String },

    #[error("call to handler id {handler_id} cancelled")]
    Cancelled { handler_id: u8 },

    #[error("deadline exceeded by {overrun:?} before calling handler id {handler_id}")]
    DeadlineExceeded { handler_id: u8, overrun: Duration },

    #[error("handler {handler} failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("response {index} from handler {handler} failed: {reason}")]
    Response { handler: String, index: usize, reason: String },

    #[error("handler registration failed: {reason}")]
    Registration { reason: String },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("{message}")]
    Remote { req_id: String, message: String },
}

impl ProtocolError {
    /// Returns whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProtocolError::Cancelled { .. } => true,
            ProtocolError::DeadlineExceeded { .. } => true,
            ProtocolError::Handler { .. } => true,
            ProtocolError::Remote { .. } => true,
            ProtocolError::Decode { .. } => false,
            ProtocolError::Encode { .. } => false,
            ProtocolError::NoHandler { .. } => false,
            ProtocolError::UnknownAction { .. } => false,
            ProtocolError::NotImplemented { .. } => false,
            ProtocolError::Validation { .. } => false,
            ProtocolError::Response { .. } => false,
            ProtocolError::Registration { .. } => false,
            ProtocolError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ProtocolError::Decode { .. } => vec![
                "Check that client and server use the same codec",
                "Verify the payload type matches the handler input type",
            ],
            ProtocolError::Encode { .. } => vec![
                "Check that the value is representable by the active codec",
                "Avoid non-string map keys with the JSON codec",
            ],
            ProtocolError::NoHandler { .. } => vec![
                "Register handlers in the same order on client and server",
                "Check the handler id used when building the packet",
            ],
            ProtocolError::UnknownAction { .. } => vec![
                "Use one of the action codes c, r, u or d",
                "Map transport verbs through Action::from_method",
            ],
            ProtocolError::NotImplemented { .. } => vec![
                "Bind the capability when building the registration",
                "Send the packet to a handler that supports the action",
            ],
            ProtocolError::Validation { .. } => vec![
                "Fix the rejected input and resend",
                "Check the handler's validation rules",
            ],
            ProtocolError::Cancelled { .. } => vec![
                "Resend the request with a live context",
                "Check why the caller cancelled the context",
            ],
            ProtocolError::DeadlineExceeded { .. } => {
                vec!["Extend the request deadline", "Send smaller batches"]
            }
            ProtocolError::Handler { .. } => vec![
                "Inspect the handler error source",
                "Retry once the handler's dependencies recover",
            ],
            ProtocolError::Response { .. } => vec![
                "Inspect the failing response in the handler",
                "Split independent deliverables into separate packets",
            ],
            ProtocolError::Registration { .. } => vec![
                "Raise max_handlers in the configuration",
                "Give every handler a non-empty name",
            ],
            ProtocolError::Config { .. } => vec![
                "Check the configuration file against the documented ranges",
                "Fall back to ProtocolConfig::default()",
            ],
            ProtocolError::Remote { .. } => vec![
                "Inspect the message returned by the peer",
                "Retry if the peer reported a transient failure",
            ],
        }
    }

    /// Helper constructor for decode errors.
    pub fn decode(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ProtocolError::Decode { context: context.into(), source: source.into() }
    }

    /// Helper constructor for encode errors.
    pub fn encode(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ProtocolError::Encode { context: context.into(), source: source.into() }
    }

    /// Helper constructor for handler lookup failures.
    pub fn no_handler(handler_id: u8, registered: usize) -> Self {
        ProtocolError::NoHandler { handler_id, registered }
    }

    /// Helper constructor for cancelled calls.
    pub fn cancelled(handler_id: u8) -> Self {
        ProtocolError::Cancelled { handler_id }
    }

    /// Helper constructor for validation failures.
    pub fn validation(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        ProtocolError::Validation { handler: handler.into(), reason: reason.into() }
    }

    /// Helper constructor for registration errors.
    pub fn registration(reason: impl Into<String>) -> Self {
        ProtocolError::Registration { reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        ProtocolError::Config { reason: reason.into() }
    }
}
