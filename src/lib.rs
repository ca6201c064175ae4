//! Batched CRUD request-response protocol.
//!
//! Crudwire lets the same handler code answer operations sent from a client
//! and a server over a single request endpoint plus a push stream. Clients
//! queue operations in a [`Broker`] that consolidates and debounces them into
//! one [`BatchRequest`]; the server runs the batch through
//! [`Protocol::process_batch`] and answers with one [`PacketResult`] per
//! packet. Responses that name broadcast targets are also handed to a
//! [`ChannelSink`] for push delivery.
//!
//! # Features
//!
//! - **Positional handlers**: handler ids are registration slots, agreed on by both peers
//! - **Typed capabilities**: `Create`/`Read`/`Update`/`Delete` plus optional validators
//! - **Partial success**: one failing packet never aborts its batch
//! - **Pluggable codec**: JSON or compact binary, or your own [`Codec`]
//!
//! # Example
//!
//! ```rust
//! use crudwire::{
//!     Action, CallContext, Create, Handler, HandlerResult, Packet, Protocol, ProtocolConfig,
//!     Registration, Reply, Response,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User { id: u64, name: String }
//!
//! struct Users;
//!
//! impl Handler for Users {
//!     type Input = User;
//!     type Output = User;
//! }
//!
//! #[async_trait::async_trait]
//! impl Create for Users {
//!     async fn create(&self, _ctx: &CallContext, users: Vec<User>) -> HandlerResult<User> {
//!         Ok(Reply::Many(users.into_iter().map(|u| Response::new(User { id: 123, ..u })).collect()))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> crudwire::Result<()> {
//! let mut protocol = Protocol::new(ProtocolConfig::default())?;
//! protocol.register([Registration::new(Users).create().boxed()])?;
//!
//! let packet = Packet::new(Action::Create, 0, "r1")
//!     .with_data(vec![br#"{"id":0,"name":"Alice"}"#.to_vec()]);
//! let request = protocol.encode_batch(&[packet])?;
//!
//! let response = protocol.process_batch(&CallContext::new(), &request).await?;
//! let response = protocol.decode_response(&response)?;
//! assert_eq!(response.results[0].req_id, "r1");
//! assert!(!response.results[0].is_error());
//! # Ok(())
//! # }
//! ```

// Core types and error handling
pub mod codec;
pub mod config;
pub mod context;
mod error;
pub mod types;

// Handlers and dispatch
pub mod batch;
pub mod dispatcher;
pub mod handler;
mod protocol;
pub mod registry;

// Delivery
pub mod broker;
pub mod router;

#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

// Core exports
pub use codec::{BinaryCodec, Codec, CodecKind, ErasedPayload, JsonCodec, Payload, WireCodec};
pub use config::ProtocolConfig;
pub use context::CallContext;
pub use error::*;
pub use types::*;

// Handler exports
pub use handler::{
    BoundHandler, BoxedHandler, Create, Delete, Handler, HandlerResult, Read, Registration, Reply,
    Response, Update, Validate, ValidateItem,
};

// Main API exports
pub use batch::DECODE_ERROR_REQ_ID;
pub use broker::{Broker, FlushedBatch, QueuedPacket, WeakBroker};
pub use protocol::Protocol;
pub use router::{ChannelHub, ChannelMessage, ChannelSink, NullSink, ResultRouter, Subscription};
