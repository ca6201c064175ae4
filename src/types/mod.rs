//! Wire types shared by both peers.
//!
//! ## Envelopes
//!
//! - [`Packet`] is one CRUD operation addressed to a handler slot
//! - [`BatchRequest`] is the unit sent from client to server
//! - [`PacketResult`] is the outcome of one packet, correlated by `req_id`
//! - [`BatchResponse`] is the unit sent back, one result per packet
//!
//! Field encoding is delegated to the active [`Codec`](crate::Codec); these
//! types only fix the shape.

mod action;
mod message_type;
mod packet;

pub use action::{Action, action_code_to_method, method_to_action_code};
pub use message_type::MessageType;
pub use packet::{BatchRequest, BatchResponse, Packet, PacketResult};

pub(crate) use packet::BatchRequestRef;
