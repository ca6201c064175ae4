//! Packet and batch envelope types

use serde::{Deserialize, Serialize};

use super::{Action, MessageType};

/// One logical CRUD operation.
///
/// `data` holds one independently encoded buffer per argument, so a single
/// packet can carry N records for the same handler and action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Raw action byte (`c`, `r`, `u`, `d`)
    pub action: u8,

    /// Positional handler slot assigned at registration
    pub handler_id: u8,

    /// Caller correlation token; empty for fire-and-forget
    pub req_id: String,

    /// Encoded arguments
    pub data: Vec<Vec<u8>>,
}

impl Packet {
    /// Create a packet for a known action.
    pub fn new(action: Action, handler_id: u8, req_id: impl Into<String>) -> Self {
        Self { action: action.code(), handler_id, req_id: req_id.into(), data: Vec::new() }
    }

    /// Attach encoded arguments.
    pub fn with_data(mut self, data: Vec<Vec<u8>>) -> Self {
        self.data = data;
        self
    }

    /// Parsed action, if the byte is one of the four known codes.
    pub fn parsed_action(&self) -> Option<Action> {
        Action::from_code(self.action)
    }
}

/// Ordered packets sent as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub packets: Vec<Packet>,
}

/// Outcome of one packet.
///
/// Carries the identity of the originating packet so the receiver can
/// correlate by `req_id` regardless of position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketResult {
    pub action: u8,
    pub handler_id: u8,
    pub req_id: String,
    pub message_type: MessageType,
    pub message: String,

    /// Encoded outputs: none, one, or one per independent response
    pub data: Vec<Vec<u8>>,
}

impl PacketResult {
    /// Start a result that mirrors the identity of `packet`.
    pub fn for_packet(packet: &Packet) -> Self {
        Self {
            action: packet.action,
            handler_id: packet.handler_id,
            req_id: packet.req_id.clone(),
            ..Self::default()
        }
    }

    /// Mark this result successful with the given outputs.
    pub fn succeed(&mut self, data: Vec<Vec<u8>>) {
        self.message_type = MessageType::Success;
        self.message = PacketResult::OK.to_string();
        self.data = data;
    }

    /// Mark this result failed. Output data is discarded.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.message_type = MessageType::Error;
        self.message = message.into();
        self.data.clear();
    }

    /// Message used for every successful result.
    pub const OK: &'static str = "OK";

    /// Whether this result reports an error.
    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error
    }
}

/// Ordered results sent back as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<PacketResult>,
}

impl BatchResponse {
    /// Find a result by correlation token.
    pub fn by_req_id(&self, req_id: &str) -> Option<&PacketResult> {
        self.results.iter().find(|result| result.req_id == req_id)
    }
}

/// Borrowed view of a batch request, serialized exactly like [`BatchRequest`].
///
/// Lets the broker encode its queue without cloning every packet.
#[derive(Serialize)]
pub(crate) struct BatchRequestRef<'a> {
    pub packets: Vec<&'a Packet>,
}
