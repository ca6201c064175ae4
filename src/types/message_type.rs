//! User-facing classification of a packet result

use serde::{Deserialize, Serialize};

/// Message classification carried by every [`PacketResult`](super::PacketResult).
///
/// Serialized as its byte value: 0=Normal, 1=Info, 2=Error, 3=Warning, 4=Success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MessageType {
    #[default]
    Normal = 0,
    Info = 1,
    Error = 2,
    Warning = 3,
    Success = 4,
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(MessageType::Normal),
            1 => Ok(MessageType::Info),
            2 => Ok(MessageType::Error),
            3 => Ok(MessageType::Warning),
            4 => Ok(MessageType::Success),
            other => Err(format!("invalid message type {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_values_are_stable() {
        assert_eq!(u8::from(MessageType::Normal), 0);
        assert_eq!(u8::from(MessageType::Info), 1);
        assert_eq!(u8::from(MessageType::Error), 2);
        assert_eq!(u8::from(MessageType::Warning), 3);
        assert_eq!(u8::from(MessageType::Success), 4);
        assert!(MessageType::try_from(5).is_err());
    }
}
