//! Raw frame representation

use super::message_id::MessageId;
use super::{DELIMITER, MAGIC, TERMINATOR};

/// A complete frame as read from or written to the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub message_id: MessageId,
    pub message_type: String,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(message_id: MessageId, message_type: String, payload: Vec<u8>) -> Self {
        Self {
            message_id,
            message_type,
            payload,
        }
    }

    /// Serialize the frame into its wire representation
    pub fn to_bytes(&self) -> Vec<u8> {
        let type_len = self.message_type.len().to_string();
        let payload_len = self.payload.len().to_string();

        let mut bytes = Vec::with_capacity(
            MAGIC.len()
                + type_len.len()
                + self.message_type.len()
                + self.message_id.as_bytes().len()
                + payload_len.len()
                + self.payload.len()
                + 5,
        );
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(type_len.as_bytes());
        bytes.push(DELIMITER);
        bytes.extend_from_slice(self.message_type.as_bytes());
        bytes.push(DELIMITER);
        bytes.extend_from_slice(self.message_id.as_bytes());
        bytes.push(DELIMITER);
        bytes.extend_from_slice(payload_len.as_bytes());
        bytes.push(DELIMITER);
        bytes.extend_from_slice(&self.payload);
        bytes.push(TERMINATOR);
        bytes
    }
}
