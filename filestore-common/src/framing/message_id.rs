//! Message identifiers for request/response correlation

use std::fmt;

use super::MSG_ID_LENGTH;
use super::error::FrameError;

/// A 12-character lowercase hex identifier carried by every frame
///
/// Responses echo the identifier of the request they answer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; MSG_ID_LENGTH]);

impl MessageId {
    /// Generate a fresh random message ID
    #[must_use]
    pub fn new() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let hex = uuid.simple().to_string();
        let mut bytes = [0u8; MSG_ID_LENGTH];
        bytes.copy_from_slice(&hex.as_bytes()[..MSG_ID_LENGTH]);
        Self(bytes)
    }

    /// Parse a message ID from its wire bytes
    ///
    /// # Errors
    ///
    /// Returns `FrameError::InvalidMessageId` unless the input is exactly
    /// 12 hex digits.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != MSG_ID_LENGTH || !bytes.iter().all(u8::is_ascii_hexdigit) {
            return Err(FrameError::InvalidMessageId);
        }
        let mut id = [0u8; MSG_ID_LENGTH];
        for (dst, src) in id.iter_mut().zip(bytes) {
            *dst = src.to_ascii_lowercase();
        }
        Ok(Self(id))
    }

    /// Wire representation
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; MSG_ID_LENGTH] {
        &self.0
    }

    fn as_str(&self) -> &str {
        // Constructed only from ASCII hex digits
        std::str::from_utf8(&self.0).unwrap_or("????????????")
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.as_str())
    }
}
