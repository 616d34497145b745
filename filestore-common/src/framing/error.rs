//! Frame-level errors

use std::io;

use thiserror::Error;

/// Errors raised while reading or writing frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Underlying I/O failure (message kept as text so the error stays `Clone`)
    #[error("I/O error: {0}")]
    Io(String),
    /// Peer closed the connection in the middle of a frame
    #[error("connection closed")]
    ConnectionClosed,
    #[error("invalid frame magic")]
    InvalidMagic,
    #[error("invalid message type length")]
    InvalidTypeLength,
    #[error("message type length has too many digits")]
    TypeLengthTooManyDigits,
    #[error("message type length out of range")]
    TypeLengthOutOfRange,
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("missing field delimiter")]
    MissingDelimiter,
    #[error("invalid message id")]
    InvalidMessageId,
    #[error("invalid payload length")]
    InvalidPayloadLength,
    #[error("payload length has too many digits")]
    PayloadLengthTooManyDigits,
    #[error("payload of {length} bytes exceeds {max} byte limit for {message_type}")]
    PayloadLengthExceedsTypeMax {
        message_type: String,
        length: u64,
        max: u64,
    },
    #[error("missing frame terminator")]
    MissingTerminator,
    /// Frame started but did not complete in time
    #[error("frame timeout")]
    FrameTimeout,
    /// Payload could not be decoded as the expected message
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe => Self::ConnectionClosed,
            _ => Self::Io(err.to_string()),
        }
    }
}
