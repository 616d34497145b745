//! Wire framing for the filestore protocol
//!
//! Every message travels as a single frame:
//!
//! ```text
//! FS|<type_len>|<type>|<msg_id>|<payload_len>|<payload>\n
//! ```
//!
//! Control messages carry a JSON payload. `FileData` frames carry raw file
//! bytes, so uploads and downloads never pay for base64 or JSON escaping.

mod error;
mod frame;
mod limits;
mod message_id;
mod reader;
mod writer;

pub use error::FrameError;
pub use frame::RawFrame;
pub use limits::{
    CONTROL_PAYLOAD_LIMIT, FILE_DATA_TYPE, is_known_message_type, max_payload_for_type,
};
pub use message_id::MessageId;
pub use reader::{DEFAULT_FRAME_TIMEOUT, DEFAULT_PROGRESS_TIMEOUT, FrameReader};
pub use writer::FrameWriter;

/// Frame preamble, including the first delimiter
pub const MAGIC: &[u8; 3] = b"FS|";

/// Field delimiter
pub const DELIMITER: u8 = b'|';

/// Frame terminator
pub const TERMINATOR: u8 = b'\n';

/// Length of a message ID in bytes (hex characters)
pub const MSG_ID_LENGTH: usize = 12;

/// Longest message type name accepted
pub const MAX_TYPE_LENGTH: usize = 32;

/// Digits needed to express `MAX_TYPE_LENGTH`
pub const MAX_TYPE_LENGTH_DIGITS: usize = 2;

/// Global sanity cap on any payload (64 MiB)
pub const MAX_PAYLOAD_LENGTH: u64 = 64 * 1024 * 1024;

/// Digits needed to express `MAX_PAYLOAD_LENGTH`
pub const MAX_PAYLOAD_LENGTH_DIGITS: usize = 8;
