//! Per-type payload limits for protocol messages

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::MAX_CHUNK_SIZE;

use super::MAX_PAYLOAD_LENGTH;

/// Message type used for raw file bytes in both directions
pub const FILE_DATA_TYPE: &str = "FileData";

/// Upper bound for JSON control messages (64 KiB)
///
/// The largest legitimate control message is an `Error` response or a
/// request carrying a 255-byte file name, both far below this.
pub const CONTROL_PAYLOAD_LIMIT: u64 = 64 * 1024;

/// Maximum payload sizes for each message type
///
/// Limits are enforced after parsing the frame header but before reading the
/// payload, so oversized frames are rejected without buffering them.
///
/// A limit of `0` means "no per-type limit". Only `ListResponse` uses it,
/// since its size grows with the number of stored files; the global
/// `MAX_PAYLOAD_LENGTH` cap still applies.
static MESSAGE_TYPE_LIMITS: LazyLock<HashMap<&'static str, u64>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // Client messages
    m.insert("Create", CONTROL_PAYLOAD_LIMIT);
    m.insert("CreateEnd", CONTROL_PAYLOAD_LIMIT);
    m.insert("Get", CONTROL_PAYLOAD_LIMIT);
    m.insert("List", CONTROL_PAYLOAD_LIMIT);

    // Server messages
    m.insert("CreateResponse", CONTROL_PAYLOAD_LIMIT);
    m.insert("GetComplete", CONTROL_PAYLOAD_LIMIT);
    m.insert("ListResponse", 0);
    m.insert("Error", CONTROL_PAYLOAD_LIMIT);

    // Shared by uploads and downloads
    m.insert(FILE_DATA_TYPE, MAX_CHUNK_SIZE as u64);

    m
});

/// Get the maximum payload size for a message type
///
/// Unknown types fall back to the global cap; the reader rejects them
/// before asking.
#[must_use]
pub fn max_payload_for_type(message_type: &str) -> u64 {
    match MESSAGE_TYPE_LIMITS.get(message_type).copied() {
        Some(0) | None => MAX_PAYLOAD_LENGTH,
        Some(limit) => limit,
    }
}

/// Check if a message type is known
#[must_use]
pub fn is_known_message_type(message_type: &str) -> bool {
    MESSAGE_TYPE_LIMITS.contains_key(message_type)
}
