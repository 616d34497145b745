//! Protocol definitions for filestore
//!
//! Control messages are JSON objects tagged with `"type"`, one per frame.
//! File contents never travel inside these messages; they follow as raw
//! `FileData` frames (see [`crate::framing::FILE_DATA_TYPE`]).
//!
//! ## Calls
//!
//! - **Create**: `Create` → `FileData`* → `CreateEnd`, answered by
//!   `CreateResponse` or `Error`.
//! - **Get**: `Get`, answered by `FileData`* → `GetComplete`, or by `Error`.
//!   A missing file fails before any `FileData` is sent.
//! - **List**: `List`, answered by `ListResponse` or `Error`.

use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Client request messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Open an upload stream for `filename`
    Create {
        filename: String,
        /// Client-side deadline for the whole call, in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deadline_ms: Option<u64>,
    },
    /// Clean end of an upload stream
    CreateEnd,
    /// Download a stored file
    Get {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deadline_ms: Option<u64>,
    },
    /// List all stored files
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deadline_ms: Option<u64>,
    },
}

/// Server response messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Upload stored under `filename`
    CreateResponse { filename: String },
    /// Download finished; `size` bytes were sent in preceding `FileData` frames
    GetComplete { size: u64 },
    /// All stored files, in directory order
    ListResponse { files: Vec<FileInfo> },
    /// Terminal failure of the call
    Error { kind: ErrorKind, message: String },
}

/// Listing entry for a stored file
///
/// Timestamps are RFC3339 strings (e.g. `2024-05-01T10:00:00Z`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ClientMessage {
    /// Wire message type for this message
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "Create",
            Self::CreateEnd => "CreateEnd",
            Self::Get { .. } => "Get",
            Self::List { .. } => "List",
        }
    }

    /// Deadline requested by the client, if any
    #[must_use]
    pub fn deadline_ms(&self) -> Option<u64> {
        match self {
            Self::Create { deadline_ms, .. }
            | Self::Get { deadline_ms, .. }
            | Self::List { deadline_ms } => *deadline_ms,
            Self::CreateEnd => None,
        }
    }
}

impl ServerMessage {
    /// Wire message type for this message
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::CreateResponse { .. } => "CreateResponse",
            Self::GetComplete { .. } => "GetComplete",
            Self::ListResponse { .. } => "ListResponse",
            Self::Error { .. } => "Error",
        }
    }
}
