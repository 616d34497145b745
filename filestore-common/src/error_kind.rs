//! Machine-readable error kinds
//!
//! These kinds are serialized to strings in `Error` messages, allowing
//! clients to decide whether a failed call is worth retrying.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No permit could be acquired before the call was cancelled
    ///
    /// Transient. Clients may retry with backoff.
    Admission,

    /// Requested file does not exist
    NotFound,

    /// Upload target name is already taken
    ///
    /// Nothing was written; the existing file is untouched.
    Exists,

    /// The storage directory misbehaved (permissions, disk, etc.)
    IoError,

    /// A frame could not be sent or received, or arrived out of sequence
    Transport,

    /// The request was malformed (e.g. an unusable file name)
    Invalid,

    /// The call's deadline passed or the server is shutting down
    Cancelled,
}

impl ErrorKind {
    /// Convert to the string representation used in protocol messages
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::NotFound => "not_found",
            Self::Exists => "exists",
            Self::IoError => "io_error",
            Self::Transport => "transport",
            Self::Invalid => "invalid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from string (for client-side handling)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admission" => Some(Self::Admission),
            "not_found" => Some(Self::NotFound),
            "exists" => Some(Self::Exists),
            "io_error" => Some(Self::IoError),
            "transport" => Some(Self::Transport),
            "invalid" => Some(Self::Invalid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a client may reasonably retry the same call later
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Admission | Self::Cancelled | Self::Transport)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
