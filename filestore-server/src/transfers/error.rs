//! Transfer error type

use std::io;

use thiserror::Error;

use filestore_common::ErrorKind;
use filestore_common::framing::FrameError;
use filestore_common::validators::FilenameError;

use crate::admission::AdmissionError;
use crate::context::Cancellation;
use crate::storage::StorageError;

/// Failure of a create, get or list call
///
/// Resources held by the call (permit, file handle, staging file) are
/// released before this error is returned.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid file name: {0}")]
    InvalidName(#[from] FilenameError),

    #[error("{0}")]
    Storage(#[source] StorageError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("call cancelled: {0}")]
    Cancelled(#[from] Cancellation),
}

impl TransferError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Machine-readable kind sent to the client
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Admission(_) => ErrorKind::Admission,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::Exists,
            Self::InvalidName(_) => ErrorKind::Invalid,
            Self::Storage(_) => ErrorKind::IoError,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Whether the connection must be closed after reporting this error
    ///
    /// Transport failures and cancellations can leave a partially read frame
    /// on the stream. Shutdown ends every connection.
    #[must_use]
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Cancelled(_)
                | Self::Admission(AdmissionError::Closed)
                | Self::Admission(AdmissionError::Cancelled(Cancellation::Shutdown))
        )
    }

    /// Whether the failure points at the server rather than the caller
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<StorageError> for TransferError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => Self::NotFound(name),
            StorageError::AlreadyExists(name) => Self::AlreadyExists(name),
            other @ StorageError::Io { .. } => Self::Storage(other),
        }
    }
}

impl From<FrameError> for TransferError {
    fn from(err: FrameError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
