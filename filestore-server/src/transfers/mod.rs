//! Transfer engine: upload, download and list state machines
//!
//! Each call holds a permit of its kind from the admission controller for
//! as long as it touches the filesystem. Handlers return
//! [`TransferError`] and never write error frames; reporting is left to
//! the connection layer.

mod download;
mod error;
mod list;
pub mod session;
mod upload;

use std::time::Duration;

use filestore_common::DEFAULT_CHUNK_SIZE;
use filestore_common::framing::{DEFAULT_FRAME_TIMEOUT, DEFAULT_PROGRESS_TIMEOUT};

pub use error::TransferError;

pub(crate) use download::handle_get;
pub(crate) use list::handle_list;
pub(crate) use upload::{UploadStream, handle_create};

/// Streaming parameters shared by all calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Size of each download `FileData` frame
    pub chunk_size: usize,
    /// Time allowed to finish a frame once its first byte arrives
    pub frame_timeout: Duration,
    /// Time allowed between upload frames
    pub progress_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            progress_timeout: DEFAULT_PROGRESS_TIMEOUT,
        }
    }
}
