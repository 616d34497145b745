//! Filestore Common Library
//!
//! Wire framing, protocol messages, and validation shared by the filestore
//! server and its clients.

mod error_kind;
pub mod framing;
pub mod io;
pub mod protocol;
pub mod validators;

pub use error_kind::ErrorKind;

/// Default storage root directory (relative to the working directory)
pub const DEFAULT_STORAGE_PATH: &str = "binary_files";

/// Default size of download chunks in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Largest chunk a single `FileData` frame may carry (1 MiB)
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;
