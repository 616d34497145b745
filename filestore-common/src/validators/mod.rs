//! Input validation functions
//!
//! Shared between client and server: clients can pre-validate, the server
//! enforces.

mod filename;

pub use filename::{FilenameError, MAX_FILENAME_LENGTH, validate_filename};
