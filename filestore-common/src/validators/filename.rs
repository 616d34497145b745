//! Stored file name validation
//!
//! Names are joined directly onto the storage root, so anything that could
//! address a different directory is rejected.

use thiserror::Error;

/// Maximum length for stored file names in bytes
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Validation error for stored file names
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilenameError {
    #[error("file name is empty")]
    Empty,
    #[error("file name exceeds {MAX_FILENAME_LENGTH} bytes")]
    TooLong,
    #[error("file name contains a path separator")]
    ContainsPathSeparator,
    #[error("file name refers to a directory")]
    DirectoryRef,
    #[error("file name contains a null byte")]
    ContainsNull,
    #[error("file name contains control characters")]
    InvalidCharacters,
}

/// Validate a file name before it touches the filesystem
///
/// Checks:
/// - Not empty
/// - At most 255 bytes
/// - Not `.` or `..`
/// - No path separators (`/` or `\`)
/// - No null bytes or other control characters
///
/// # Errors
///
/// Returns a `FilenameError` variant describing the first failure.
pub fn validate_filename(name: &str) -> Result<(), FilenameError> {
    if name.is_empty() {
        return Err(FilenameError::Empty);
    }

    if name.len() > MAX_FILENAME_LENGTH {
        return Err(FilenameError::TooLong);
    }

    if name == "." || name == ".." {
        return Err(FilenameError::DirectoryRef);
    }

    for ch in name.chars() {
        if ch == '/' || ch == '\\' {
            return Err(FilenameError::ContainsPathSeparator);
        }

        if ch == '\0' {
            return Err(FilenameError::ContainsNull);
        }

        if ch.is_control() {
            return Err(FilenameError::InvalidCharacters);
        }
    }

    Ok(())
}
