//! Filesystem-backed storage for uploaded files
//!
//! Stored files live directly under the storage root. Uploads are written to
//! a separate staging directory and published with a hard link, which fails
//! if the name already exists, so a partially written file is never visible
//! under its final name and two uploads cannot both claim the same name.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use uuid::Uuid;

use filestore_common::protocol::FileInfo;

/// Extension given to staging files
const STAGING_EXTENSION: &str = "part";

/// Storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Metadata for one stored file, read at listing time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredFile> for FileInfo {
    fn from(file: StoredFile) -> Self {
        FileInfo {
            name: file.name,
            created_at: file.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            updated_at: file.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Access to the storage root and staging directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    staging: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging: staging.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Create the storage root and staging directory, with parents
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if either directory cannot be created.
    pub async fn init(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io("create directory", &self.root, e))?;
        fs::create_dir_all(&self.staging)
            .await
            .map_err(|e| StorageError::io("create directory", &self.staging, e))?;
        Ok(())
    }

    /// Check whether `name` exists under the root
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` for any failure other than "not found".
    pub async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(name);
        match fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io("stat", &path, e)),
        }
    }

    /// List every entry directly under the root, in directory order
    ///
    /// Both timestamps are the entry's modification time. Symlinks are
    /// followed, as they are by `exists` and `open`.
    ///
    /// # Errors
    ///
    /// Fails as a whole if the root or any entry's metadata cannot be read.
    pub async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::io("read directory", &self.root, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io("read directory", &self.root, e))?
        {
            let path = entry.path();
            let modified = fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .map_err(|e| StorageError::io("read metadata of", &path, e))?;
            let modified = DateTime::<Utc>::from(modified);

            files.push(StoredFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                created_at: modified,
                updated_at: modified,
            });
        }

        Ok(files)
    }

    /// Create a fresh, uniquely named staging file for an upload
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directories or the file cannot be
    /// created.
    pub async fn create_staging(&self) -> Result<(PathBuf, File), StorageError> {
        self.init().await?;

        let path = self
            .staging
            .join(format!("{}.{STAGING_EXTENSION}", Uuid::new_v4().simple()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io("create", &path, e))?;

        Ok((path, file))
    }

    /// Publish a completed staging file under `name`
    ///
    /// The staging file is unlinked on success and left in place on failure
    /// so the caller can [`discard`](Self::discard) it.
    ///
    /// # Errors
    ///
    /// - `StorageError::AlreadyExists` if `name` already exists
    /// - `StorageError::Io` for any other link failure
    pub async fn commit(&self, staging: &Path, name: &str) -> Result<(), StorageError> {
        let target = self.path_for(name);
        match fs::hard_link(staging, &target).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(name.to_string()));
            }
            Err(e) => return Err(StorageError::io("publish", &target, e)),
        }

        // The file is already published; a leftover link only wastes space
        if let Err(e) = fs::remove_file(staging).await {
            tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging file");
        }
        Ok(())
    }

    /// Remove a staging file, logging any failure
    pub async fn discard(&self, staging: &Path) {
        match fs::remove_file(staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging file");
            }
        }
    }

    /// Open a stored file for reading
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` if `name` does not exist
    /// - `StorageError::Io` for any other failure
    pub async fn open(&self, name: &str) -> Result<File, StorageError> {
        let path = self.path_for(name);
        File::open(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::io("open", &path, e)
            }
        })
    }
}
