//! In-progress upload state

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::storage::{FileStore, StorageError};

/// An upload being written to its staging file
///
/// Owned by a single call. Dropping an unfinished session closes the handle
/// and removes the staging file, so a cancelled call leaves nothing behind.
#[derive(Debug)]
pub struct UploadSession {
    name: String,
    staging: PathBuf,
    file: Option<File>,
    bytes_written: u64,
}

impl UploadSession {
    /// Create the staging file for an upload of `name`
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the staging file cannot be created.
    pub async fn create(store: &FileStore, name: &str) -> Result<Self, StorageError> {
        let (staging, file) = store.create_staging().await?;
        Ok(Self {
            name: name.to_string(),
            staging,
            file: Some(file),
            bytes_written: 0,
        })
    }

    #[must_use]
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append one chunk
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the write fails.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let Some(file) = self.file.as_mut() else {
            return Err(self.closed_error());
        };
        file.write_all(data).await.map_err(|source| StorageError::Io {
            op: "write",
            path: self.staging.clone(),
            source,
        })?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush, close and publish the upload under its final name
    ///
    /// The staging file is removed whether or not publishing succeeds.
    ///
    /// # Errors
    ///
    /// - `StorageError::AlreadyExists` if the name was taken meanwhile
    /// - `StorageError::Io` if flushing or publishing fails
    pub async fn commit(mut self, store: &FileStore) -> Result<u64, StorageError> {
        let Some(mut file) = self.file.take() else {
            return Err(self.closed_error());
        };

        let flushed = file.flush().await;
        drop(file);
        if let Err(source) = flushed {
            store.discard(&self.staging).await;
            return Err(StorageError::Io {
                op: "flush",
                path: self.staging.clone(),
                source,
            });
        }

        let result = store.commit(&self.staging, &self.name).await;
        if result.is_err() {
            store.discard(&self.staging).await;
        }
        result.map(|()| self.bytes_written)
    }

    /// Close the handle and remove the staging file
    pub async fn abort(mut self, store: &FileStore) {
        drop(self.file.take());
        store.discard(&self.staging).await;
    }

    fn closed_error(&self) -> StorageError {
        StorageError::Io {
            op: "write",
            path: self.staging.clone(),
            source: std::io::Error::other("upload session already closed"),
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        // An open handle means the call future was dropped mid-upload, as
        // when a connection is aborted at shutdown. `commit` and `abort`
        // clean up asynchronously; this single unlink is the only blocking
        // call on that path.
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.staging);
        }
    }
}
