//! Service facade
//!
//! The entry points the connection layer calls once per request. Owns the
//! storage accessor and shares the admission controller.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use filestore_common::framing::{FrameReader, FrameWriter, MessageId};

use crate::admission::AdmissionController;
use crate::context::CallContext;
use crate::storage::{FileStore, StoredFile};
use crate::transfers::{
    TransferError, TransferSettings, UploadStream, handle_create, handle_get, handle_list,
};

/// File storage operations with admission control
#[derive(Debug)]
pub struct FileService {
    admission: Arc<AdmissionController>,
    store: FileStore,
    settings: TransferSettings,
}

impl FileService {
    #[must_use]
    pub fn new(
        admission: Arc<AdmissionController>,
        store: FileStore,
        settings: TransferSettings,
    ) -> Self {
        Self {
            admission,
            store,
            settings,
        }
    }

    #[must_use]
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    #[must_use]
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Receive an upload started by a `Create` frame with `message_id`
    ///
    /// Reads the remaining `FileData`/`CreateEnd` frames from `reader` and
    /// returns the stored name.
    ///
    /// # Errors
    ///
    /// Any [`TransferError`]; nothing is stored on failure.
    pub async fn create<R>(
        &self,
        ctx: &CallContext,
        message_id: MessageId,
        filename: &str,
        reader: &mut FrameReader<R>,
    ) -> Result<String, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut stream = UploadStream::new(reader, message_id, &self.settings);
        handle_create(&self.admission, &self.store, ctx, filename, &mut stream).await
    }

    /// Stream `filename` to `writer` as `FileData` frames
    ///
    /// Returns the number of bytes sent.
    ///
    /// # Errors
    ///
    /// Any [`TransferError`]; `NotFound` is returned before any frame is
    /// written.
    pub async fn get<W>(
        &self,
        ctx: &CallContext,
        message_id: MessageId,
        filename: &str,
        writer: &mut FrameWriter<W>,
    ) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        handle_get(
            &self.admission,
            &self.store,
            &self.settings,
            ctx,
            message_id,
            filename,
            writer,
        )
        .await
    }

    /// List all stored files
    ///
    /// # Errors
    ///
    /// Admission or storage failures.
    pub async fn list(&self, ctx: &CallContext) -> Result<Vec<StoredFile>, TransferError> {
        handle_list(&self.admission, &self.store, ctx).await
    }
}
