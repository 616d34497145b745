//! Upload (Create) handling
//!
//! ```text
//! Client: Create { filename }
//! Client: FileData*            (same message ID as Create)
//! Client: CreateEnd            (same message ID as Create)
//! Server: CreateResponse { filename } | Error
//! ```
//!
//! The server reads the whole request stream even when it rejects the
//! upload early, so the connection stays in sync for the next call.

use tokio::io::AsyncRead;
use tokio::time::timeout;

use filestore_common::framing::{FrameReader, MessageId};
use filestore_common::io::{ClientFrame, ReceivedClientMessage, read_client_frame};
use filestore_common::protocol::ClientMessage;
use filestore_common::validators::validate_filename;

use crate::admission::{AdmissionController, OperationKind};
use crate::context::CallContext;
use crate::storage::FileStore;

use super::TransferSettings;
use super::error::TransferError;
use super::session::UploadSession;

/// Inbound half of an upload call
pub(crate) struct UploadStream<'a, R> {
    reader: &'a mut FrameReader<R>,
    message_id: MessageId,
    settings: &'a TransferSettings,
    finished: bool,
}

impl<'a, R> UploadStream<'a, R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(
        reader: &'a mut FrameReader<R>,
        message_id: MessageId,
        settings: &'a TransferSettings,
    ) -> Self {
        Self {
            reader,
            message_id,
            settings,
            finished: false,
        }
    }

    /// Next chunk of the upload, or `None` once `CreateEnd` arrives
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        if self.finished {
            return Ok(None);
        }

        let read = read_client_frame(&mut *self.reader, self.settings.frame_timeout);
        let frame = match timeout(self.settings.progress_timeout, read).await {
            Ok(frame) => frame?,
            Err(_) => return Err(TransferError::transport("upload stalled")),
        };

        match frame {
            Some(ClientFrame::Data { message_id, data }) if message_id == self.message_id => {
                Ok(Some(data))
            }
            Some(ClientFrame::Message(ReceivedClientMessage {
                message_id,
                message: ClientMessage::CreateEnd,
            })) if message_id == self.message_id => {
                self.finished = true;
                Ok(None)
            }
            Some(ClientFrame::Data { message_id, .. })
            | Some(ClientFrame::Message(ReceivedClientMessage { message_id, .. })) => {
                Err(TransferError::transport(format!(
                    "unexpected frame {message_id} during upload {}",
                    self.message_id
                )))
            }
            None => Err(TransferError::transport("connection closed during upload")),
        }
    }

    /// Next chunk, giving up if the call is cancelled first
    async fn next_chunk(&mut self, ctx: &CallContext) -> Result<Option<Vec<u8>>, TransferError> {
        tokio::select! {
            frame = self.next_frame() => frame,
            reason = ctx.cancelled() => Err(TransferError::Cancelled(reason)),
        }
    }

    /// Discard the rest of the request stream up to `CreateEnd`
    async fn drain(&mut self) -> Result<u64, TransferError> {
        let mut discarded = 0u64;
        while let Some(data) = self.next_frame().await? {
            discarded += data.len() as u64;
        }
        Ok(discarded)
    }
}

/// Handle a complete upload call
///
/// Returns the stored name on success. On failure the permit and the staging
/// file are released, and the request stream has been drained unless the
/// error closes the connection.
pub(crate) async fn handle_create<R>(
    admission: &AdmissionController,
    store: &FileStore,
    ctx: &CallContext,
    filename: &str,
    stream: &mut UploadStream<'_, R>,
) -> Result<String, TransferError>
where
    R: AsyncRead + Unpin,
{
    let result = receive_upload(admission, store, ctx, filename, stream).await;

    if let Err(err) = &result {
        if !stream.finished && !err.closes_connection() {
            match stream.drain().await {
                Ok(discarded) => {
                    tracing::debug!(filename, bytes = discarded, "drained rejected upload");
                }
                Err(drain_err) => {
                    tracing::debug!(filename, error = %err, "upload rejected before stream broke");
                    return Err(drain_err);
                }
            }
        }
    }

    result
}

async fn receive_upload<R>(
    admission: &AdmissionController,
    store: &FileStore,
    ctx: &CallContext,
    filename: &str,
    stream: &mut UploadStream<'_, R>,
) -> Result<String, TransferError>
where
    R: AsyncRead + Unpin,
{
    let _permit = admission.acquire(OperationKind::Create, ctx).await?;

    validate_filename(filename)?;
    if store.exists(filename).await? {
        return Err(TransferError::AlreadyExists(filename.to_string()));
    }

    let mut session = UploadSession::create(store, filename).await?;
    tracing::debug!(filename, staging = %session.staging_path().display(), "upload started");

    loop {
        match stream.next_chunk(ctx).await {
            Ok(Some(data)) => {
                if let Err(e) = session.write_chunk(&data).await {
                    session.abort(store).await;
                    return Err(e.into());
                }
            }
            Ok(None) => break,
            Err(e) => {
                session.abort(store).await;
                return Err(e);
            }
        }
    }

    let bytes = session.commit(store).await?;
    tracing::debug!(filename, bytes, "upload stored");
    Ok(filename.to_string())
}
