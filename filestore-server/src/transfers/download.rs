//! Download (Get) handling
//!
//! ```text
//! Client: Get { filename }
//! Server: FileData*            (request message ID)
//! Server: GetComplete { size } | Error
//! ```
//!
//! A missing file fails before any `FileData` is sent. Frames already sent
//! when a later failure happens are not retracted. A cancelled write may
//! leave a partial frame behind, so cancellation closes the connection.

use tokio::io::{AsyncReadExt, AsyncWrite};

use filestore_common::framing::{FrameWriter, MessageId};
use filestore_common::io::send_file_data;
use filestore_common::validators::validate_filename;

use crate::admission::{AdmissionController, OperationKind};
use crate::context::CallContext;
use crate::storage::{FileStore, StorageError};

use super::TransferSettings;
use super::error::TransferError;

/// Stream a stored file to the client
///
/// Returns the number of bytes sent. The permit and file handle are released
/// before returning, so the caller sends `GetComplete` with nothing held.
pub(crate) async fn handle_get<W>(
    admission: &AdmissionController,
    store: &FileStore,
    settings: &TransferSettings,
    ctx: &CallContext,
    message_id: MessageId,
    filename: &str,
    writer: &mut FrameWriter<W>,
) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let _permit = admission.acquire(OperationKind::Get, ctx).await?;

    validate_filename(filename)?;
    if !store.exists(filename).await? {
        return Err(TransferError::NotFound(filename.to_string()));
    }

    // The file may vanish between the check and the open; open maps that
    // to NotFound as well
    let mut file = store.open(filename).await?;
    let path = store.root().join(filename);

    let mut buf = vec![0u8; settings.chunk_size];
    let mut sent = 0u64;
    loop {
        let n = file.read(&mut buf).await.map_err(|source| StorageError::Io {
            op: "read",
            path: path.clone(),
            source,
        })?;
        if n == 0 {
            break;
        }

        ctx.check()?;

        // Blocks while the client is not reading
        tokio::select! {
            biased;
            reason = ctx.cancelled() => return Err(TransferError::Cancelled(reason)),
            written = send_file_data(writer, message_id, &buf[..n]) => written?,
        }
        sent += n as u64;
    }

    tracing::debug!(filename, bytes = sent, "download streamed");
    Ok(sent)
}
