//! Client connection handling
//!
//! One task per connection. Requests on a connection are served one at a
//! time; each gets its own [`CallContext`] bounded by the configured call
//! timeout, the client's `deadline_ms` and server shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

use filestore_common::ErrorKind;
use filestore_common::framing::{FrameError, FrameReader, FrameWriter, MessageId};
use filestore_common::io::{
    ClientFrame, ReceivedClientMessage, read_client_frame, send_server_message_with_id,
};
use filestore_common::protocol::{ClientMessage, FileInfo, ServerMessage};

use crate::context::CallContext;
use crate::service::FileService;
use crate::transfers::TransferError;

/// Message sent in place of storage error details
const STORAGE_FAILURE_MESSAGE: &str = "storage failure";

/// Time allowed for the last `Error` frame on a connection that is closing
const CLOSING_ERROR_TIMEOUT: Duration = Duration::from_secs(1);

/// Parameters for handling a connection
#[derive(Clone)]
pub struct ConnectionParams {
    pub peer_addr: SocketAddr,
    pub service: Arc<FileService>,
    /// Upper bound on each call's duration
    pub call_timeout: Duration,
    /// Flips to `true` when the server starts shutting down
    pub shutdown: watch::Receiver<bool>,
}

/// Handle a client TCP connection
pub async fn handle_connection(socket: TcpStream, params: ConnectionParams) -> io::Result<()> {
    handle_connection_inner(socket, params).await
}

/// Inner connection handler that works with any AsyncRead + AsyncWrite stream
pub async fn handle_connection_inner<S>(socket: S, params: ConnectionParams) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer_addr = params.peer_addr;
    let (reader, writer) = tokio::io::split(socket);
    let mut frame_reader = FrameReader::new(BufReader::new(reader));
    let mut frame_writer = FrameWriter::new(writer);

    tracing::debug!(peer = %peer_addr, "connection opened");

    // Resolves only on shutdown; used while idle between requests
    let idle = CallContext::new(None, params.shutdown.clone());
    let frame_timeout = params.service.settings().frame_timeout;

    let result = loop {
        let frame = tokio::select! {
            biased;
            _ = idle.cancelled() => {
                tracing::debug!(peer = %peer_addr, "closing connection for shutdown");
                break Ok(());
            }
            frame = read_client_frame(&mut frame_reader, frame_timeout) => frame,
        };

        let received = match frame {
            Ok(Some(ClientFrame::Message(received))) => received,
            Ok(Some(ClientFrame::Data { message_id, .. })) => {
                let err = TransferError::transport("FileData outside an upload");
                log_failure(peer_addr, "-", None, &err);
                let _ = send_error(&mut frame_writer, message_id, &err).await;
                break Ok(());
            }
            Ok(None) => break Ok(()),
            Err(e) => {
                // Scanners and dropped connections produce these routinely
                let is_common_error = matches!(
                    e,
                    FrameError::InvalidMagic
                        | FrameError::FrameTimeout
                        | FrameError::ConnectionClosed
                );
                if is_common_error {
                    tracing::debug!(peer = %peer_addr, error = %e, "dropping connection");
                } else {
                    tracing::warn!(peer = %peer_addr, error = %e, "malformed frame");
                }

                let _ = send_error(
                    &mut frame_writer,
                    MessageId::new(),
                    &TransferError::from(e),
                )
                .await;
                break Ok(());
            }
        };

        match handle_request(received, &mut frame_reader, &mut frame_writer, &params).await {
            Ok(true) => {}
            Ok(false) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    let _ = frame_writer.shutdown().await;
    tracing::debug!(peer = %peer_addr, "connection closed");
    result
}

/// Serve one request; returns whether the connection stays open
async fn handle_request<R, W>(
    received: ReceivedClientMessage,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    params: &ConnectionParams,
) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let ReceivedClientMessage {
        message_id,
        message,
    } = received;
    let peer_addr = params.peer_addr;
    let service = &params.service;

    let ctx = CallContext::with_timeout(params.call_timeout, params.shutdown.clone())
        .with_client_deadline(message.deadline_ms());
    let op = message.message_type();

    let (filename, outcome) = match message {
        ClientMessage::Create { filename, .. } => {
            tracing::debug!(peer = %peer_addr, filename, "create");
            let outcome = service
                .create(&ctx, message_id, &filename, reader)
                .await
                .map(|filename| ServerMessage::CreateResponse { filename });
            (Some(filename), outcome)
        }
        ClientMessage::Get { filename, .. } => {
            tracing::debug!(peer = %peer_addr, filename, "get");
            let outcome = service
                .get(&ctx, message_id, &filename, writer)
                .await
                .map(|size| ServerMessage::GetComplete { size });
            (Some(filename), outcome)
        }
        ClientMessage::List { .. } => {
            tracing::debug!(peer = %peer_addr, "list");
            let outcome = service.list(&ctx).await.map(|files| ServerMessage::ListResponse {
                files: files.into_iter().map(FileInfo::from).collect(),
            });
            (None, outcome)
        }
        ClientMessage::CreateEnd => (
            None,
            Err(TransferError::transport("CreateEnd without an upload")),
        ),
    };

    match outcome {
        Ok(response) => {
            send_server_message_with_id(writer, &response, message_id).await?;
            Ok(true)
        }
        Err(err) => {
            log_failure(peer_addr, op, filename.as_deref(), &err);
            if err.closes_connection() {
                // The peer may have stopped reading; don't wait on it
                let _ = tokio::time::timeout(
                    CLOSING_ERROR_TIMEOUT,
                    send_error(writer, message_id, &err),
                )
                .await;
                return Ok(false);
            }
            send_error(writer, message_id, &err).await?;
            Ok(true)
        }
    }
}

/// Log a failed call once, at a level matching who is at fault
fn log_failure(peer_addr: SocketAddr, op: &str, filename: Option<&str>, err: &TransferError) {
    let filename = filename.unwrap_or("-");
    let kind = err.kind();
    if err.is_server_fault() {
        tracing::error!(peer = %peer_addr, op, filename, %kind, error = %err, "call failed");
    } else {
        tracing::warn!(peer = %peer_addr, op, filename, %kind, error = %err, "call failed");
    }
}

/// Send the terminal `Error` frame for a failed call
async fn send_error<W>(
    writer: &mut FrameWriter<W>,
    message_id: MessageId,
    err: &TransferError,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let kind = err.kind();
    let message = if kind == ErrorKind::IoError {
        STORAGE_FAILURE_MESSAGE.to_string()
    } else {
        err.to_string()
    };
    send_server_message_with_id(writer, &ServerMessage::Error { kind, message }, message_id).await
}
