//! I/O utilities for sending and receiving protocol messages
//!
//! This module sits between the protocol message types (`ClientMessage`,
//! `ServerMessage`) and the wire format (framing). Raw `FileData` frames
//! are surfaced separately from JSON control messages so file bytes are
//! never parsed.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::framing::{FILE_DATA_TYPE, FrameError, FrameReader, FrameWriter, MessageId, RawFrame};
use crate::protocol::{ClientMessage, ServerMessage};

// =============================================================================
// Error Conversion
// =============================================================================

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(msg) => io::Error::other(msg),
            FrameError::ConnectionClosed => {
                io::Error::new(io::ErrorKind::ConnectionReset, "connection closed")
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

// =============================================================================
// Message Sending
// =============================================================================

/// Send a `ClientMessage` to the server
///
/// Generates a new message ID and returns it so replies can be matched.
pub async fn send_client_message<W>(
    writer: &mut FrameWriter<W>,
    message: &ClientMessage,
) -> io::Result<MessageId>
where
    W: AsyncWriteExt + Unpin,
{
    let message_id = MessageId::new();
    send_client_message_with_id(writer, message, message_id).await?;
    Ok(message_id)
}

/// Send a `ClientMessage` to the server with a specific message ID
///
/// Upload streams reuse the `Create` message ID for every `FileData` frame
/// and the closing `CreateEnd`.
pub async fn send_client_message_with_id<W>(
    writer: &mut FrameWriter<W>,
    message: &ClientMessage,
    message_id: MessageId,
) -> io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let payload =
        serde_json::to_vec(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let frame = RawFrame::new(message_id, message.message_type().to_string(), payload);
    writer.write_frame(&frame).await.map_err(Into::into)
}

/// Send a `ServerMessage` to a client, echoing the request's message ID
pub async fn send_server_message_with_id<W>(
    writer: &mut FrameWriter<W>,
    message: &ServerMessage,
    message_id: MessageId,
) -> io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let payload =
        serde_json::to_vec(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let frame = RawFrame::new(message_id, message.message_type().to_string(), payload);
    writer.write_frame(&frame).await.map_err(Into::into)
}

/// Send one chunk of file bytes as a raw `FileData` frame
pub async fn send_file_data<W>(
    writer: &mut FrameWriter<W>,
    message_id: MessageId,
    data: &[u8],
) -> io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    writer
        .write(message_id, FILE_DATA_TYPE, data)
        .await
        .map_err(Into::into)
}

// =============================================================================
// Message Receiving
// =============================================================================

/// Received client message with its message ID
#[derive(Debug)]
pub struct ReceivedClientMessage {
    /// The message ID from the frame (for response correlation)
    pub message_id: MessageId,
    /// The parsed client message
    pub message: ClientMessage,
}

/// Received server message with its message ID
#[derive(Debug)]
pub struct ReceivedServerMessage {
    /// The message ID from the frame (for request correlation)
    pub message_id: MessageId,
    /// The parsed server message
    pub message: ServerMessage,
}

/// A frame received from a client
#[derive(Debug)]
pub enum ClientFrame {
    /// JSON control message
    Message(ReceivedClientMessage),
    /// Raw upload chunk
    Data { message_id: MessageId, data: Vec<u8> },
}

/// A frame received from the server
#[derive(Debug)]
pub enum ServerFrame {
    /// JSON control message
    Message(ReceivedServerMessage),
    /// Raw download chunk
    Data { message_id: MessageId, data: Vec<u8> },
}

/// Read the next client frame
///
/// Waits indefinitely for the first byte, then the frame must complete
/// within `frame_timeout`. Returns `Ok(None)` if the connection was cleanly
/// closed.
pub async fn read_client_frame<R>(
    reader: &mut FrameReader<R>,
    frame_timeout: Duration,
) -> Result<Option<ClientFrame>, FrameError>
where
    R: AsyncReadExt + Unpin,
{
    let Some(frame) = reader.read_frame_with_timeout(frame_timeout).await? else {
        return Ok(None);
    };

    if frame.message_type == FILE_DATA_TYPE {
        return Ok(Some(ClientFrame::Data {
            message_id: frame.message_id,
            data: frame.payload,
        }));
    }

    let message_id = frame.message_id;
    let message: ClientMessage = parse_payload(frame)?;
    Ok(Some(ClientFrame::Message(ReceivedClientMessage {
        message_id,
        message,
    })))
}

/// Read the next server frame
///
/// Returns `Ok(None)` if the connection was cleanly closed.
pub async fn read_server_frame<R>(
    reader: &mut FrameReader<R>,
    frame_timeout: Duration,
) -> Result<Option<ServerFrame>, FrameError>
where
    R: AsyncReadExt + Unpin,
{
    let Some(frame) = reader.read_frame_with_timeout(frame_timeout).await? else {
        return Ok(None);
    };

    if frame.message_type == FILE_DATA_TYPE {
        return Ok(Some(ServerFrame::Data {
            message_id: frame.message_id,
            data: frame.payload,
        }));
    }

    let message_id = frame.message_id;
    let message: ServerMessage = parse_payload(frame)?;
    Ok(Some(ServerFrame::Message(ReceivedServerMessage {
        message_id,
        message,
    })))
}

/// Types whose wire name can be checked against the frame header
trait Tagged {
    fn tag(&self) -> &'static str;
}

impl Tagged for ClientMessage {
    fn tag(&self) -> &'static str {
        self.message_type()
    }
}

impl Tagged for ServerMessage {
    fn tag(&self) -> &'static str {
        self.message_type()
    }
}

/// Parse a JSON payload and check that the frame type matches the message
fn parse_payload<T>(frame: RawFrame) -> Result<T, FrameError>
where
    T: serde::de::DeserializeOwned + Tagged,
{
    let message: T = serde_json::from_slice(&frame.payload)
        .map_err(|e| FrameError::InvalidJson(e.to_string()))?;

    let expected_type = message.tag();
    if frame.message_type != expected_type {
        return Err(FrameError::InvalidJson(format!(
            "frame type mismatch: frame says '{}' but JSON is '{}'",
            frame.message_type, expected_type
        )));
    }

    Ok(message)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::io::Cursor;
    use tokio::io::BufReader;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_upload_stream_shares_message_id() {
        let mut buffer = Vec::new();
        let id;
        {
            let mut writer = FrameWriter::new(Cursor::new(&mut buffer));
            id = send_client_message(
                &mut writer,
                &ClientMessage::Create {
                    filename: "notes.txt".to_string(),
                    deadline_ms: None,
                },
            )
            .await
            .unwrap();
            send_file_data(&mut writer, id, b"hello").await.unwrap();
            send_client_message_with_id(&mut writer, &ClientMessage::CreateEnd, id)
                .await
                .unwrap();
        }

        let mut reader = FrameReader::new(BufReader::new(Cursor::new(buffer)));

        match read_client_frame(&mut reader, TIMEOUT).await.unwrap() {
            Some(ClientFrame::Message(received)) => {
                assert_eq!(received.message_id, id);
                assert!(matches!(received.message, ClientMessage::Create { .. }));
            }
            other => panic!("expected Create, got {other:?}"),
        }
        match read_client_frame(&mut reader, TIMEOUT).await.unwrap() {
            Some(ClientFrame::Data { message_id, data }) => {
                assert_eq!(message_id, id);
                assert_eq!(data, b"hello");
            }
            other => panic!("expected FileData, got {other:?}"),
        }
        match read_client_frame(&mut reader, TIMEOUT).await.unwrap() {
            Some(ClientFrame::Message(received)) => {
                assert_eq!(received.message, ClientMessage::CreateEnd);
            }
            other => panic!("expected CreateEnd, got {other:?}"),
        }
        assert!(read_client_frame(&mut reader, TIMEOUT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_message_echoes_id() {
        let mut buffer = Vec::new();
        let id = MessageId::new();
        {
            let mut writer = FrameWriter::new(Cursor::new(&mut buffer));
            let msg = ServerMessage::Error {
                kind: ErrorKind::Exists,
                message: "file already exists".to_string(),
            };
            send_server_message_with_id(&mut writer, &msg, id)
                .await
                .unwrap();
        }

        let mut reader = FrameReader::new(BufReader::new(Cursor::new(buffer)));
        match read_server_frame(&mut reader, TIMEOUT).await.unwrap() {
            Some(ServerFrame::Message(received)) => {
                assert_eq!(received.message_id, id);
                assert!(matches!(
                    received.message,
                    ServerMessage::Error {
                        kind: ErrorKind::Exists,
                        ..
                    }
                ));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_type_mismatch_rejected() {
        // Header says Get, JSON says List
        let data = b"FS|3|Get|a1b2c3d4e5f6|15|{\"type\":\"List\"}\n";
        let mut reader = FrameReader::new(BufReader::new(Cursor::new(&data[..])));
        let result = read_client_frame(&mut reader, TIMEOUT).await;
        assert!(matches!(result, Err(FrameError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let data = b"FS|4|List|a1b2c3d4e5f6|3|{x}\n";
        let mut reader = FrameReader::new(BufReader::new(Cursor::new(&data[..])));
        let result = read_client_frame(&mut reader, TIMEOUT).await;
        assert!(matches!(result, Err(FrameError::InvalidJson(_))));
    }

    #[test]
    fn test_frame_error_to_io_error() {
        let err: io::Error = FrameError::ConnectionClosed.into();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
