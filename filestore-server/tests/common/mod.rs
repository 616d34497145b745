//! Shared helpers for integration tests

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use filestore_common::framing::{FrameReader, FrameWriter, MessageId};
use filestore_common::io::{
    ServerFrame, read_server_frame, send_client_message, send_client_message_with_id,
    send_file_data,
};
use filestore_common::protocol::{ClientMessage, ServerMessage};
use filestore_server::admission::{AdmissionController, AdmissionLimits, OperationKind};
use filestore_server::connection::{ConnectionParams, handle_connection_inner};
use filestore_server::service::FileService;
use filestore_server::storage::FileStore;
use filestore_server::transfers::TransferSettings;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long a test waits for any single server frame
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Duplex buffer large enough that the server never blocks on writes
const ROOMY_BUFFER: usize = 4 * 1024 * 1024;

pub fn limits(create: usize, get: usize, list: usize) -> AdmissionLimits {
    AdmissionLimits { create, get, list }
}

/// A server over in-memory connections, storing files in a temp dir
pub struct TestServer {
    pub dir: TempDir,
    pub service: Arc<FileService>,
    pub shutdown: watch::Sender<bool>,
    call_timeout: Duration,
}

impl TestServer {
    pub async fn start(limits: AdmissionLimits) -> Self {
        Self::start_with(limits, TransferSettings::default(), Duration::from_secs(30)).await
    }

    pub async fn start_with(
        limits: AdmissionLimits,
        settings: TransferSettings,
        call_timeout: Duration,
    ) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(dir.path().join("files"), dir.path().join("files.staging"));
        store.init().await.expect("Failed to init storage");

        let admission = Arc::new(AdmissionController::new(limits));
        let service = Arc::new(FileService::new(admission, store, settings));
        let (shutdown, _) = watch::channel(false);

        Self {
            dir,
            service,
            shutdown,
            call_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        self.service.store().root()
    }

    pub fn admission(&self) -> &AdmissionController {
        self.service.admission()
    }

    /// Assert no permit of any kind is held
    pub fn assert_all_permits_free(&self) {
        for kind in [OperationKind::Create, OperationKind::Get, OperationKind::List] {
            assert_eq!(
                self.admission().available(kind),
                self.admission().capacity(kind),
                "{kind} permit leaked"
            );
        }
    }

    /// Wait until `count` permits of `kind` are held
    pub async fn wait_for_held(&self, kind: OperationKind, count: usize) {
        let capacity = self.admission().capacity(kind);
        tokio::time::timeout(READ_TIMEOUT, async {
            while capacity - self.admission().available(kind) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("permits were never taken");
    }

    pub fn params(&self, peer_addr: SocketAddr) -> ConnectionParams {
        ConnectionParams {
            peer_addr,
            service: Arc::clone(&self.service),
            call_timeout: self.call_timeout,
            shutdown: self.shutdown.subscribe(),
        }
    }

    pub fn connect(&self) -> TestClient<DuplexStream> {
        self.connect_with_buffer(ROOMY_BUFFER)
    }

    /// Connect with a small transport buffer, so a client that stops
    /// reading stalls the server mid-download
    pub fn connect_with_buffer(&self, buffer: usize) -> TestClient<DuplexStream> {
        let (client, server) = tokio::io::duplex(buffer);
        let peer_addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let task = tokio::spawn(handle_connection_inner(server, self.params(peer_addr)));
        TestClient::new(client, Some(task))
    }
}

/// Frames received for one download
#[derive(Debug)]
pub struct Download {
    pub chunks: Vec<Vec<u8>>,
    pub result: ServerMessage,
}

impl Download {
    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

/// Protocol client over any stream
pub struct TestClient<S> {
    reader: FrameReader<BufReader<ReadHalf<S>>>,
    writer: FrameWriter<WriteHalf<S>>,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl<S> TestClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, task: Option<JoinHandle<io::Result<()>>>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(BufReader::new(reader)),
            writer: FrameWriter::new(writer),
            task,
        }
    }

    pub async fn send(&mut self, message: &ClientMessage) -> MessageId {
        send_client_message(&mut self.writer, message)
            .await
            .expect("send failed")
    }

    pub async fn send_with_id(&mut self, message: &ClientMessage, id: MessageId) {
        send_client_message_with_id(&mut self.writer, message, id)
            .await
            .expect("send failed");
    }

    pub async fn send_data(&mut self, id: MessageId, data: &[u8]) {
        send_file_data(&mut self.writer, id, data)
            .await
            .expect("send failed");
    }

    /// Write raw bytes, bypassing framing
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;
        self.writer.get_mut().write_all(bytes).await.unwrap();
        self.writer.get_mut().flush().await.unwrap();
    }

    pub async fn next_frame(&mut self) -> Option<ServerFrame> {
        tokio::time::timeout(READ_TIMEOUT, read_server_frame(&mut self.reader, READ_TIMEOUT))
            .await
            .expect("timed out waiting for server")
            .expect("malformed server frame")
    }

    /// Next control message, which must answer `id`
    pub async fn expect_message(&mut self, id: MessageId) -> ServerMessage {
        match self.next_frame().await {
            Some(ServerFrame::Message(received)) => {
                assert_eq!(received.message_id, id, "response for wrong request");
                received.message
            }
            other => panic!("expected control message, got {other:?}"),
        }
    }

    /// Start an upload without finishing it
    pub async fn begin_upload(&mut self, filename: &str, deadline_ms: Option<u64>) -> MessageId {
        self.send(&ClientMessage::Create {
            filename: filename.to_string(),
            deadline_ms,
        })
        .await
    }

    pub async fn finish_upload(&mut self, id: MessageId) -> ServerMessage {
        self.send_with_id(&ClientMessage::CreateEnd, id).await;
        self.expect_message(id).await
    }

    pub async fn upload(&mut self, filename: &str, chunks: &[&[u8]]) -> ServerMessage {
        self.upload_with_deadline(filename, chunks, None).await
    }

    pub async fn upload_with_deadline(
        &mut self,
        filename: &str,
        chunks: &[&[u8]],
        deadline_ms: Option<u64>,
    ) -> ServerMessage {
        let id = self.begin_upload(filename, deadline_ms).await;
        for chunk in chunks {
            self.send_data(id, chunk).await;
        }
        self.finish_upload(id).await
    }

    pub async fn send_get(&mut self, filename: &str, deadline_ms: Option<u64>) -> MessageId {
        self.send(&ClientMessage::Get {
            filename: filename.to_string(),
            deadline_ms,
        })
        .await
    }

    /// Collect `FileData` frames for `id` up to the terminal message
    pub async fn read_download(&mut self, id: MessageId) -> Download {
        let mut chunks = Vec::new();
        loop {
            match self.next_frame().await {
                Some(ServerFrame::Data { message_id, data }) => {
                    assert_eq!(message_id, id);
                    chunks.push(data);
                }
                Some(ServerFrame::Message(received)) => {
                    assert_eq!(received.message_id, id);
                    return Download {
                        chunks,
                        result: received.message,
                    };
                }
                None => panic!("connection closed mid-download"),
            }
        }
    }

    pub async fn download(&mut self, filename: &str) -> Download {
        let id = self.send_get(filename, None).await;
        self.read_download(id).await
    }

    pub async fn list(&mut self) -> ServerMessage {
        let id = self.send(&ClientMessage::List { deadline_ms: None }).await;
        self.expect_message(id).await
    }

    /// Wait for the server side of the connection to finish
    pub async fn closed(mut self) -> io::Result<()> {
        let task = self.task.take().expect("no server task for this client");
        tokio::time::timeout(READ_TIMEOUT, task)
            .await
            .expect("connection did not close")
            .expect("connection task panicked")
    }
}
