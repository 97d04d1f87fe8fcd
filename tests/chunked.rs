use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use ecco_link::dispatch::handlers::StorageHandlers;
use ecco_link::dispatch::Dispatcher;
use ecco_link::protocol::{Status, MAX_PAYLOAD};
use ecco_link::serial::{Result, SerialError};
use ecco_link::session::{complete_sized, fetch_remaining, ChunkSource, ChunkedTransfer, SessionBuilder};
use ecco_link::{Command, LinkConfig, StreamTransport, ToolClient};

/// Serves chunks out of an in-memory blob, recording every offset asked for.
struct BlobSource {
    data: Vec<u8>,
    offsets: Vec<u32>,
    fail_at: Option<u32>,
    chunk: usize,
}

impl BlobSource {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            offsets: Vec::new(),
            fail_at: None,
            chunk: MAX_PAYLOAD,
        }
    }
}

#[async_trait::async_trait]
impl ChunkSource for BlobSource {
    async fn fetch(&mut self, offset: u32) -> Result<Bytes> {
        self.offsets.push(offset);
        if self.fail_at == Some(offset) {
            return Err(SerialError::Timeout);
        }
        let start = offset as usize;
        let end = (start + self.chunk).min(self.data.len());
        Ok(Bytes::copy_from_slice(&self.data[start..end]))
    }
}

fn blob(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn large_result_takes_three_fetches() {
    let data = blob(2500);
    let mut source = BlobSource::new(data.clone());

    let transfer = ChunkedTransfer::new(2500, &[]).unwrap();
    let out = fetch_remaining(&mut source, transfer).await.unwrap();

    assert_eq!(source.offsets, vec![0, 1024, 2048]);
    assert_eq!(&out[..], &data[..]);
}

#[tokio::test]
async fn initial_data_counts_toward_total() {
    let data = blob(1500);
    let mut source = BlobSource::new(data.clone());

    let transfer = ChunkedTransfer::new(1500, &data[..1020]).unwrap();
    let out = fetch_remaining(&mut source, transfer).await.unwrap();

    assert_eq!(source.offsets, vec![1020]);
    assert_eq!(out.len(), 1500);
    assert_eq!(&out[..], &data[..]);
}

#[tokio::test]
async fn failed_chunk_aborts_transfer() {
    let mut source = BlobSource::new(blob(4000));
    source.fail_at = Some(2048);

    let transfer = ChunkedTransfer::new(4000, &[]).unwrap();
    let err = fetch_remaining(&mut source, transfer).await.unwrap_err();

    assert!(matches!(err, SerialError::Timeout));
    assert_eq!(source.offsets, vec![0, 1024, 2048]);
}

#[tokio::test]
async fn empty_chunk_before_total_is_a_protocol_error() {
    // Source only has 100 of the 300 announced bytes.
    let mut source = BlobSource::new(blob(100));
    let transfer = ChunkedTransfer::new(300, &[]).unwrap();
    let err = fetch_remaining(&mut source, transfer).await.unwrap_err();
    assert!(matches!(err, SerialError::ProtocolError(_)));
    assert_eq!(source.offsets, vec![0, 100]);
}

#[tokio::test]
async fn overrunning_chunk_is_rejected() {
    let mut source = BlobSource::new(blob(500));
    let transfer = ChunkedTransfer::new(200, &[]).unwrap();
    let err = fetch_remaining(&mut source, transfer).await.unwrap_err();
    assert!(matches!(err, SerialError::ProtocolError(_)));
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ecco-link-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("ext/subghz")).unwrap();
    dir
}

fn client_over_storage(root: PathBuf) -> ToolClient {
    let (controller, peripheral) = tokio::io::duplex(64 * 1024);
    let mut dispatcher = Dispatcher::new();
    StorageHandlers::new(root).install(&mut dispatcher);
    tokio::spawn(async move { dispatcher.serve(StreamTransport::new(peripheral)).await });

    let config = LinkConfig::default();
    let session = SessionBuilder::new(StreamTransport::new(controller)).config(&config).build();
    ToolClient::new(session, config)
}

#[tokio::test]
async fn storage_read_reassembles_file() {
    let root = scratch_dir("read");
    let contents = blob(5000);
    std::fs::write(root.join("ext/subghz/garage.sub"), &contents).unwrap();

    let client = client_over_storage(root.clone());
    let data = client.storage_read("/ext/subghz/garage.sub").await.unwrap();
    assert_eq!(&data[..], &contents[..]);

    let metrics = client.session().metrics();
    // STORAGE_READ plus ceil((5000 - 1020) / 1022) continues.
    assert_eq!(metrics.frames_sent, 1 + 4);

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn small_file_needs_no_follow_up() {
    let root = scratch_dir("small");
    std::fs::write(root.join("ext/note.txt"), b"hello").unwrap();

    let client = client_over_storage(root.clone());
    let data = client.storage_read("/ext/note.txt").await.unwrap();
    assert_eq!(&data[..], b"hello");
    assert_eq!(client.session().metrics().frames_sent, 1);

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn empty_file_reads_as_empty() {
    let root = scratch_dir("empty");
    std::fs::write(root.join("ext/empty.bin"), b"").unwrap();

    let client = client_over_storage(root.clone());
    let data = client.storage_read("/ext/empty.bin").await.unwrap();
    assert!(data.is_empty());

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let root = scratch_dir("missing");
    let client = client_over_storage(root.clone());

    let err = client.storage_read("/ext/nope.sub").await.unwrap_err();
    assert!(matches!(err, SerialError::Device(Status::NotFound)));

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn continue_without_open_file_has_no_data() {
    let root = scratch_dir("noopen");
    let client = client_over_storage(root.clone());

    let err = client
        .session()
        .send(Command::DataContinue, 0u32.to_le_bytes().to_vec(), Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, SerialError::Device(Status::NoData)));

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn complete_sized_over_session() {
    let root = scratch_dir("sized");
    let contents = blob(2100);
    std::fs::write(root.join("ext/dump.nfc"), &contents).unwrap();

    let client = client_over_storage(root.clone());
    let session = client.session();
    let first = session
        .send(Command::StorageRead, &b"/ext/dump.nfc\0"[..], Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(&first.payload[..4], &2100u32.to_le_bytes());

    let data = complete_sized(session, &first.payload, Duration::from_secs(2)).await.unwrap();
    assert_eq!(&data[..], &contents[..]);

    let _ = std::fs::remove_dir_all(root);
}
