//! Reference tool handlers that need no radio hardware.
//!
//! Radio, NFC, infrared and RFID handlers are supplied by the embedding
//! firmware; these cover liveness, identity and file access, which is
//! enough to run a complete peripheral on a host.

use std::path::{Component, Path, PathBuf};

use bytes::{BufMut, BytesMut};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::registry::{handler_fn, FnHandler, Reply, ToolHandler};
use super::Dispatcher;
use crate::protocol::{Status, MAX_PAYLOAD};
use crate::tools::models::DEVICE_NAME_FIELD;
use crate::tools::Command;

/// `PING`: empty success reply.
pub fn ping() -> FnHandler<impl Fn(&[u8]) -> Reply + Send + Sync + 'static> {
    handler_fn(|_| Reply::empty())
}

/// `DEVICE_INFO`: `[major, minor, patch]` followed by a fixed-width,
/// NUL-terminated device name.
pub struct DeviceInfoHandler {
    version: [u8; 3],
    name: String,
}

impl DeviceInfoHandler {
    pub fn new(version: [u8; 3], name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(3 + DEVICE_NAME_FIELD);
        payload.extend_from_slice(&self.version);
        let mut field = [0u8; DEVICE_NAME_FIELD];
        let name = self.name.as_bytes();
        let n = name.len().min(DEVICE_NAME_FIELD - 1);
        field[..n].copy_from_slice(&name[..n]);
        payload.extend_from_slice(&field);
        payload
    }
}

#[async_trait::async_trait]
impl ToolHandler for DeviceInfoHandler {
    async fn handle(&self, _command: u8, _payload: &[u8]) -> Reply {
        Reply::ok(self.encode())
    }
}

/// Room for file data in a `STORAGE_READ` reply after the size header.
const READ_INITIAL_MAX: usize = MAX_PAYLOAD - 4;
/// Room for file data in a `DATA_CONTINUE` reply after the length header.
const CONTINUE_MAX: usize = MAX_PAYLOAD - 2;

/// File access rooted at a host directory.
///
/// `STORAGE_READ` remembers which file it opened so that later
/// `DATA_CONTINUE` requests know what to read; the read position always
/// comes from the request.
pub struct StorageHandlers {
    root: PathBuf,
    open_file: Mutex<Option<PathBuf>>,
}

impl StorageHandlers {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open_file: Mutex::new(None),
        }
    }

    /// Register for `STORAGE_LIST`, `STORAGE_READ` and `DATA_CONTINUE`.
    pub fn install(self, dispatcher: &mut Dispatcher) {
        let shared = std::sync::Arc::new(self);
        dispatcher.register(Command::StorageList, shared.clone());
        dispatcher.register(Command::StorageRead, shared.clone());
        dispatcher.register(Command::DataContinue, shared);
    }

    /// Map a device path such as `/ext/apps/a.sub` under the root.
    fn resolve(&self, payload: &[u8]) -> Option<PathBuf> {
        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        let raw = std::str::from_utf8(&payload[..end]).ok()?;
        if raw.is_empty() {
            return None;
        }

        let mut path = self.root.clone();
        for component in Path::new(raw).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => return None,
            }
        }
        Some(path)
    }

    async fn list(&self, payload: &[u8]) -> Reply {
        let Some(dir) = self.resolve(payload) else {
            return Reply::error(Status::Invalid);
        };
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return Reply::error(Status::NotFound),
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().into_owned()),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Listing {} failed: {}", dir.display(), e);
                    return Reply::error(Status::Unknown);
                }
            }
        }
        names.sort();

        let mut out = BytesMut::with_capacity(MAX_PAYLOAD);
        out.put_u8(0);
        let mut count = 0u8;
        for name in &names {
            if count == u8::MAX || out.len() + name.len() + 1 > MAX_PAYLOAD {
                break;
            }
            out.put_slice(name.as_bytes());
            out.put_u8(0);
            count += 1;
        }
        out[0] = count;
        Reply::ok(out.freeze())
    }

    async fn read(&self, payload: &[u8]) -> Reply {
        let Some(path) = self.resolve(payload) else {
            return Reply::error(Status::Invalid);
        };
        let size = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Reply::error(Status::NotFound),
        };
        let Ok(total) = u32::try_from(size) else {
            return Reply::error(Status::Invalid);
        };

        let initial = match read_at(&path, 0, READ_INITIAL_MAX).await {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Reading {} failed: {}", path.display(), e);
                return Reply::error(Status::Unknown);
            }
        };

        *self.open_file.lock().await = Some(path);

        let mut out = BytesMut::with_capacity(4 + initial.len());
        out.put_u32_le(total);
        out.put_slice(&initial);
        Reply::ok(out.freeze())
    }

    async fn resume(&self, payload: &[u8]) -> Reply {
        if payload.len() < 4 {
            return Reply::error(Status::Invalid);
        }
        let offset = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as u64;

        let Some(path) = self.open_file.lock().await.clone() else {
            return Reply::error(Status::NoData);
        };
        let size = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => return Reply::error(Status::NotFound),
        };
        if offset >= size {
            return Reply::error(Status::NoData);
        }

        match read_at(&path, offset, CONTINUE_MAX).await {
            Ok(chunk) => {
                let mut out = BytesMut::with_capacity(2 + chunk.len());
                out.put_u16_le(chunk.len() as u16);
                out.put_slice(&chunk);
                Reply::ok(out.freeze())
            }
            Err(e) => {
                log::warn!("Reading {} at {} failed: {}", path.display(), offset, e);
                Reply::error(Status::Unknown)
            }
        }
    }
}

async fn read_at(path: &Path, offset: u64, max: usize) -> std::io::Result<Vec<u8>> {
    let mut file = fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut data = Vec::with_capacity(max);
    file.take(max as u64).read_to_end(&mut data).await?;
    Ok(data)
}

#[async_trait::async_trait]
impl ToolHandler for StorageHandlers {
    async fn handle(&self, command: u8, payload: &[u8]) -> Reply {
        match Command::try_from(command) {
            Ok(Command::StorageList) => self.list(payload).await,
            Ok(Command::StorageRead) => self.read(payload).await,
            Ok(Command::DataContinue) => self.resume(payload).await,
            _ => Reply::error(Status::Invalid),
        }
    }
}
