//! Chunked transfers for results larger than one frame.
//!
//! A sized response starts with the logical total size (LE u32) followed by
//! as much data as fit in the frame. The rest is pulled with explicit
//! `DATA_CONTINUE` requests, each carrying the offset to read from:
//!
//! ```text
//! request:  [offset: LE u32]
//! response: [chunk_len: LE u16][chunk bytes]
//! ```
//!
//! The peripheral keeps no cursor; every follow-up is a seek-and-fetch.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use super::SessionHandle;
use crate::protocol::MAX_PAYLOAD;
use crate::serial::{Result, SerialError};
use crate::tools::Command;

/// Up-front reservation for a transfer; the buffer grows past this as
/// chunks arrive.
const INITIAL_RESERVE: usize = 16 * MAX_PAYLOAD;

/// Header of a sized response, split from its initial data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedResponse {
    pub total_size: u32,
    pub initial: Bytes,
}

impl SizedResponse {
    pub fn parse(payload: &Bytes) -> Result<Self> {
        if payload.len() < 4 {
            return Err(SerialError::ProtocolError(format!(
                "Sized response too short: {} bytes",
                payload.len()
            )));
        }
        let total_size = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Ok(Self {
            total_size,
            initial: payload.slice(4..),
        })
    }
}

/// Progress of one logical transfer.
#[derive(Debug)]
pub struct ChunkedTransfer {
    total_size: u32,
    accumulated: BytesMut,
}

impl ChunkedTransfer {
    pub fn new(total_size: u32, initial: &[u8]) -> Result<Self> {
        let mut transfer = Self {
            total_size,
            accumulated: BytesMut::with_capacity((total_size as usize).min(INITIAL_RESERVE)),
        };
        transfer.push(initial)?;
        Ok(transfer)
    }

    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    pub fn bytes_received(&self) -> u32 {
        self.accumulated.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_received() == self.total_size
    }

    /// Append the chunk that starts at `bytes_received()`.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        let remaining = (self.total_size - self.bytes_received()) as usize;
        if chunk.len() > remaining {
            return Err(SerialError::ProtocolError(format!(
                "Chunk of {} bytes overruns transfer ({} remaining)",
                chunk.len(),
                remaining
            )));
        }
        self.accumulated.extend_from_slice(chunk);
        Ok(())
    }

    pub fn into_bytes(self) -> Result<Bytes> {
        if !self.is_complete() {
            return Err(SerialError::ProtocolError(format!(
                "Transfer incomplete: {}/{} bytes",
                self.bytes_received(),
                self.total_size
            )));
        }
        Ok(self.accumulated.freeze())
    }
}

/// Where follow-up chunks come from.
#[async_trait::async_trait]
pub trait ChunkSource: Send {
    /// Fetch the bytes starting at `offset`; at most one frame's worth.
    async fn fetch(&mut self, offset: u32) -> Result<Bytes>;
}

/// Pull chunks until `transfer` is complete. Any failure abandons the whole
/// transfer; partial data is never returned.
pub async fn fetch_remaining<S: ChunkSource + ?Sized>(source: &mut S, mut transfer: ChunkedTransfer) -> Result<Bytes> {
    while !transfer.is_complete() {
        let offset = transfer.bytes_received();
        let chunk = source.fetch(offset).await?;
        if chunk.is_empty() {
            return Err(SerialError::ProtocolError(format!(
                "Empty chunk at offset {} of {}",
                offset,
                transfer.total_size()
            )));
        }
        if chunk.len() > MAX_PAYLOAD {
            return Err(SerialError::ProtocolError(format!("Chunk of {} bytes exceeds one frame", chunk.len())));
        }
        transfer.push(&chunk)?;
        log::debug!("Chunk {}+{} of {}", offset, chunk.len(), transfer.total_size());
    }
    transfer.into_bytes()
}

/// Fetches chunks with `DATA_CONTINUE` over a session.
pub struct ContinueSource<'a> {
    session: &'a SessionHandle,
    timeout: Duration,
}

impl<'a> ContinueSource<'a> {
    pub fn new(session: &'a SessionHandle, timeout: Duration) -> Self {
        Self { session, timeout }
    }
}

#[async_trait::async_trait]
impl ChunkSource for ContinueSource<'_> {
    async fn fetch(&mut self, offset: u32) -> Result<Bytes> {
        let reply = self
            .session
            .send(Command::DataContinue, offset.to_le_bytes().to_vec(), self.timeout)
            .await?;
        parse_continue_reply(&reply.payload)
    }
}

/// Split a `DATA_CONTINUE` reply into its chunk.
pub fn parse_continue_reply(payload: &Bytes) -> Result<Bytes> {
    if payload.len() < 2 {
        return Err(SerialError::ProtocolError("Continue reply missing length".into()));
    }
    let len = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    if payload.len() - 2 != len {
        return Err(SerialError::ProtocolError(format!(
            "Continue reply declares {} bytes, carries {}",
            len,
            payload.len() - 2
        )));
    }
    Ok(payload.slice(2..))
}

/// Complete a sized response, issuing follow-ups as needed.
pub async fn complete_sized(session: &SessionHandle, first: &Bytes, timeout: Duration) -> Result<Bytes> {
    let sized = SizedResponse::parse(first)?;
    let transfer = ChunkedTransfer::new(sized.total_size, &sized.initial)?;
    if transfer.is_complete() {
        return transfer.into_bytes();
    }
    let mut source = ContinueSource::new(session, timeout);
    fetch_remaining(&mut source, transfer).await
}
