//! Byte-stream reassembly.
//!
//! Transports give no framing guarantee: a read may hold part of a frame,
//! several frames, or garbage. The reassembler accumulates bytes and yields
//! every complete frame in arrival order. When the front of the buffer can
//! never become a valid frame, exactly one byte is dropped and parsing
//! restarts from the next offset.
//!
//! Bytes dropped since the last good frame are counted separately so the
//! owner can tell a noisy line from one that has lost framing for good.

use bytes::{Buf, BytesMut};

use super::{frame, Frame, MAX_FRAME_SIZE};

pub struct Reassembler {
    buffer: BytesMut,
    discarded: u64,
    unframed: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(2 * MAX_FRAME_SIZE),
            discarded: 0,
            unframed: 0,
        }
    }

    /// Append `data` and extract every complete frame now available.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while !self.buffer.is_empty() {
            match frame::decode(&self.buffer) {
                Ok(None) => break,
                Ok(Some((frame, consumed))) => {
                    self.buffer.advance(consumed);
                    self.unframed = 0;
                    frames.push(frame);
                }
                Err(e) => {
                    log::trace!("resync: dropping 0x{:02X} ({})", self.buffer[0], e);
                    self.buffer.advance(1);
                    self.discarded += 1;
                    self.unframed += 1;
                }
            }
        }

        frames
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped while resynchronizing.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Bytes dropped since the last frame was emitted.
    pub fn unframed(&self) -> usize {
        self.unframed
    }

    /// Drop all buffered bytes and restart the unframed count.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.unframed = 0;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
