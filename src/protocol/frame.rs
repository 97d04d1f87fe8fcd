use bytes::Bytes;

use super::{checksum, FrameError, Result, Status, FRAME_OVERHEAD, FRAME_START, MAX_PAYLOAD};

/// A single decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u8,
    pub command: u8,
    pub status: Status,
    pub payload: Bytes,
}

impl Frame {
    /// Request frames always carry `Status::Ok`.
    pub fn request(command: u8, sequence: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            command,
            status: Status::Ok,
            payload: payload.into(),
        }
    }

    /// Response frame echoing the sequence and command of `request`.
    pub fn response_to(request: &Frame, status: Status, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence: request.sequence,
            command: request.command,
            status,
            payload: payload.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self.command, self.sequence, self.status, &self.payload)
    }
}

/// Encode one frame. Output is always `7 + payload.len()` bytes.
pub fn encode(command: u8, sequence: u8, status: Status, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }

    let len = payload.len() as u16;
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.push(FRAME_START);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.push(sequence);
    buf.push(command);
    buf.push(status.code());
    buf.extend_from_slice(payload);
    let sum = checksum(&buf[1..]);
    buf.push(sum);
    Ok(buf)
}

/// Try to decode one frame from the front of `buf`.
///
/// - `Ok(None)`: not enough bytes yet; wait for more input.
/// - `Ok(Some((frame, consumed)))`: a verified frame and its wire length.
/// - `Err(_)`: the bytes at the front of `buf` can never form a valid frame.
///
/// A declared length over `MAX_PAYLOAD` is rejected as soon as the header
/// is visible, without waiting for the rest of the bytes.
pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
    if buf.len() < FRAME_OVERHEAD {
        return Ok(None);
    }

    if buf[0] != FRAME_START {
        return Err(FrameError::InvalidStart(buf[0]));
    }

    let payload_len = u16::from_le_bytes([buf[1], buf[2]]) as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge(payload_len));
    }

    let frame_len = FRAME_OVERHEAD + payload_len;
    if buf.len() < frame_len {
        return Ok(None);
    }

    let expected = checksum(&buf[1..frame_len - 1]);
    let actual = buf[frame_len - 1];
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    let frame = Frame {
        sequence: buf[3],
        command: buf[4],
        status: Status::from(buf[5]),
        payload: Bytes::copy_from_slice(&buf[6..6 + payload_len]),
    };

    Ok(Some((frame, frame_len)))
}
