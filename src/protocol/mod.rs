//! Wire protocol shared by the controller and the peripheral.
//!
//! ```text
//! ┌───────┬────────────┬─────┬─────┬────────┬─────────────┬──────────┐
//! │ START │ LEN (LE16) │ SEQ │ CMD │ STATUS │ PAYLOAD (N) │ CHECKSUM │
//! │ 0xEC  │ N <= 1024  │     │     │        │             │ XOR 1..  │
//! └───────┴────────────┴─────┴─────┴────────┴─────────────┴──────────┘
//! ```
//!
//! The checksum covers every byte from the first length byte through the
//! last payload byte. Frame boundaries are found by length, never by
//! scanning for the start byte.

pub mod checksum;
pub mod frame;
pub mod reassembler;

pub use checksum::checksum;
pub use frame::{decode, encode, Frame};
pub use reassembler::Reassembler;

use serde::{Deserialize, Serialize};

/// Frame start sentinel.
pub const FRAME_START: u8 = 0xEC;
/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD: usize = 1024;
/// START + LEN(2) + SEQ + CMD + STATUS + CHECKSUM.
pub const FRAME_OVERHEAD: usize = 7;
/// Size of the largest possible frame on the wire.
pub const MAX_FRAME_SIZE: usize = FRAME_OVERHEAD + MAX_PAYLOAD;

/// Response status carried in every frame. Requests always carry `Ok`.
///
/// Codes are only ever appended; unknown codes from a newer peripheral are
/// preserved in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Unknown,
    Invalid,
    Busy,
    Timeout,
    NotFound,
    NoData,
    Other(u8),
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Ok => 0x00,
            Status::Unknown => 0x01,
            Status::Invalid => 0x02,
            Status::Busy => 0x03,
            Status::Timeout => 0x04,
            Status::NotFound => 0x05,
            Status::NoData => 0x06,
            Status::Other(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Status::Ok,
            0x01 => Status::Unknown,
            0x02 => Status::Invalid,
            0x03 => Status::Busy,
            0x04 => Status::Timeout,
            0x05 => Status::NotFound,
            0x06 => Status::NoData,
            other => Status::Other(other),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Unknown => write!(f, "unknown error"),
            Status::Invalid => write!(f, "invalid command or payload"),
            Status::Busy => write!(f, "busy"),
            Status::Timeout => write!(f, "device timeout"),
            Status::NotFound => write!(f, "not found"),
            Status::NoData => write!(f, "no data"),
            Status::Other(code) => write!(f, "status 0x{:02X}", code),
        }
    }
}

/// Framing failures. These never reach a request caller; the reassembler
/// recovers from them by dropping bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid start byte: 0x{0:02X}")]
    InvalidStart(u8),

    #[error("Payload too large: {0} bytes (max {MAX_PAYLOAD})")]
    PayloadTooLarge(usize),

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
