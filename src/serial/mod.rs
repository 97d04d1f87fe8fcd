pub mod interface;
pub mod transport;

pub use interface::SerialInterface;
pub use transport::{StreamTransport, Transport};

use serde::{Deserialize, Serialize};

use crate::protocol::{FrameError, Status};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No response arrived before the request deadline.
    #[error("Communication timeout")]
    Timeout,

    /// The peripheral answered with a non-zero status.
    #[error("Device error: {0}")]
    Device(Status),

    #[error("Too many outstanding requests")]
    TooManyOutstanding,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Stream desynchronized: {0} bytes discarded without a frame")]
    Desynchronized(usize),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

impl SerialError {
    /// Link timeouts and device-reported timeouts; both are usually safe
    /// to retry, unlike `Busy` or `Invalid`.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SerialError::Timeout | SerialError::Device(Status::Timeout))
    }

    /// Status code carried by an application-level rejection.
    pub fn status(&self) -> Option<Status> {
        match self {
            SerialError::Device(status) => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;
