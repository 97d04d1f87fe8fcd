//! Tool commands available on the peripheral and a typed client for them.

pub mod client;
pub mod models;

pub use client::ToolClient;
pub use models::*;

use serde::{Deserialize, Serialize};

/// Command identifiers. The transport treats these as opaque routing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    Ping = 0x01,
    DeviceInfo = 0x02,
    SubGhzCapture = 0x10,
    SubGhzTransmit = 0x11,
    NfcRead = 0x20,
    NfcEmulate = 0x21,
    IrReceive = 0x30,
    IrTransmit = 0x31,
    RfidRead = 0x40,
    StorageList = 0x50,
    StorageRead = 0x51,
    /// Reserved for fetching the rest of a sized response.
    DataContinue = 0x60,
}

impl Command {
    pub const ALL: [Command; 12] = [
        Command::Ping,
        Command::DeviceInfo,
        Command::SubGhzCapture,
        Command::SubGhzTransmit,
        Command::NfcRead,
        Command::NfcEmulate,
        Command::IrReceive,
        Command::IrTransmit,
        Command::RfidRead,
        Command::StorageList,
        Command::StorageRead,
        Command::DataContinue,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Commands that wait on a physical signal or tag before replying.
    pub fn blocks_on_signal(self) -> bool {
        matches!(
            self,
            Command::SubGhzCapture | Command::NfcRead | Command::IrReceive | Command::RfidRead
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::DeviceInfo => "device_info",
            Command::SubGhzCapture => "subghz_capture",
            Command::SubGhzTransmit => "subghz_transmit",
            Command::NfcRead => "nfc_read",
            Command::NfcEmulate => "nfc_emulate",
            Command::IrReceive => "ir_receive",
            Command::IrTransmit => "ir_transmit",
            Command::RfidRead => "rfid_read",
            Command::StorageList => "storage_list",
            Command::StorageRead => "storage_read",
            Command::DataContinue => "data_continue",
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command.code()
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Command::ALL.into_iter().find(|c| c.code() == code).ok_or(code)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.as_str(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::try_from(command.code()), Ok(command));
        }
        assert_eq!(Command::try_from(0x99), Err(0x99));
        assert_eq!(u8::from(Command::DataContinue), 0x60);
    }
}
