//! Link configuration.
//!
//! Timeouts are configuration, not protocol: nothing here appears on the
//! wire. Commands that wait on a physical event (radio capture, tag reads)
//! use the longer capture class.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::MAX_FRAME_SIZE;
use crate::serial::interface::DEFAULT_BAUD_RATE;
use crate::serial::{Result, SerialError};
use crate::tools::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial port path; `None` means pick the first discovered device.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "LinkConfig::default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "LinkConfig::default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "LinkConfig::default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    /// Bytes discarded without a single good frame before the stream is
    /// declared desynchronized.
    #[serde(default = "LinkConfig::default_max_unframed_bytes")]
    pub max_unframed_bytes: usize,
    /// Depth of the request queue into the session task.
    #[serde(default = "LinkConfig::default_command_capacity")]
    pub command_capacity: usize,
}

impl LinkConfig {
    fn default_baud_rate() -> u32 {
        DEFAULT_BAUD_RATE
    }
    fn default_timeout_ms() -> u64 {
        2000
    }
    fn default_capture_timeout_ms() -> u64 {
        35_000
    }
    fn default_max_unframed_bytes() -> usize {
        4 * MAX_FRAME_SIZE
    }
    fn default_command_capacity() -> usize {
        64
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No link config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let mut cfg: LinkConfig = serde_json::from_str(&text)
            .map_err(|e| SerialError::ProtocolError(format!("Invalid config {}: {}", path.display(), e)))?;
        cfg.fill_zeroes();
        Ok(cfg)
    }

    fn fill_zeroes(&mut self) {
        if self.baud_rate == 0 {
            self.baud_rate = Self::default_baud_rate();
        }
        if self.default_timeout_ms == 0 {
            self.default_timeout_ms = Self::default_timeout_ms();
        }
        if self.capture_timeout_ms == 0 {
            self.capture_timeout_ms = Self::default_capture_timeout_ms();
        }
        if self.max_unframed_bytes == 0 {
            self.max_unframed_bytes = Self::default_max_unframed_bytes();
        }
        if self.command_capacity == 0 {
            self.command_capacity = Self::default_command_capacity();
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Timeout class for `command`.
    pub fn timeout_for(&self, command: Command) -> Duration {
        if command.blocks_on_signal() {
            self.capture_timeout()
        } else {
            self.default_timeout()
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: Self::default_baud_rate(),
            default_timeout_ms: Self::default_timeout_ms(),
            capture_timeout_ms: Self::default_capture_timeout_ms(),
            max_unframed_bytes: Self::default_max_unframed_bytes(),
            command_capacity: Self::default_command_capacity(),
        }
    }
}
