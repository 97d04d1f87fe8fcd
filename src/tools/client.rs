use std::time::Duration;

use bytes::Bytes;

use super::models::*;
use super::Command;
use crate::config::LinkConfig;
use crate::serial::{Result, SerialError, SerialInterface};
use crate::session::{complete_sized, Response, SessionBuilder, SessionHandle};

/// Typed operations over a running session.
///
/// Every method issues one request (plus follow-ups for sized responses)
/// and maps a non-zero status to `SerialError::Device`.
#[derive(Clone)]
pub struct ToolClient {
    session: SessionHandle,
    config: LinkConfig,
}

impl ToolClient {
    pub fn new(session: SessionHandle, config: LinkConfig) -> Self {
        Self { session, config }
    }

    /// Open the configured port, or the first discovered device, and start
    /// a session on it.
    pub fn connect(config: LinkConfig) -> Result<Self> {
        let port_name = match &config.port {
            Some(port) => port.clone(),
            None => SerialInterface::discover_devices()?
                .into_iter()
                .next()
                .map(|d| d.port_name)
                .ok_or_else(|| SerialError::PortNotFound("no USB serial devices".to_string()))?,
        };

        let interface = SerialInterface::connect(&port_name, config.baud_rate)?;
        let session = SessionBuilder::new(interface).config(&config).build();
        Ok(Self::new(session, config))
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    async fn request(&self, command: Command, payload: impl Into<Bytes>) -> Result<Response> {
        self.session
            .send(command, payload, self.config.timeout_for(command))
            .await
    }

    /// Capture commands carry their own device-side timeout; the link must
    /// wait at least that long plus a normal round trip.
    async fn capture(&self, command: Command, payload: Vec<u8>, timeout_secs: u16) -> Result<Response> {
        let device_wait = Duration::from_secs(u64::from(timeout_secs)) + self.config.default_timeout();
        let timeout = self.config.timeout_for(command).max(device_wait);
        log::debug!("{} waiting up to {:?}", command, timeout);
        self.session.send(command, payload, timeout).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.request(Command::Ping, Bytes::new()).await?;
        Ok(())
    }

    pub async fn device_info(&self) -> Result<DeviceInfo> {
        let reply = self.request(Command::DeviceInfo, Bytes::new()).await?;
        DeviceInfo::parse(&reply.payload)
    }

    pub async fn subghz_capture(&self, frequency_hz: u32, timeout_secs: u16) -> Result<SubGhzCapture> {
        let payload = SubGhzCapture::request(frequency_hz, timeout_secs);
        let reply = self.capture(Command::SubGhzCapture, payload, timeout_secs).await?;
        SubGhzCapture::parse(frequency_hz, &reply.payload)
    }

    pub async fn subghz_transmit(&self, frequency_hz: u32, timings: &[i32]) -> Result<()> {
        let payload = SubGhzCapture::transmit_request(frequency_hz, timings)?;
        self.request(Command::SubGhzTransmit, payload).await?;
        Ok(())
    }

    pub async fn nfc_read(&self, timeout_secs: u16) -> Result<NfcTag> {
        let reply = self
            .capture(Command::NfcRead, timeout_request(timeout_secs), timeout_secs)
            .await?;
        NfcTag::parse(&reply.payload)
    }

    pub async fn nfc_emulate(&self, tag: &NfcTag) -> Result<()> {
        self.request(Command::NfcEmulate, tag.emulate_request()?).await?;
        Ok(())
    }

    pub async fn ir_receive(&self, timeout_secs: u16) -> Result<IrCapture> {
        let reply = self
            .capture(Command::IrReceive, timeout_request(timeout_secs), timeout_secs)
            .await?;
        IrCapture::parse(&reply.payload)
    }

    pub async fn ir_transmit(&self, capture: &IrCapture) -> Result<()> {
        self.request(Command::IrTransmit, capture.transmit_request()?).await?;
        Ok(())
    }

    pub async fn rfid_read(&self, timeout_secs: u16) -> Result<RfidTag> {
        let reply = self
            .capture(Command::RfidRead, timeout_request(timeout_secs), timeout_secs)
            .await?;
        RfidTag::parse(&reply.payload)
    }

    pub async fn storage_list(&self, path: &str) -> Result<DirectoryListing> {
        let reply = self.request(Command::StorageList, path_request(path)).await?;
        DirectoryListing::parse(path, &reply.payload)
    }

    /// Read a whole file, following up with `DATA_CONTINUE` until done.
    pub async fn storage_read(&self, path: &str) -> Result<Bytes> {
        let first = self.request(Command::StorageRead, path_request(path)).await?;
        let data = complete_sized(&self.session, &first.payload, self.config.default_timeout()).await?;
        log::info!("Read {} ({} bytes)", path, data.len());
        Ok(data)
    }
}
