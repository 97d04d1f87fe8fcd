use serialport::SerialPortType;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::{Result, SerialDeviceInfo, SerialError, Transport};

pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Serial port connection to the peripheral (USB CDC or a UART bridge).
pub struct SerialInterface {
    port: SerialStream,
    device_info: SerialDeviceInfo,
}

impl SerialInterface {
    /// List USB serial ports that could host a peripheral.
    pub fn discover_devices() -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let mut devices = Vec::new();

        for port in ports {
            if let SerialPortType::UsbPort(usb_info) = port.port_type {
                devices.push(SerialDeviceInfo {
                    port_name: port.port_name.clone(),
                    vid: usb_info.vid,
                    pid: usb_info.pid,
                    serial_number: usb_info.serial_number.clone(),
                    manufacturer: usb_info.manufacturer.clone(),
                    product: usb_info.product.clone(),
                });
            }
        }

        Ok(devices)
    }

    /// Open `port_name` at `baud_rate`.
    pub fn connect(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(port_name, baud_rate)
            .open_native_async()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", port_name, e)))?;

        let device_info = Self::discover_devices()
            .unwrap_or_default()
            .into_iter()
            .find(|d| d.port_name == port_name)
            .unwrap_or_else(|| SerialDeviceInfo {
                port_name: port_name.to_string(),
                vid: 0,
                pid: 0,
                serial_number: None,
                manufacturer: None,
                product: None,
            });

        log::info!("Connected to {} at {} baud", port_name, baud_rate);
        Ok(Self { port, device_info })
    }

    pub fn device_info(&self) -> &SerialDeviceInfo {
        &self.device_info
    }
}

#[async_trait::async_trait]
impl Transport for SerialInterface {
    async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data).await?;
        self.port.flush().await?;
        Ok(())
    }

    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.port.read(buf).await?)
    }
}

impl Drop for SerialInterface {
    fn drop(&mut self) {
        log::info!("Disconnecting from {}", self.device_info.port_name);
    }
}
