//! Payload layouts for each tool command.
//!
//! All multi-byte integers are little-endian. Radio timings are signed
//! microsecond durations: positive for high level, negative for low.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::serial::{Result, SerialError};

/// Width of the NUL-terminated name field in a `DEVICE_INFO` reply.
pub const DEVICE_NAME_FIELD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub firmware_version: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 3 {
            return Err(malformed("device_info", payload.len()));
        }
        let firmware_version = format!("{}.{}.{}", payload[0], payload[1], payload[2]);
        Ok(Self {
            firmware_version,
            name: c_string(&payload[3..]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGhzCapture {
    pub frequency_hz: u32,
    pub timings: Vec<i32>,
}

impl SubGhzCapture {
    pub fn request(frequency_hz: u32, timeout_secs: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(6);
        out.put_u32_le(frequency_hz);
        out.put_u16_le(timeout_secs);
        out
    }

    /// Reply: `[data_len: u16][i32 timings]`.
    pub fn parse(frequency_hz: u32, payload: &[u8]) -> Result<Self> {
        let data = length_prefixed(payload, 0, "subghz_capture")?;
        let timings = data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { frequency_hz, timings })
    }

    /// Request: `[frequency: u32][data_len: u16][i32 timings]`.
    pub fn transmit_request(frequency_hz: u32, timings: &[i32]) -> Result<Vec<u8>> {
        let data_len = u16_len(timings.len() * 4, "subghz_transmit")?;
        let mut out = BytesMut::with_capacity(6 + timings.len() * 4);
        out.put_u32_le(frequency_hz);
        out.put_u16_le(data_len);
        for t in timings {
            out.put_i32_le(*t);
        }
        Ok(out.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NfcTagType {
    MifareClassic,
    MifareUltralight,
    Other(u8),
}

impl From<u8> for NfcTagType {
    fn from(code: u8) -> Self {
        match code {
            1 => NfcTagType::MifareClassic,
            2 => NfcTagType::MifareUltralight,
            other => NfcTagType::Other(other),
        }
    }
}

impl From<NfcTagType> for u8 {
    fn from(tag: NfcTagType) -> Self {
        match tag {
            NfcTagType::MifareClassic => 1,
            NfcTagType::MifareUltralight => 2,
            NfcTagType::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfcTag {
    pub tag_type: NfcTagType,
    pub uid: Vec<u8>,
    pub uid_hex: String,
}

impl NfcTag {
    pub fn new(tag_type: NfcTagType, uid: Vec<u8>) -> Self {
        let uid_hex = hex::encode_upper(&uid);
        Self { tag_type, uid, uid_hex }
    }

    /// Reply: `[type][uid_len][uid]`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(malformed("nfc_read", payload.len()));
        }
        let uid_len = payload[1] as usize;
        let uid = payload
            .get(2..2 + uid_len)
            .ok_or_else(|| malformed("nfc_read", payload.len()))?;
        Ok(Self::new(NfcTagType::from(payload[0]), uid.to_vec()))
    }

    /// Emulation request uses the same layout as the read reply.
    pub fn emulate_request(&self) -> Result<Vec<u8>> {
        let uid_len = u8::try_from(self.uid.len()).map_err(|_| {
            SerialError::ProtocolError(format!("UID of {} bytes does not fit nfc_emulate", self.uid.len()))
        })?;
        let mut out = Vec::with_capacity(2 + self.uid.len());
        out.push(u8::from(self.tag_type));
        out.push(uid_len);
        out.extend_from_slice(&self.uid);
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrCapture {
    pub protocol: u8,
    pub timings: Vec<u32>,
}

impl IrCapture {
    /// Reply: `[protocol][data_len: u16][u32 timings]`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(malformed("ir_receive", 0));
        }
        let data = length_prefixed(payload, 1, "ir_receive")?;
        let timings = data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self {
            protocol: payload[0],
            timings,
        })
    }

    /// Transmit request shares the reply layout.
    pub fn transmit_request(&self) -> Result<Vec<u8>> {
        let data_len = u16_len(self.timings.len() * 4, "ir_transmit")?;
        let mut out = BytesMut::with_capacity(3 + self.timings.len() * 4);
        out.put_u8(self.protocol);
        out.put_u16_le(data_len);
        for t in &self.timings {
            out.put_u32_le(*t);
        }
        Ok(out.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfidTagType {
    Unknown,
    Em4100,
    HidProx,
    Indala26,
}

impl From<u8> for RfidTagType {
    fn from(code: u8) -> Self {
        match code {
            1 => RfidTagType::Em4100,
            2 => RfidTagType::HidProx,
            3 => RfidTagType::Indala26,
            _ => RfidTagType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfidTag {
    pub tag_type: RfidTagType,
    pub data: Vec<u8>,
    pub data_hex: String,
}

impl RfidTag {
    /// Reply: `[type][data]`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (&tag_type, data) = payload
            .split_first()
            .ok_or_else(|| malformed("rfid_read", 0))?;
        Ok(Self {
            tag_type: RfidTagType::from(tag_type),
            data: data.to_vec(),
            data_hex: hex::encode_upper(data),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub path: String,
    pub entries: Vec<String>,
}

impl DirectoryListing {
    /// Reply: `[count]` followed by `count` NUL-terminated names.
    pub fn parse(path: &str, payload: &[u8]) -> Result<Self> {
        let (&count, mut rest) = payload
            .split_first()
            .ok_or_else(|| malformed("storage_list", 0))?;

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let end = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| malformed("storage_list", payload.len()))?;
            entries.push(String::from_utf8_lossy(&rest[..end]).into_owned());
            rest = &rest[end + 1..];
        }

        Ok(Self {
            path: path.to_string(),
            entries,
        })
    }
}

/// Path argument as the peripheral expects it: NUL-terminated.
pub fn path_request(path: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(path.len() + 1);
    out.extend_from_slice(path.as_bytes());
    out.push(0);
    out
}

/// Optional `[timeout_secs: u16]` argument of the read commands.
pub fn timeout_request(timeout_secs: u16) -> Vec<u8> {
    timeout_secs.to_le_bytes().to_vec()
}

/// `[len: u16][len bytes]` starting at `at`.
fn length_prefixed<'a>(payload: &'a [u8], at: usize, what: &str) -> Result<&'a [u8]> {
    let header = payload
        .get(at..at + 2)
        .ok_or_else(|| malformed(what, payload.len()))?;
    let len = u16::from_le_bytes([header[0], header[1]]) as usize;
    payload
        .get(at + 2..at + 2 + len)
        .ok_or_else(|| malformed(what, payload.len()))
}

/// Length field of a request; refuses values the field cannot carry.
fn u16_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| SerialError::ProtocolError(format!("{} data of {} bytes does not fit its length field", what, len)))
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn malformed(what: &str, len: usize) -> SerialError {
    SerialError::ProtocolError(format!("Malformed {} reply ({} bytes)", what, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_from_firmware_layout() {
        let mut payload = vec![0, 98, 3];
        payload.extend_from_slice(b"Flipper\0");
        payload.resize(35, 0);
        let info = DeviceInfo::parse(&payload).unwrap();
        assert_eq!(info.firmware_version, "0.98.3");
        assert_eq!(info.name, "Flipper");
    }

    #[test]
    fn subghz_timings_are_signed() {
        let mut payload = vec![8, 0];
        payload.extend_from_slice(&350i32.to_le_bytes());
        payload.extend_from_slice(&(-1050i32).to_le_bytes());
        let capture = SubGhzCapture::parse(433_920_000, &payload).unwrap();
        assert_eq!(capture.timings, vec![350, -1050]);
    }

    #[test]
    fn truncated_nfc_reply_is_rejected() {
        assert!(NfcTag::parse(&[1, 7, 0xAA, 0xBB]).is_err());
        let tag = NfcTag::parse(&[2, 4, 0x04, 0xA2, 0x2B, 0x11]).unwrap();
        assert_eq!(tag.tag_type, NfcTagType::MifareUltralight);
        assert_eq!(tag.uid_hex, "04A22B11");
    }

    #[test]
    fn listing_stops_at_count() {
        let payload = b"\x02apps\0infrared\0trailing";
        let listing = DirectoryListing::parse("/ext", payload).unwrap();
        assert_eq!(listing.entries, vec!["apps".to_string(), "infrared".to_string()]);
    }

    #[test]
    fn ir_transmit_matches_receive_layout() {
        let capture = IrCapture {
            protocol: 0,
            timings: vec![9000, 4500, 560],
        };
        assert_eq!(IrCapture::parse(&capture.transmit_request().unwrap()).unwrap(), capture);
    }

    #[test]
    fn oversized_length_fields_are_refused() {
        let tag = NfcTag::new(NfcTagType::MifareClassic, vec![0xAB; 256]);
        assert!(matches!(tag.emulate_request(), Err(SerialError::ProtocolError(_))));
        let tag = NfcTag::new(NfcTagType::MifareClassic, vec![0xAB; 255]);
        assert_eq!(tag.emulate_request().unwrap()[1], 255);

        let timings = vec![1i32; 16_384];
        assert!(SubGhzCapture::transmit_request(433_920_000, &timings).is_err());
        let capture = IrCapture {
            protocol: 0,
            timings: vec![1; 16_384],
        };
        assert!(capture.transmit_request().is_err());
    }

    #[test]
    fn rfid_reply() {
        let tag = RfidTag::parse(&[1, 0x1A, 0x00, 0x3F, 0x2C, 0x11]).unwrap();
        assert_eq!(tag.tag_type, RfidTagType::Em4100);
        assert_eq!(tag.data_hex, "1A003F2C11");
    }
}
