//! Shared types, error enum, and protocol constants for rtl-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by rtl-core.
#[derive(Debug, Error)]
pub enum RadarError {
    #[error("malformed frame: payload length {len} is not 1 + 3*n")]
    MalformedFrame { len: usize },
    #[error("empty frame: payload has no sequence byte")]
    EmptyFrame,
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("no sensor found with name prefix {prefix:?}")]
    SensorNotFound { prefix: String },
    #[error("radar service {uuid} not offered by sensor")]
    ServiceMissing { uuid: String },
    #[error("threat characteristic {uuid} not offered by sensor")]
    CharacteristicMissing { uuid: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RadarError>;

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// GATT service exposed by RTL rear-view radars.
pub const RADAR_SERVICE_UUID: &str = "6a4e3200-667b-11e3-949a-0800200c9a66";

/// Characteristic that notifies threat payloads.
pub const THREAT_CHARACTERISTIC_UUID: &str = "6a4e3203-667b-11e3-949a-0800200c9a66";

/// Advertised device names of supported sensors start with this.
pub const SENSOR_NAME_PREFIX: &str = "RTL";

/// Bytes per threat record (number, distance, speed).
pub const RECORD_LEN: usize = 3;

/// The sensor never packs more records than this into one notification.
/// Anything beyond it is carried by a continuation notification.
pub const MAX_THREATS_PER_NOTIFICATION: usize = 6;

// ---------------------------------------------------------------------------
// Threat records
// ---------------------------------------------------------------------------

/// One vehicle as reported by the sensor.
///
/// `number` is a slot id assigned by the device. It is stable while the
/// vehicle stays in view and gets reused for unrelated vehicles later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ThreatRecord {
    pub number: u8,
    /// Metres behind the bike.
    pub distance: u8,
    /// Approach speed as reported by the device.
    pub speed: u8,
}

impl ThreatRecord {
    pub fn new(number: u8, distance: u8, speed: u8) -> Self {
        ThreatRecord {
            number,
            distance,
            speed,
        }
    }
}

/// Severity bucket derived from approach speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatClass {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ThreatClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatClass::Low => write!(f, "low"),
            ThreatClass::Medium => write!(f, "medium"),
            ThreatClass::High => write!(f, "high"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
