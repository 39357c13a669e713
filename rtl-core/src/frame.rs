//! Parse raw threat notifications into structured frames.
//!
//! Payload layout: one sequence byte followed by zero or more 3-byte
//! records `[number, distance, speed]`. A payload whose length is not
//! `1 + 3*n` is rejected as a whole rather than truncated.

use log::{debug, info, warn};
use serde::Serialize;

use crate::types::{
    RadarError, Result, ThreatRecord, MAX_THREATS_PER_NOTIFICATION, RECORD_LEN,
};

/// A decoded sensor notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Header byte. Consecutive halves of a split report differ by 2.
    pub sequence_id: u8,
    pub threats: Vec<ThreatRecord>,
}

impl Frame {
    pub fn new(sequence_id: u8, threats: Vec<ThreatRecord>) -> Self {
        Frame {
            sequence_id,
            threats,
        }
    }

    /// Re-encode into the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.threats.len() * RECORD_LEN);
        out.push(self.sequence_id);
        for t in &self.threats {
            out.extend_from_slice(&[t.number, t.distance, t.speed]);
        }
        out
    }
}

/// Number of records a payload of `len` bytes carries, if well-formed.
pub fn record_count(len: usize) -> Option<usize> {
    if len == 0 || (len - 1) % RECORD_LEN != 0 {
        return None;
    }
    Some((len - 1) / RECORD_LEN)
}

/// Decode one notification payload.
pub fn parse_frame(data: &[u8]) -> Result<Frame> {
    if data.is_empty() {
        return Err(RadarError::EmptyFrame);
    }
    let count =
        record_count(data.len()).ok_or(RadarError::MalformedFrame { len: data.len() })?;

    let sequence_id = data[0];
    if count > 0 {
        info!("threats found: {count}");
    }
    if count > MAX_THREATS_PER_NOTIFICATION {
        warn!(
            "frame {sequence_id} carries {count} records, device limit is {MAX_THREATS_PER_NOTIFICATION}"
        );
    }

    let threats: Vec<ThreatRecord> = data[1..]
        .chunks_exact(RECORD_LEN)
        .map(|r| ThreatRecord::new(r[0], r[1], r[2]))
        .collect();

    for (i, t) in threats.iter().enumerate() {
        debug!(
            "seq {sequence_id} index {}: number {} distance {} speed {}",
            i + 1,
            t.number,
            t.distance,
            t.speed
        );
    }

    Ok(Frame {
        sequence_id,
        threats,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
