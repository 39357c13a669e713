//! Notification sources for the threat monitor.
//!
//! Input modes:
//! - `ReplaySource`: recorded notifications, one hex payload per line
//! - `DemoSource`:   synthetic sensor with overtaking traffic
//!
//! Both go through `connect`, which applies the same checks as pairing with
//! a real sensor: name prefix first, then the radar service, then the threat
//! characteristic.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::io::AsyncReadExt;

use rtl_core::config::SensorConfig;
use rtl_core::frame::Frame;
use rtl_core::types::{
    hex_decode, RadarError, ThreatRecord, MAX_THREATS_PER_NOTIFICATION, RADAR_SERVICE_UUID,
    THREAT_CHARACTERISTIC_UUID,
};

/// One raw payload as delivered by the sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub payload: Vec<u8>,
    /// Seconds since the start of the stream.
    pub timestamp: f64,
}

/// Ordered, best-effort stream of threat notifications.
#[async_trait]
pub trait NotificationSource: Send {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Name the sensor advertises.
    fn advertised_name(&self) -> String;

    /// Service UUIDs the sensor exposes.
    fn services(&self) -> Vec<String>;

    /// Characteristic UUIDs under the radar service.
    fn characteristics(&self) -> Vec<String>;

    /// Next payload, or `None` once the stream has ended.
    async fn next_notification(&mut self) -> Option<Notification>;
}

// ---------------------------------------------------------------------------
// Startup checks
// ---------------------------------------------------------------------------

/// Pick the first candidate whose name matches and that offers the radar
/// service and threat characteristic.
///
/// Fails with `SensorNotFound` when no name matches, `ServiceMissing` when
/// the matching sensor lacks the service, and `CharacteristicMissing` when
/// the service has no threat characteristic.
pub fn connect(
    candidates: Vec<Box<dyn NotificationSource>>,
    sensor: &SensorConfig,
) -> Result<Box<dyn NotificationSource>, RadarError> {
    for (i, c) in candidates.iter().enumerate() {
        debug!("device {i}: {}", c.advertised_name());
    }

    let source = candidates
        .into_iter()
        .find(|c| c.advertised_name().starts_with(&sensor.name_prefix))
        .ok_or_else(|| RadarError::SensorNotFound {
            prefix: sensor.name_prefix.clone(),
        })?;

    if !has_uuid(&source.services(), &sensor.service_uuid) {
        return Err(RadarError::ServiceMissing {
            uuid: sensor.service_uuid.clone(),
        });
    }
    if !has_uuid(&source.characteristics(), &sensor.characteristic_uuid) {
        return Err(RadarError::CharacteristicMissing {
            uuid: sensor.characteristic_uuid.clone(),
        });
    }

    info!("connected to {}", source.describe());
    Ok(source)
}

fn has_uuid(offered: &[String], wanted: &str) -> bool {
    offered.iter().any(|u| u.eq_ignore_ascii_case(wanted))
}

// ---------------------------------------------------------------------------
// Capture file parsing
// ---------------------------------------------------------------------------

/// Parse one capture line.
///
/// Accepts `hex` or `hex;timestamp`. Whitespace inside the hex is ignored,
/// so `05 01 0A 3C` works too. Blank lines and `#` comments yield `None`.
pub fn parse_capture_line(line: &str) -> Result<Option<(Vec<u8>, Option<f64>)>, RadarError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (hex_part, ts) = match line.split_once(';') {
        Some((h, t)) => (h, t.trim().parse::<f64>().ok()),
        None => (line, None),
    };

    let hex: String = hex_part.chars().filter(|c| !c.is_whitespace()).collect();
    if hex.is_empty() {
        return Err(RadarError::InvalidHex(hex_part.to_string()));
    }
    let payload = hex_decode(&hex).ok_or_else(|| RadarError::InvalidHex(hex.clone()))?;
    Ok(Some((payload, ts)))
}

/// Parse a whole capture. Bad lines are logged and skipped; their count is
/// returned alongside the notifications.
pub fn parse_capture_text(text: &str) -> (Vec<Notification>, usize) {
    let mut out = Vec::new();
    let mut skipped = 0;
    let mut timestamp = 0.0f64;

    for (lineno, line) in text.lines().enumerate() {
        match parse_capture_line(line) {
            Ok(Some((payload, ts))) => {
                let ts = ts.unwrap_or(timestamp);
                // Auto-increment for files without timestamps
                timestamp = ts + 0.1;
                out.push(Notification {
                    payload,
                    timestamp: ts,
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!("line {}: {e}", lineno + 1);
                skipped += 1;
            }
        }
    }

    (out, skipped)
}

// ---------------------------------------------------------------------------
// Replay source
// ---------------------------------------------------------------------------

/// Replays a recorded capture.
pub struct ReplaySource {
    label: String,
    queue: VecDeque<Notification>,
    realtime: bool,
    last_timestamp: Option<f64>,
    pub skipped_lines: usize,
}

impl ReplaySource {
    /// Open a capture file, or stdin for `-`.
    pub async fn open(path: &Path, realtime: bool) -> Result<Self, RadarError> {
        let text = if path.to_str() == Some("-") {
            let mut s = String::new();
            tokio::io::stdin().read_to_string(&mut s).await?;
            s
        } else {
            tokio::fs::read_to_string(path).await?
        };
        Ok(Self::from_text(&path.display().to_string(), &text, realtime))
    }

    pub fn from_text(label: &str, text: &str, realtime: bool) -> Self {
        let (notifications, skipped) = parse_capture_text(text);
        ReplaySource {
            label: label.to_string(),
            queue: notifications.into(),
            realtime,
            last_timestamp: None,
            skipped_lines: skipped,
        }
    }

}

#[async_trait]
impl NotificationSource for ReplaySource {
    fn describe(&self) -> String {
        format!("replay of {} ({} notifications)", self.label, self.queue.len())
    }

    fn advertised_name(&self) -> String {
        "RTL-REPLAY".into()
    }

    fn services(&self) -> Vec<String> {
        vec![RADAR_SERVICE_UUID.into()]
    }

    fn characteristics(&self) -> Vec<String> {
        vec![THREAT_CHARACTERISTIC_UUID.into()]
    }

    async fn next_notification(&mut self) -> Option<Notification> {
        let next = self.queue.pop_front()?;
        if self.realtime {
            if let Some(prev) = self.last_timestamp {
                let gap = next.timestamp - prev;
                if gap > 0.0 {
                    tokio::time::sleep(Duration::from_secs_f64(gap)).await;
                }
            }
        }
        self.last_timestamp = Some(next.timestamp);
        Some(next)
    }
}

// ---------------------------------------------------------------------------
// Demo source
// ---------------------------------------------------------------------------

/// Vehicles enter the radar field at this distance (m).
const SPAWN_DISTANCE: f64 = 150.0;

/// Assumed bike speed, in the same units as threat speed.
const BIKE_SPEED: f64 = 25.0;

/// Metres closed per tick for each unit of speed difference.
const CLOSING_SCALE: f64 = 0.05;

/// Vehicles in view at once. Fits in one report plus one continuation.
const DEMO_MAX_VEHICLES: usize = 8;

#[derive(Debug, Clone)]
struct DemoVehicle {
    number: u8,
    distance: f64,
    speed: u8,
}

/// Synthetic sensor.
///
/// Keeps up to eight cars closing in from 150 m. Reports with more
/// than six cars are split in two, the second carrying sequence id + 2.
pub struct DemoSource {
    rng: StdRng,
    vehicles: Vec<DemoVehicle>,
    spawn_chance: f64,
    sequence: u8,
    pending: Option<Vec<u8>>,
    interval: Duration,
    remaining: Option<u64>,
    timestamp: f64,
    services: Vec<String>,
    characteristics: Vec<String>,
}

impl DemoSource {
    pub fn new(seed: u64, interval: Duration, frames: Option<u64>) -> Self {
        DemoSource {
            rng: StdRng::seed_from_u64(seed),
            vehicles: Vec::new(),
            spawn_chance: 0.3,
            sequence: 0,
            pending: None,
            interval,
            remaining: frames,
            timestamp: 0.0,
            services: vec![RADAR_SERVICE_UUID.into()],
            characteristics: vec![THREAT_CHARACTERISTIC_UUID.into()],
        }
    }

    #[cfg(test)]
    fn with_spawn_chance(mut self, chance: f64) -> Self {
        self.spawn_chance = chance.clamp(0.0, 1.0);
        self
    }

    #[cfg(test)]
    fn with_services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }

    #[cfg(test)]
    fn with_characteristics(mut self, characteristics: Vec<String>) -> Self {
        self.characteristics = characteristics;
        self
    }

    /// Advance traffic by one tick.
    fn step(&mut self) {
        for v in &mut self.vehicles {
            let closing = (v.speed as f64 - BIKE_SPEED).max(1.0) * CLOSING_SCALE;
            v.distance -= closing;
        }
        self.vehicles.retain(|v| v.distance > 0.0);

        if self.vehicles.len() < DEMO_MAX_VEHICLES && self.rng.gen_bool(self.spawn_chance) {
            let number = (1..=u8::MAX)
                .find(|n| self.vehicles.iter().all(|v| v.number != *n))
                .unwrap_or(u8::MAX);
            let speed = self.rng.gen_range(40..=130);
            self.vehicles.push(DemoVehicle {
                number,
                distance: SPAWN_DISTANCE,
                speed,
            });
        }
    }

    fn current_records(&self) -> Vec<ThreatRecord> {
        let mut records: Vec<ThreatRecord> = self
            .vehicles
            .iter()
            .map(|v| ThreatRecord::new(v.number, v.distance.round() as u8, v.speed))
            .collect();
        records.sort_by_key(|r| r.distance);
        records
    }

    /// Build the next payload without pacing.
    fn next_payload(&mut self) -> Vec<u8> {
        if let Some(p) = self.pending.take() {
            return p;
        }

        self.step();
        let records = self.current_records();

        self.sequence = self.sequence.wrapping_add(1);
        let split = records.len().min(MAX_THREATS_PER_NOTIFICATION);
        let first = Frame::new(self.sequence, records[..split].to_vec()).to_bytes();
        if records.len() > split {
            self.sequence = self.sequence.wrapping_add(2);
            let rest = Frame::new(self.sequence, records[split..].to_vec());
            self.pending = Some(rest.to_bytes());
        }
        first
    }
}

#[async_trait]
impl NotificationSource for DemoSource {
    fn describe(&self) -> String {
        format!("demo sensor (up to {DEMO_MAX_VEHICLES} vehicles)")
    }

    fn advertised_name(&self) -> String {
        "RTL515-DEMO".into()
    }

    fn services(&self) -> Vec<String> {
        self.services.clone()
    }

    fn characteristics(&self) -> Vec<String> {
        self.characteristics.clone()
    }

    async fn next_notification(&mut self) -> Option<Notification> {
        if let Some(left) = self.remaining.as_mut() {
            if *left == 0 {
                return None;
            }
            *left -= 1;
        }

        // Second halves follow their first half immediately.
        if self.pending.is_none() && !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
            self.timestamp += self.interval.as_secs_f64();
        }

        let payload = self.next_payload();
        Some(Notification {
            payload,
            timestamp: self.timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rtl_core::config::Config;
    use rtl_core::continuation::ContinuationResolver;
    use rtl_core::frame::parse_frame;
    use std::io::Write;

    #[test]
    fn test_parse_capture_line_plain() {
        let (payload, ts) = parse_capture_line("05010A3C").unwrap().unwrap();
        assert_eq!(payload, vec![0x05, 0x01, 0x0A, 0x3C]);
        assert_eq!(ts, None);
    }

    #[test]
    fn test_parse_capture_line_spaced_with_timestamp() {
        let (payload, ts) = parse_capture_line("  05 01 0a 3c ; 12.5 ").unwrap().unwrap();
        assert_eq!(payload, vec![0x05, 0x01, 0x0A, 0x3C]);
        assert_eq!(ts, Some(12.5));
    }

    #[test]
    fn test_parse_capture_line_skips_comments() {
        assert!(parse_capture_line("# recorded 2024-05-01").unwrap().is_none());
        assert!(parse_capture_line("   ").unwrap().is_none());
    }

    #[test]
    fn test_parse_capture_line_invalid() {
        assert!(matches!(
            parse_capture_line("not hex"),
            Err(RadarError::InvalidHex(_))
        ));
        assert!(matches!(
            parse_capture_line("050"),
            Err(RadarError::InvalidHex(_))
        ));
        assert!(matches!(
            parse_capture_line(";1.0"),
            Err(RadarError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_parse_capture_text_timestamps() {
        let text = "# header\n05010A3C;1.0\n06\nzz\n07;3.0\n";
        let (notes, skipped) = parse_capture_text(text);
        assert_eq!(skipped, 1);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].timestamp, 1.0);
        assert_eq!(notes[1].timestamp, 1.1);
        assert_eq!(notes[2].timestamp, 3.0);
    }

    #[tokio::test]
    async fn test_replay_source_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "05010A3C02288C").unwrap();
        writeln!(file, "0703").unwrap();
        let mut source = ReplaySource::open(file.path(), false).await.unwrap();

        let n = source.next_notification().await.unwrap();
        assert_eq!(n.payload, vec![5, 1, 10, 60, 2, 40, 140]);
        let n = source.next_notification().await.unwrap();
        assert_eq!(n.payload, vec![7, 3]);
        assert!(source.next_notification().await.is_none());
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_error() {
        let result = ReplaySource::open(Path::new("/nonexistent/capture.txt"), false).await;
        assert!(matches!(result, Err(RadarError::Io(_))));
    }

    #[test]
    fn test_connect_accepts_replay() {
        let config = Config::default();
        let source: Box<dyn NotificationSource> = Box::new(ReplaySource::from_text("t", "", false));
        assert!(connect(vec![source], &config.sensor).is_ok());
    }

    #[test]
    fn test_connect_no_matching_name() {
        let mut config = Config::default();
        config.sensor.name_prefix = "Varia".into();
        let source: Box<dyn NotificationSource> = Box::new(ReplaySource::from_text("t", "", false));
        let err = connect(vec![source], &config.sensor).err().unwrap();
        assert!(matches!(err, RadarError::SensorNotFound { .. }));
    }

    #[test]
    fn test_connect_no_candidates() {
        let config = Config::default();
        let err = connect(Vec::new(), &config.sensor).err().unwrap();
        assert!(matches!(err, RadarError::SensorNotFound { .. }));
    }

    #[test]
    fn test_connect_missing_service() {
        let config = Config::default();
        let source: Box<dyn NotificationSource> = Box::new(
            DemoSource::new(1, Duration::ZERO, Some(1))
                .with_services(vec!["0000180f-0000-1000-8000-00805f9b34fb".into()]),
        );
        let err = connect(vec![source], &config.sensor).err().unwrap();
        assert!(matches!(err, RadarError::ServiceMissing { .. }));
    }

    #[test]
    fn test_connect_missing_characteristic() {
        let config = Config::default();
        let source: Box<dyn NotificationSource> = Box::new(
            DemoSource::new(1, Duration::ZERO, Some(1)).with_characteristics(Vec::new()),
        );
        let err = connect(vec![source], &config.sensor).err().unwrap();
        assert!(matches!(err, RadarError::CharacteristicMissing { .. }));
    }

    #[test]
    fn test_connect_checks_configured_characteristic() {
        let mut config = Config::default();
        config.sensor.characteristic_uuid = "00000000-dead-beef-0000-000000000000".into();
        let source: Box<dyn NotificationSource> = Box::new(ReplaySource::from_text("t", "", false));
        let err = connect(vec![source], &config.sensor).err().unwrap();
        match err {
            RadarError::CharacteristicMissing { uuid } => {
                assert_eq!(uuid, "00000000-dead-beef-0000-000000000000");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_connect_uuid_case_insensitive() {
        let mut config = Config::default();
        config.sensor.service_uuid = RADAR_SERVICE_UUID.to_ascii_uppercase();
        config.sensor.characteristic_uuid = THREAT_CHARACTERISTIC_UUID.to_ascii_uppercase();
        let source: Box<dyn NotificationSource> = Box::new(ReplaySource::from_text("t", "", false));
        assert!(connect(vec![source], &config.sensor).is_ok());
    }

    #[test]
    fn test_connect_picks_first_match() {
        let config = Config::default();
        let other: Box<dyn NotificationSource> = Box::new(
            DemoSource::new(1, Duration::ZERO, None).with_services(Vec::new()),
        );
        struct Named(&'static str);
        #[async_trait]
        impl NotificationSource for Named {
            fn describe(&self) -> String {
                self.0.into()
            }
            fn advertised_name(&self) -> String {
                self.0.into()
            }
            fn services(&self) -> Vec<String> {
                Vec::new()
            }
            fn characteristics(&self) -> Vec<String> {
                Vec::new()
            }
            async fn next_notification(&mut self) -> Option<Notification> {
                None
            }
        }
        let headphones: Box<dyn NotificationSource> = Box::new(Named("Headphones"));
        // The demo sensor matches the prefix first but has no radar service.
        let err = connect(vec![headphones, other], &config.sensor).err().unwrap();
        assert!(matches!(err, RadarError::ServiceMissing { .. }));
    }

    #[tokio::test]
    async fn test_demo_frame_limit() {
        let mut source = DemoSource::new(7, Duration::ZERO, Some(5));
        let mut count = 0;
        while source.next_notification().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_demo_is_deterministic() {
        let mut a = DemoSource::new(42, Duration::ZERO, Some(200));
        let mut b = DemoSource::new(42, Duration::ZERO, Some(200));
        while let Some(na) = a.next_notification().await {
            let nb = b.next_notification().await.unwrap();
            assert_eq!(na.payload, nb.payload);
        }
    }

    #[tokio::test]
    async fn test_demo_splits_crowded_reports() {
        let mut source = DemoSource::new(3, Duration::ZERO, Some(2000)).with_spawn_chance(1.0);
        let mut resolver = ContinuationResolver::new();
        let mut prev_seq: Option<u8> = None;
        let mut splits = 0;

        while let Some(n) = source.next_notification().await {
            let frame = parse_frame(&n.payload).unwrap();
            assert!(frame.threats.len() <= MAX_THREATS_PER_NOTIFICATION);

            let resolved = resolver.resolve(&frame);
            if let Some(prev) = prev_seq {
                if ContinuationResolver::is_continuation(prev, frame.sequence_id) {
                    splits += 1;
                    assert!(resolved.len() > MAX_THREATS_PER_NOTIFICATION);
                } else {
                    assert_eq!(frame.sequence_id, prev.wrapping_add(1));
                }
            }
            assert!(resolved.len() <= DEMO_MAX_VEHICLES);
            prev_seq = Some(frame.sequence_id);
        }
        assert!(splits > 0, "expected at least one split report");
    }
}
