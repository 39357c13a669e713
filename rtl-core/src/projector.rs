//! Map threat distance/speed onto the display lane.

use serde::Serialize;

use crate::types::{RadarError, ThreatClass};

/// Display and severity constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectorConfig {
    /// Distance (m) that maps to the far left edge of the lane.
    pub reference_distance: f64,
    /// Lane width in display units; the bike sits at this x.
    pub screen_width: f64,
    /// Highest speed still classed LOW (inclusive).
    pub low_speed_max: u8,
    /// Highest speed still classed MEDIUM (inclusive).
    pub medium_speed_max: u8,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        ProjectorConfig {
            reference_distance: 150.0,
            screen_width: 1200.0,
            low_speed_max: 70,
            medium_speed_max: 100,
        }
    }
}

impl ProjectorConfig {
    /// Check that the constants describe a usable projection: finite,
    /// positive extents and speed thresholds in order.
    pub fn validate(&self) -> Result<(), RadarError> {
        for (name, value) in [
            ("reference_distance", self.reference_distance),
            ("screen_width", self.screen_width),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(RadarError::Config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.low_speed_max > self.medium_speed_max {
            return Err(RadarError::Config(format!(
                "low_speed_max {} is above medium_speed_max {}",
                self.low_speed_max, self.medium_speed_max
            )));
        }
        Ok(())
    }
}

/// Stateless projection from raw threat values to display values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Projector {
    config: ProjectorConfig,
}

impl Projector {
    pub fn new(config: ProjectorConfig) -> Self {
        Projector { config }
    }

    /// Horizontal position: 0 at the reference distance, `screen_width`
    /// right at the bike. Vehicles beyond the reference distance land at
    /// negative x, off-screen.
    pub fn position(&self, distance: u8) -> f64 {
        let reference = self.config.reference_distance;
        ((reference - distance as f64) / reference) * self.config.screen_width
    }

    pub fn classify(&self, speed: u8) -> ThreatClass {
        if speed <= self.config.low_speed_max {
            ThreatClass::Low
        } else if speed <= self.config.medium_speed_max {
            ThreatClass::Medium
        } else {
            ThreatClass::High
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
