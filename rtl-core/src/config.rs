//! Configuration file management for rtl-radar.
//!
//! Reads/writes `~/.rtl-radar/config.yaml` with projection constants,
//! sensor identifiers, and display pacing.

use std::path::{Path, PathBuf};

use crate::projector::ProjectorConfig;
use crate::types::{RadarError, RADAR_SERVICE_UUID, SENSOR_NAME_PREFIX, THREAT_CHARACTERISTIC_UUID};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub projector: ProjectorConfig,
    pub sensor: SensorConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    pub name_prefix: String,
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    /// Render refresh period in milliseconds.
    pub tick_ms: u64,
    /// Diffs buffered between decode and render before the decoder waits.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            projector: ProjectorConfig::default(),
            sensor: SensorConfig {
                name_prefix: SENSOR_NAME_PREFIX.into(),
                service_uuid: RADAR_SERVICE_UUID.into(),
                characteristic_uuid: THREAT_CHARACTERISTIC_UUID.into(),
            },
            display: DisplayConfig {
                tick_ms: 100,
                queue_depth: 32,
            },
        }
    }
}

/// Get the config directory path (`~/.rtl-radar/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".rtl-radar")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.rtl-radar/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("cannot read {}: {e}, using defaults", path.display());
            return Config::default();
        }
    };

    match parse_config(&text) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{}: {e}, using defaults", path.display());
            Config::default()
        }
    }
}

/// Save config to `~/.rtl-radar/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, RadarError> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), RadarError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RadarError::Config(e.to_string()))?;
    }
    let text = serialize_config(config);
    std::fs::write(path, text).map_err(|e| RadarError::Config(e.to_string()))?;
    Ok(())
}

/// Parse simple YAML-like config text.
///
/// Unknown keys and unparseable values are ignored. A line that is not
/// `key: value`, or projector constants that fail validation, reject the
/// whole file.
pub fn parse_config(text: &str) -> Result<Config, RadarError> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            return Err(RadarError::Config(format!(
                "line {}: expected `key: value`, got {stripped:?}",
                lineno + 1
            )));
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = if val.is_empty() {
                Some(key.to_string())
            } else {
                None
            };
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        match section {
            "projector" => match key {
                "reference_distance" => {
                    if let Ok(v) = val.parse::<f64>() {
                        config.projector.reference_distance = v;
                    }
                }
                "screen_width" => {
                    if let Ok(v) = val.parse::<f64>() {
                        config.projector.screen_width = v;
                    }
                }
                "low_speed_max" => {
                    if let Ok(v) = val.parse::<u8>() {
                        config.projector.low_speed_max = v;
                    }
                }
                "medium_speed_max" => {
                    if let Ok(v) = val.parse::<u8>() {
                        config.projector.medium_speed_max = v;
                    }
                }
                _ => {}
            },
            "sensor" => {
                let target = match key {
                    "name_prefix" => &mut config.sensor.name_prefix,
                    "service_uuid" => &mut config.sensor.service_uuid,
                    "characteristic_uuid" => &mut config.sensor.characteristic_uuid,
                    _ => continue,
                };
                if let Some(v) = parse_string_value(val) {
                    *target = v;
                }
            }
            "display" => match key {
                "tick_ms" => {
                    if let Some(v) = val.parse::<u64>().ok().filter(|v| *v > 0) {
                        config.display.tick_ms = v;
                    }
                }
                "queue_depth" => {
                    if let Some(v) = val.parse::<usize>().ok().filter(|v| *v > 0) {
                        config.display.queue_depth = v;
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    config.projector.validate()?;
    Ok(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let p = &config.projector;
    let s = &config.sensor;
    let d = &config.display;
    let lines = [
        "# rtl-radar configuration".to_string(),
        String::new(),
        "projector:".into(),
        format!("  reference_distance: {}", p.reference_distance),
        format!("  screen_width: {}", p.screen_width),
        format!("  low_speed_max: {}", p.low_speed_max),
        format!("  medium_speed_max: {}", p.medium_speed_max),
        String::new(),
        "sensor:".into(),
        format!("  name_prefix: \"{}\"", s.name_prefix),
        format!("  service_uuid: \"{}\"", s.service_uuid),
        format!("  characteristic_uuid: \"{}\"", s.characteristic_uuid),
        String::new(),
        "display:".into(),
        format!("  tick_ms: {}", d.tick_ms),
        format!("  queue_depth: {}", d.queue_depth),
    ];

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.projector.reference_distance, 150.0);
        assert_eq!(config.projector.screen_width, 1200.0);
        assert_eq!(config.projector.low_speed_max, 70);
        assert_eq!(config.projector.medium_speed_max, 100);
        assert_eq!(config.sensor.name_prefix, "RTL");
        assert_eq!(config.display.tick_ms, 100);
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
projector:
  reference_distance: 200
  screen_width: 800.5
  low_speed_max: 60
  medium_speed_max: 90

sensor:
  name_prefix: "Varia"
  service_uuid: 'abcd'

display:
  tick_ms: 50
  queue_depth: 8
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.projector.reference_distance, 200.0);
        assert_eq!(config.projector.screen_width, 800.5);
        assert_eq!(config.projector.low_speed_max, 60);
        assert_eq!(config.projector.medium_speed_max, 90);
        assert_eq!(config.sensor.name_prefix, "Varia");
        assert_eq!(config.sensor.service_uuid, "abcd");
        assert_eq!(config.sensor.characteristic_uuid, THREAT_CHARACTERISTIC_UUID);
        assert_eq!(config.display.tick_ms, 50);
        assert_eq!(config.display.queue_depth, 8);
    }

    #[test]
    fn test_parse_config_ignores_unusable_values() {
        let text = r#"
projector:
  reference_distance: far
  low_speed_max: 300
display:
  tick_ms: 0
  queue_depth: lots
sensor:
  name_prefix: null
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_config_rejects_invalid_projection() {
        for text in [
            "projector:\n  reference_distance: 0\n",
            "projector:\n  screen_width: -5\n",
            "projector:\n  reference_distance: inf\n",
            "projector:\n  low_speed_max: 90\n  medium_speed_max: 80\n",
        ] {
            assert!(
                matches!(parse_config(text), Err(RadarError::Config(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn test_parse_config_rejects_garbled_line() {
        let text = "projector:\n  reference_distance 200\n";
        let err = parse_config(text).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let text = "window:\n  height: 200\nprojector:\n  colour: red\n";
        let config = parse_config(text).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.projector.reference_distance = 120.0;
        config.projector.low_speed_max = 50;
        config.sensor.name_prefix = "RTL515".into();
        config.display.queue_depth = 4;

        let text = serialize_config(&config);
        let parsed = parse_config(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        config.display.tick_ms = 250;

        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn test_garbled_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "display:\n  tick_ms: 250\nthis is not yaml\n").unwrap();
        assert_eq!(load_config_from(&path), Config::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config_from(Path::new("/nonexistent/rtl-radar/config.yaml"));
        assert_eq!(config, Config::default());
    }
}
