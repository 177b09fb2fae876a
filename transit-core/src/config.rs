//! Configuration file management for the transit tracker.
//!
//! Reads/writes `~/.transit/config.yaml` with listen address, tracked area,
//! poll cadence, line selection, and static asset directory. CLI flags
//! override whatever is loaded here.

use std::path::{Path, PathBuf};

use crate::geo::{BoundingBox, Coordinates, DEFAULT_RADIUS_KM, GOTEBORG};
use crate::lines::{parse_groups, LineGroup};
use crate::types::{Result, TransitError};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub area: AreaConfig,
    pub tracker: TrackerConfig,
    pub lines: LinesConfig,
    pub static_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaConfig {
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
}

impl AreaConfig {
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(
            Coordinates {
                lat: self.lat,
                long: self.lon,
            },
            self.radius_km,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub interval_ms: u64,
    /// Queue depth per subscriber before it is disconnected.
    pub subscriber_buffer: usize,
    /// Treat a bare `last_seen` change as an update.
    pub strict_diff: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinesConfig {
    pub groups: Vec<LineGroup>,
    pub routes_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
            },
            area: AreaConfig {
                lat: GOTEBORG.lat,
                lon: GOTEBORG.long,
                radius_km: DEFAULT_RADIUS_KM,
            },
            tracker: TrackerConfig {
                interval_ms: 1000,
                subscriber_buffer: 64,
                strict_diff: false,
            },
            lines: LinesConfig {
                groups: vec![LineGroup::Tram],
                routes_file: None,
            },
            static_dir: None,
        }
    }
}

/// Get the config directory path (`~/.transit/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".transit")
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

/// Load config from `~/.transit/config.yaml`.
///
/// Returns default config if the file doesn't exist or can't be read.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(_) => Config::default(),
    }
}

/// Save config to `~/.transit/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| TransitError::Config(e.to_string()))?;

    let path = config_file();
    std::fs::write(&path, serialize_config(config))
        .map_err(|e| TransitError::Config(e.to_string()))?;

    Ok(path)
}

/// Parse simple YAML-like config text. Unknown keys and bad values are ignored.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let indented = line.starts_with("  ") || line.starts_with('\t');
        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !indented {
            if val.is_empty() {
                section = Some(key.to_string());
            } else {
                section = None;
                if key == "static_dir" {
                    config.static_dir = parse_string_value(val);
                }
            }
            continue;
        }

        match (section.as_deref(), key) {
            (Some("server"), "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.server.host = v;
                }
            }
            (Some("server"), "port") => {
                if let Ok(v) = val.parse() {
                    config.server.port = v;
                }
            }
            (Some("area"), "lat") => {
                if let Some(v) = parse_float_value(val) {
                    config.area.lat = v;
                }
            }
            (Some("area"), "lon") => {
                if let Some(v) = parse_float_value(val) {
                    config.area.lon = v;
                }
            }
            (Some("area"), "radius_km") => {
                if let Some(v) = parse_float_value(val) {
                    config.area.radius_km = v;
                }
            }
            (Some("tracker"), "interval_ms") => {
                if let Ok(v) = val.parse::<u64>() {
                    if v > 0 {
                        config.tracker.interval_ms = v;
                    }
                }
            }
            (Some("tracker"), "subscriber_buffer") => {
                if let Ok(v) = val.parse::<usize>() {
                    if v > 0 {
                        config.tracker.subscriber_buffer = v;
                    }
                }
            }
            (Some("tracker"), "strict_diff") => {
                if let Ok(v) = val.parse() {
                    config.tracker.strict_diff = v;
                }
            }
            (Some("lines"), "groups") => {
                if let Some(v) = parse_string_value(val) {
                    if let Ok(groups) = parse_groups(&v) {
                        config.lines.groups = groups;
                    }
                }
            }
            (Some("lines"), "routes_file") => config.lines.routes_file = parse_string_value(val),
            _ => {}
        }
    }

    config
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let groups: Vec<String> = config.lines.groups.iter().map(|g| g.to_string()).collect();
    let mut lines = vec!["# transit tracker configuration".to_string(), String::new()];

    lines.push("server:".into());
    lines.push(format!("  host: \"{}\"", config.server.host));
    lines.push(format!("  port: {}", config.server.port));
    lines.push(String::new());

    lines.push("area:".into());
    lines.push(format!("  lat: {}", config.area.lat));
    lines.push(format!("  lon: {}", config.area.lon));
    lines.push(format!("  radius_km: {}", config.area.radius_km));
    lines.push(String::new());

    lines.push("tracker:".into());
    lines.push(format!("  interval_ms: {}", config.tracker.interval_ms));
    lines.push(format!("  subscriber_buffer: {}", config.tracker.subscriber_buffer));
    lines.push(format!("  strict_diff: {}", config.tracker.strict_diff));
    lines.push(String::new());

    lines.push("lines:".into());
    lines.push(format!("  groups: \"{}\"", groups.join(",")));
    match &config.lines.routes_file {
        Some(path) => lines.push(format!("  routes_file: \"{path}\"")),
        None => lines.push("  routes_file: null".into()),
    }
    lines.push(String::new());

    match &config.static_dir {
        Some(dir) => lines.push(format!("static_dir: \"{dir}\"")),
        None => lines.push("static_dir: null".into()),
    }

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
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tracker.interval_ms, 1000);
        assert_eq!(config.lines.groups, vec![LineGroup::Tram]);
        assert!(!config.tracker.strict_diff);
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
server:
  host: "127.0.0.1"
  port: 9090

area:
  lat: 59.3293
  lon: 18.0686
  radius_km: 12.5

tracker:
  interval_ms: 2000
  subscriber_buffer: 16
  strict_diff: true

lines:
  groups: "tram,express"
  routes_file: "/srv/trams.json"

static_dir: "/srv/www"
"#;
        let config = parse_config(text);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.area.lat, 59.3293);
        assert_eq!(config.area.radius_km, 12.5);
        assert_eq!(config.tracker.interval_ms, 2000);
        assert_eq!(config.tracker.subscriber_buffer, 16);
        assert!(config.tracker.strict_diff);
        assert_eq!(config.lines.groups, vec![LineGroup::Tram, LineGroup::Express]);
        assert_eq!(config.lines.routes_file.as_deref(), Some("/srv/trams.json"));
        assert_eq!(config.static_dir.as_deref(), Some("/srv/www"));
    }

    #[test]
    fn test_parse_config_null_and_bad_values() {
        let text = r#"
tracker:
  interval_ms: 0
  subscriber_buffer: lots

lines:
  groups: "tram,ferry"
  routes_file: ~

static_dir: null
"#;
        let config = parse_config(text);
        let defaults = Config::default();
        assert_eq!(config.tracker, defaults.tracker);
        assert_eq!(config.lines.groups, defaults.lines.groups);
        assert!(config.lines.routes_file.is_none());
        assert!(config.static_dir.is_none());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.server.port = 3000;
        config.area.radius_km = 5.0;
        config.tracker.strict_diff = true;
        config.lines.groups = vec![LineGroup::Bus];
        config.lines.routes_file = Some("routes.json".into());
        config.static_dir = Some("public".into());

        let parsed = parse_config(&serialize_config(&config));
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config_from(Path::new("/nonexistent/config.yaml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_area_bounding_box() {
        let bbox = Config::default().area.bounding_box();
        assert!(bbox.contains(GOTEBORG.lat, GOTEBORG.long));
    }
}
