use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde_json::de::from_str as from_json;

use crate::controller::TripTable;
use crate::error::ConfigurationError;

/// Where the config file lives unless `XU4FAN_CONFIG` says otherwise
pub const CONFIG_PATH: &str = "/etc/xu4fan/xu4fan.conf";
pub const CONFIG_PATH_ENV: &str = "XU4FAN_CONFIG";

/// Rising trip points in millidegrees, the 0 sentinel is prepended on load
pub const TRIP_TEMPS: &[i64] = &[60000, 70000, 80000];

/// PWM duty for each trip point, the 0 "fan off" speed is prepended on load
pub const TRIP_SPEEDS: &[u32] = &[120, 180, 240];

/// How far below a trip point the temperature has to fall before the fan
/// drops back a level
pub const HYSTERESIS: i64 = 8000;

/// Polling rate
/// How often we read the temperature and write the fan speed
pub const POLL_INTERVAL_S: f64 = 0.25;

/// Anything shorter turns the loop into a busy spin on the pwm file
pub const MIN_POLL_INTERVAL_S: f64 = 0.001;

/// Log every fan speed change at info level
pub const VERBOSE: bool = false;

pub const THERMAL_FILE_PREFIX: &str = "/sys/devices/virtual/thermal/thermal_zone";
pub const THERMAL_FILE_SUFFIX: &str = "/temp";
pub const THERMAL_ZONES: &[u32] = &[0, 1, 2, 3];

pub const FAN_MODE_FILE: &str = "/sys/devices/platform/pwm-fan/hwmon/hwmon0/automatic";
pub const FAN_SPEED_FILE: &str = "/sys/devices/platform/pwm-fan/hwmon/hwmon0/pwm1";

const SECTION_CONTROLLER: &str = "FanController";
const SECTION_THERMOMETER: &str = "Thermometer";
const SECTION_FAN: &str = "Fan";

const KNOWN_KEYS: &[(&str, &[&str])] = &[
    (
        SECTION_CONTROLLER,
        &["trip_temps", "trip_speeds", "hysteresis", "poll_interval", "verbose"],
    ),
    (SECTION_THERMOMETER, &["file_prefix", "file_suffix", "zones"]),
    (SECTION_FAN, &["fan_mode_file", "fan_speed_file"]),
];

pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH))
}

/// Section -> key -> raw value, as read from the INI-style file.
#[derive(Debug, Default)]
pub struct RawConfig {
    sections: HashMap<String, HashMap<String, String>>,
}

pub struct FanPaths {
    pub mode_file: PathBuf,
    pub speed_file: PathBuf,
}

pub struct ThermometerSettings {
    pub file_prefix: String,
    pub file_suffix: String,
    pub zones: Vec<u32>,
}

pub struct ControllerSettings {
    pub table: TripTable,
    pub poll_interval: Duration,
    pub verbose: bool,
}

impl RawConfig {
    /// A missing file is not an error, every key falls back to its default.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::warn!("config file {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            Err(source) => Err(ConfigurationError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// `key = value` lines under `[Section]` headers. Indented lines continue
    /// the previous value, so a list can span several lines.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let section_re = Regex::new(r"^\[(?<section>[^\]]+)\]$").unwrap();
        let entry_re = Regex::new(r"^(?<key>[A-Za-z0-9_.\-]+)\s*[=:]\s*(?<value>.*)$").unwrap();

        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let indented = raw_line.starts_with(|c: char| c.is_whitespace());
            if let (true, Some(section), Some(key)) = (indented, &current, &last_key) {
                if let Some(value) = sections.get_mut(section).and_then(|s| s.get_mut(key)) {
                    value.push('\n');
                    value.push_str(line);
                    continue;
                }
            }

            if let Some(c) = section_re.captures(line) {
                let name = c["section"].trim().to_string();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                last_key = None;
            } else if let Some(c) = entry_re.captures(line) {
                let key = c["key"].to_lowercase();
                let Some(section) = &current else {
                    return Err(ConfigurationError::KeyOutsideSection { line: idx + 1, key });
                };
                sections
                    .entry(section.clone())
                    .or_default()
                    .insert(key.clone(), c["value"].trim().to_string());
                last_key = Some(key);
            } else {
                return Err(ConfigurationError::Syntax {
                    line: idx + 1,
                    text: line.to_string(),
                });
            }
        }

        Ok(Self { sections })
    }

    /// Sections and keys this daemon doesn't read, as `[Section] key`
    /// (or just `[Section]` for a whole unknown section). Sorted.
    pub fn unknown_keys(&self) -> Vec<String> {
        let mut unknown = Vec::new();
        for (section, keys) in &self.sections {
            let Some((_, known)) = KNOWN_KEYS.iter().find(|(s, _)| *s == section.as_str()) else {
                unknown.push(format!("[{}]", section));
                continue;
            };
            for key in keys.keys() {
                if !known.contains(&key.as_str()) {
                    unknown.push(format!("[{}] {}", section, key));
                }
            }
        }
        unknown.sort();
        unknown
    }

    /// A typo'd key silently falls back to its default, so say so.
    pub fn warn_unknown(&self) {
        for entry in self.unknown_keys() {
            log::warn!("ignoring unknown config entry {}", entry);
        }
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// Parses `[section] key` with `parse`, or returns `default` when unset.
    fn get_or<T>(
        &self,
        section: &str,
        key: &str,
        default: T,
        parse: impl FnOnce(&str) -> Result<T, String>,
    ) -> Result<T, ConfigurationError> {
        match self.get(section, key) {
            None => Ok(default),
            Some(value) => parse(value).map_err(|reason| ConfigurationError::BadValue {
                section: section.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                reason,
            }),
        }
    }

    /// Plain strings, nothing here can fail to parse.
    pub fn fan_paths(&self) -> FanPaths {
        FanPaths {
            mode_file: self
                .get(SECTION_FAN, "fan_mode_file")
                .unwrap_or(FAN_MODE_FILE)
                .into(),
            speed_file: self
                .get(SECTION_FAN, "fan_speed_file")
                .unwrap_or(FAN_SPEED_FILE)
                .into(),
        }
    }

    pub fn thermometer(&self) -> Result<ThermometerSettings, ConfigurationError> {
        let zones = self.get_or(SECTION_THERMOMETER, "zones", THERMAL_ZONES.to_vec(), |v| {
            from_json::<Vec<u32>>(v).map_err(|e| e.to_string())
        })?;
        if zones.is_empty() {
            return Err(ConfigurationError::NoZones);
        }

        Ok(ThermometerSettings {
            file_prefix: self
                .get(SECTION_THERMOMETER, "file_prefix")
                .unwrap_or(THERMAL_FILE_PREFIX)
                .to_string(),
            file_suffix: self
                .get(SECTION_THERMOMETER, "file_suffix")
                .unwrap_or(THERMAL_FILE_SUFFIX)
                .to_string(),
            zones,
        })
    }

    pub fn controller(&self) -> Result<ControllerSettings, ConfigurationError> {
        let s = SECTION_CONTROLLER;
        let trip_temps = self.get_or(s, "trip_temps", TRIP_TEMPS.to_vec(), |v| {
            from_json::<Vec<i64>>(v).map_err(|e| e.to_string())
        })?;
        let trip_speeds = self.get_or(s, "trip_speeds", TRIP_SPEEDS.to_vec(), |v| {
            from_json::<Vec<u32>>(v).map_err(|e| e.to_string())
        })?;
        let hysteresis = self.get_or(s, "hysteresis", HYSTERESIS, |v| {
            v.parse::<i64>().map_err(|e| e.to_string())
        })?;
        let poll_interval_s = self.get_or(s, "poll_interval", POLL_INTERVAL_S, parse_interval)?;
        let verbose = self.get_or(s, "verbose", VERBOSE, parse_bool)?;

        Ok(ControllerSettings {
            table: TripTable::new(&trip_temps, &trip_speeds, hysteresis)?,
            poll_interval: Duration::from_secs_f64(poll_interval_s),
            verbose,
        })
    }
}

fn parse_interval(value: &str) -> Result<f64, String> {
    let secs: f64 = value.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    // from_secs_f64 panics on anything it can't represent
    if !secs.is_finite() || secs < MIN_POLL_INTERVAL_S || secs > u32::MAX as f64 {
        return Err(format!(
            "must be between {} and {} seconds",
            MIN_POLL_INTERVAL_S,
            u32::MAX
        ));
    }
    Ok(secs)
}

/// Same spellings configparser accepts.
fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err("not a boolean".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
# xu4fan sample config
[FanController]
trip_temps = [55000, 65000, 75000]
trip_speeds = [100, 160, 255]
hysteresis = 3000
poll_interval = 1.5
verbose = yes

[Thermometer]
; only the big cores
zones = [0, 2]
file_prefix = /tmp/thermal_zone

[Fan]
fan_mode_file: /tmp/fan/automatic
fan_speed_file = /tmp/fan/pwm1
";

    #[test]
    fn test_parse_sample() {
        let raw = RawConfig::parse(SAMPLE).unwrap();

        let ctl = raw.controller().unwrap();
        assert_eq!(ctl.table.trip_temps(), &[0, 55000, 65000, 75000]);
        assert_eq!(ctl.table.speed(3), 255);
        assert_eq!(ctl.table.hysteresis(), 3000);
        assert_eq!(ctl.poll_interval, Duration::from_millis(1500));
        assert!(ctl.verbose);

        let thermo = raw.thermometer().unwrap();
        assert_eq!(thermo.zones, vec![0, 2]);
        assert_eq!(thermo.file_prefix, "/tmp/thermal_zone");
        assert_eq!(thermo.file_suffix, THERMAL_FILE_SUFFIX);

        let fan = raw.fan_paths();
        assert_eq!(fan.mode_file, PathBuf::from("/tmp/fan/automatic"));
        assert_eq!(fan.speed_file, PathBuf::from("/tmp/fan/pwm1"));
    }

    #[test]
    fn test_defaults_when_empty() {
        let raw = RawConfig::parse("").unwrap();

        let ctl = raw.controller().unwrap();
        assert_eq!(ctl.table.trip_temps(), &[0, 60000, 70000, 80000]);
        assert_eq!(ctl.table.hyst_trip_temps(), &[0, 52000, 62000, 72000]);
        assert_eq!(ctl.table.speed(1), 120);
        assert_eq!(ctl.poll_interval, Duration::from_millis(250));
        assert!(!ctl.verbose);

        let thermo = raw.thermometer().unwrap();
        assert_eq!(thermo.zones, THERMAL_ZONES);
        assert_eq!(thermo.file_prefix, THERMAL_FILE_PREFIX);

        let fan = raw.fan_paths();
        assert_eq!(fan.mode_file, PathBuf::from(FAN_MODE_FILE));
        assert_eq!(fan.speed_file, PathBuf::from(FAN_SPEED_FILE));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let raw = RawConfig::load(&dir.path().join("xu4fan.conf")).unwrap();
        assert!(raw.controller().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[FanController]\nHysteresis = 1000\n").unwrap();
        let raw = RawConfig::load(file.path()).unwrap();
        assert_eq!(raw.controller().unwrap().table.hysteresis(), 1000);
    }

    #[test]
    fn test_key_outside_section() {
        let err = RawConfig::parse("hysteresis = 1000\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::KeyOutsideSection { line: 1, .. }
        ));
    }

    #[test]
    fn test_garbage_line() {
        let err = RawConfig::parse("[Fan]\nthis is not config\n").unwrap_err();
        assert!(matches!(err, ConfigurationError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_bad_values() {
        let cases = [
            "[FanController]\ntrip_temps = 60000, 70000\n",
            "[FanController]\ntrip_speeds = [120, -1]\n",
            "[FanController]\nhysteresis = lots\n",
            "[FanController]\npoll_interval = 0\n",
            "[FanController]\npoll_interval = nan\n",
            "[FanController]\npoll_interval = 1e-12\n",
            "[FanController]\npoll_interval = 0.0009\n",
            "[FanController]\nverbose = maybe\n",
        ];
        for text in cases {
            let raw = RawConfig::parse(text).unwrap();
            assert!(
                matches!(raw.controller(), Err(ConfigurationError::BadValue { .. })),
                "expected bad value for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_invalid_table_is_rejected() {
        let raw = RawConfig::parse(
            "[FanController]\ntrip_temps = [60000, 70000]\ntrip_speeds = [120]\n",
        )
        .unwrap();
        assert!(matches!(
            raw.controller(),
            Err(ConfigurationError::LengthMismatch { .. })
        ));

        let raw = RawConfig::parse("[FanController]\nhysteresis = -5\n").unwrap();
        assert!(matches!(
            raw.controller(),
            Err(ConfigurationError::NegativeHysteresis(-5))
        ));
    }

    #[test]
    fn test_empty_zones_rejected() {
        let raw = RawConfig::parse("[Thermometer]\nzones = []\n").unwrap();
        assert!(matches!(raw.thermometer(), Err(ConfigurationError::NoZones)));
    }

    #[test]
    fn test_fan_paths_survive_bad_controller_section() {
        let raw = RawConfig::parse(
            "[FanController]\nhysteresis = lots\n[Fan]\nfan_mode_file = /tmp/mode\n",
        )
        .unwrap();
        assert!(raw.controller().is_err());
        assert_eq!(raw.fan_paths().mode_file, PathBuf::from("/tmp/mode"));
    }

    #[test]
    fn test_smallest_poll_interval() {
        let raw = RawConfig::parse("[FanController]\npoll_interval = 0.001\n").unwrap();
        assert_eq!(raw.controller().unwrap().poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_unknown_keys_reported() {
        let raw = RawConfig::parse(
            "[FanController]\ntrip_temp = [50000]\ntrip_speed = [255]\nhysteresis = 1000\n\
             [Fan]\nfan_mode_file = /tmp/mode\n[Fann]\nfan_speed_file = /tmp/pwm1\n",
        )
        .unwrap();
        assert_eq!(
            raw.unknown_keys(),
            vec![
                "[FanController] trip_speed".to_string(),
                "[FanController] trip_temp".to_string(),
                "[Fann]".to_string(),
            ]
        );
        // the typo leaves the default table in force
        assert_eq!(
            raw.controller().unwrap().table.trip_temps(),
            &[0, 60000, 70000, 80000]
        );
    }

    #[test]
    fn test_sample_has_no_unknown_keys() {
        assert!(RawConfig::parse(SAMPLE).unwrap().unknown_keys().is_empty());
        assert!(RawConfig::parse(include_str!("../xu4fan.conf"))
            .unwrap()
            .unknown_keys()
            .is_empty());
    }

    #[test]
    fn test_continuation_lines() {
        let raw = RawConfig::parse(
            "[FanController]\ntrip_temps = [60000,\n    70000,\n\t80000]\n\
             trip_speeds = [120, 180, 240]\n",
        )
        .unwrap();
        assert_eq!(
            raw.controller().unwrap().table.trip_temps(),
            &[0, 60000, 70000, 80000]
        );
    }

    #[test]
    fn test_indented_line_without_key() {
        let err = RawConfig::parse("[Fan]\n    70000, 80000]\n").unwrap_err();
        assert!(matches!(err, ConfigurationError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_parse_bool_spellings() {
        for v in ["1", "yes", "TRUE", "On"] {
            assert_eq!(parse_bool(v), Ok(true));
        }
        for v in ["0", "No", "false", "OFF"] {
            assert_eq!(parse_bool(v), Ok(false));
        }
    }
}
