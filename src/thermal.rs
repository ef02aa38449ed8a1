use std::path::PathBuf;

use crate::error::SensorUnavailable;
use crate::util;

/// Anything that can produce the temperature the controller acts on.
pub trait TemperatureSource {
    /// Representative temperature in millidegrees Celsius.
    fn read(&mut self) -> Result<i64, SensorUnavailable>;
}

/// CPU thermometer backed by one or more sysfs thermal zones.
///
/// Reports the hottest zone, since cooling should follow the worst core.
pub struct Thermometer {
    read_files: Vec<PathBuf>,
}

impl Thermometer {
    /// Zone `z` is read from `{prefix}{z}{suffix}`.
    pub fn new(prefix: &str, suffix: &str, zones: &[u32]) -> Self {
        Self {
            read_files: zones
                .iter()
                .map(|z| PathBuf::from(format!("{}{}{}", prefix, z, suffix)))
                .collect(),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.read_files
    }
}

impl TemperatureSource for Thermometer {
    fn read(&mut self) -> Result<i64, SensorUnavailable> {
        let mut hottest = None;
        for path in &self.read_files {
            let temp = util::read_sysfs_int(path)?;
            hottest = Some(hottest.map_or(temp, |h: i64| h.max(temp)));
        }

        hottest.ok_or(SensorUnavailable::NoSensors)
    }
}
