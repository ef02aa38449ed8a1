use std::fs;
use std::io;
use std::path::Path;

use crate::error::{ActuatorWriteFailure, SensorUnavailable};

/// Reads a sysfs attribute holding a single integer, e.g. `thermal_zone0/temp`.
pub fn read_sysfs_int(path: &Path) -> Result<i64, SensorUnavailable> {
    let raw = fs::read_to_string(path).map_err(|source| SensorUnavailable::Read {
        path: path.to_path_buf(),
        source,
    })?;
    log_sysfs_access("read", path, &raw);

    raw.trim().parse().map_err(|_| SensorUnavailable::Malformed {
        path: path.to_path_buf(),
        raw: raw.trim().to_string(),
    })
}

/// Writes a value to a sysfs attribute, truncating whatever was there.
pub fn write_sysfs(path: &Path, value: &str) -> Result<(), ActuatorWriteFailure> {
    log_sysfs_access("write", path, value);
    fs::write(path, value).map_err(|source: io::Error| ActuatorWriteFailure {
        path: path.to_path_buf(),
        value: value.to_string(),
        source,
    })
}

fn log_sysfs_access(op: &str, path: &Path, value: &str) {
    log::trace!("{} {:?}: \"{}\"", op, path, value.trim());
}
