use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid configuration. Fatal at startup, the control loop never starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed reading config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config line {line}: '{text}' is not a section header or key/value pair")]
    Syntax { line: usize, text: String },

    #[error("config line {line}: key '{key}' appears before any section")]
    KeyOutsideSection { line: usize, key: String },

    #[error("[{section}] {key} = '{value}': {reason}")]
    BadValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("trip_temps has {temps} entries but trip_speeds has {speeds}")]
    LengthMismatch { temps: usize, speeds: usize },

    #[error("trip_temps must be strictly ascending above 0, got {0:?}")]
    NotAscending(Vec<i64>),

    #[error("hysteresis must not be negative, got {0}")]
    NegativeHysteresis(i64),

    #[error("hysteresis {hysteresis} makes the falling table non-ascending: {falling:?}")]
    FallingNotAscending { hysteresis: i64, falling: Vec<i64> },

    #[error("hysteresis {hysteresis} must be smaller than the smallest trip gap {gap}")]
    HysteresisTooLarge { hysteresis: i64, gap: i64 },

    #[error("no thermal zones configured")]
    NoZones,
}

/// A single poll could not read the temperature. The iteration is skipped.
#[derive(Debug, Error)]
pub enum SensorUnavailable {
    #[error("failed reading sensor {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sensor {path:?} returned '{raw}', not an integer")]
    Malformed { path: PathBuf, raw: String },

    #[error("no sensor files to read")]
    NoSensors,
}

/// Writing to a fan control file failed. Logged, the loop keeps going.
#[derive(Debug, Error)]
#[error("failed writing '{value}' to {path:?}: {source}")]
pub struct ActuatorWriteFailure {
    pub path: PathBuf,
    pub value: String,
    #[source]
    pub source: io::Error,
}
