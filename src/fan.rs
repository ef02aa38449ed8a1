use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use crate::error::ActuatorWriteFailure;
use crate::util;

/// Value for the fan mode file that hands the fan to the kernel governor.
const MODE_AUTOMATIC: &str = "1";
/// Value for the fan mode file that lets us drive the PWM directly.
const MODE_MANUAL: &str = "0";

pub trait Actuator {
    /// Writes a duty value. Called at most once per loop iteration.
    fn apply(&mut self, duty: u32) -> Result<(), ActuatorWriteFailure>;
    /// Takes manual control away from the firmware.
    fn acquire(&mut self) -> Result<(), ActuatorWriteFailure>;
    /// Hands control back. Idempotent, fine to call without `acquire`.
    fn release(&mut self) -> Result<(), ActuatorWriteFailure>;
}

/// pwm-fan hwmon device
pub struct Fan {
    fan_mode_file: PathBuf,
    fan_speed_file: PathBuf,
}

impl Fan {
    pub fn new(fan_mode_file: impl Into<PathBuf>, fan_speed_file: impl Into<PathBuf>) -> Self {
        Self {
            fan_mode_file: fan_mode_file.into(),
            fan_speed_file: fan_speed_file.into(),
        }
    }
}

impl Actuator for Fan {
    fn apply(&mut self, duty: u32) -> Result<(), ActuatorWriteFailure> {
        util::write_sysfs(&self.fan_speed_file, &duty.to_string())
    }

    fn acquire(&mut self) -> Result<(), ActuatorWriteFailure> {
        util::write_sysfs(&self.fan_mode_file, MODE_MANUAL)
    }

    fn release(&mut self) -> Result<(), ActuatorWriteFailure> {
        util::write_sysfs(&self.fan_mode_file, MODE_AUTOMATIC)
    }
}

/// Owns an actuator and releases it exactly once: explicitly via
/// [`ControlGuard::release`], or on drop (error return, panic unwind).
///
/// A SIGKILL skips this entirely and leaves the fan in manual mode.
pub struct ControlGuard<A: Actuator> {
    actuator: A,
    released: bool,
}

impl<A: Actuator> ControlGuard<A> {
    pub fn new(actuator: A) -> Self {
        Self {
            actuator,
            released: false,
        }
    }

    /// Best effort, failures are logged. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        log::info!("releasing control of fan");
        if let Err(err) = self.actuator.release() {
            log::error!("failed to release fan: {}", err);
        }
    }
}

impl<A: Actuator> Deref for ControlGuard<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.actuator
    }
}

impl<A: Actuator> DerefMut for ControlGuard<A> {
    fn deref_mut(&mut self) -> &mut A {
        &mut self.actuator
    }
}

impl<A: Actuator> Drop for ControlGuard<A> {
    fn drop(&mut self) {
        self.release();
    }
}
