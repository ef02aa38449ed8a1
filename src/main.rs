mod config;
mod controller;
mod error;
mod fan;
mod signal;
mod thermal;
mod util;


use anyhow::Context;

use config::{ControllerSettings, RawConfig};
use controller::{ControllerState, TripTable};
use fan::{Actuator, ControlGuard, Fan};
use signal::Shutdown;
use thermal::{TemperatureSource, Thermometer};

const VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Stopping,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting ({})...", VERSION);

    let config_path = config::config_path();
    let raw = RawConfig::load(&config_path)
        .with_context(|| format!("loading {:?}", config_path))?;

    raw.warn_unknown();

    let paths = raw.fan_paths();
    let (mut fan, settings, mut thermo) =
        prepare(&raw, Fan::new(paths.mode_file, paths.speed_file))?;
    let mut shutdown = Shutdown::install().context("error setting signal handler")?;

    log::info!(
        "trip temps {:?}, hysteresis {}, falling {:?}, poll every {:?}",
        settings.table.trip_temps(),
        settings.table.hysteresis(),
        settings.table.hyst_trip_temps(),
        settings.poll_interval
    );
    log::debug!("sensor files: {:?}", thermo.files());

    log::info!("Taking control of fan");
    fan.acquire().context("failed to take control of fan")?;

    control_loop(&mut thermo, &mut *fan, &settings, &mut shutdown);

    fan.release();
    log::info!("Received signal to terminate");
    Ok(())
}

/// Wraps the actuator in its release guard, then validates the rest of the
/// config. Any error from here on drops the guard, which hands the fan back.
fn prepare<A: Actuator>(
    raw: &RawConfig,
    actuator: A,
) -> anyhow::Result<(ControlGuard<A>, ControllerSettings, Thermometer)> {
    let fan = ControlGuard::new(actuator);

    let settings = raw.controller().context("invalid [FanController] config")?;
    let thermo = raw.thermometer().context("invalid [Thermometer] config")?;
    let thermo = Thermometer::new(&thermo.file_prefix, &thermo.file_suffix, &thermo.zones);

    Ok((fan, settings, thermo))
}

/// Read -> compute -> apply -> sleep, until a shutdown is requested.
///
/// Sensor and actuator failures only cost the current iteration.
fn control_loop(
    source: &mut impl TemperatureSource,
    actuator: &mut impl Actuator,
    settings: &ControllerSettings,
    shutdown: &mut Shutdown,
) -> ControllerState {
    let mut state = ControllerState::default();
    let mut old_duty = None;
    let mut loop_state = LoopState::Running;

    while loop_state == LoopState::Running {
        if shutdown.is_requested() {
            loop_state = LoopState::Stopping;
            continue;
        }

        if let Some((temp, duty)) = poll_once(source, actuator, &settings.table, &mut state) {
            if old_duty != Some(duty) {
                if settings.verbose {
                    log::info!("Temp: {} setting pwm: {}", temp, duty);
                } else {
                    log::debug!("Temp: {} setting pwm: {}", temp, duty);
                }
                old_duty = Some(duty);
            }
        }

        if shutdown.wait(settings.poll_interval) {
            loop_state = LoopState::Stopping;
        }
    }

    state
}

/// One iteration. Returns the reading and the duty computed for it, or `None`
/// if the temperature couldn't be read.
fn poll_once(
    source: &mut impl TemperatureSource,
    actuator: &mut impl Actuator,
    table: &TripTable,
    state: &mut ControllerState,
) -> Option<(i64, u32)> {
    let temp = match source.read() {
        Ok(temp) => temp,
        Err(err) => {
            log::warn!("skipping poll: {}", err);
            return None;
        }
    };

    let (new_state, duty) = table.compute(*state, temp);
    log::trace!(
        "temp: {}, level {} -> {}, pwm: {}",
        temp,
        state.level(),
        new_state.level(),
        duty
    );
    *state = new_state;

    if let Err(err) = actuator.apply(duty) {
        log::warn!("{}", err);
    }
    Some((temp, duty))
}
