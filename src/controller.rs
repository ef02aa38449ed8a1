use crate::error::ConfigurationError;

/// Validated trip points. Immutable once built.
///
/// Index 0 is the "fan off" level with a sentinel trip temperature of 0,
/// prepended by [`TripTable::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripTable {
    trip_temps: Vec<i64>,
    hyst_trip_temps: Vec<i64>,
    trip_speeds: Vec<u32>,
    hysteresis: i64,
}

/// Current fan level. Only [`TripTable::compute`] produces new values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControllerState {
    level: usize,
}

impl ControllerState {
    pub fn level(&self) -> usize {
        self.level
    }
}

impl TripTable {
    /// Builds a table from the user trip temps/speeds (without the sentinel).
    pub fn new(
        trip_temps: &[i64],
        trip_speeds: &[u32],
        hysteresis: i64,
    ) -> Result<Self, ConfigurationError> {
        if trip_temps.len() != trip_speeds.len() {
            return Err(ConfigurationError::LengthMismatch {
                temps: trip_temps.len(),
                speeds: trip_speeds.len(),
            });
        }
        if hysteresis < 0 {
            return Err(ConfigurationError::NegativeHysteresis(hysteresis));
        }

        let trip_temps: Vec<i64> = std::iter::once(0).chain(trip_temps.iter().copied()).collect();
        let trip_speeds: Vec<u32> = std::iter::once(0).chain(trip_speeds.iter().copied()).collect();

        if !strictly_ascending(&trip_temps) {
            return Err(ConfigurationError::NotAscending(trip_temps));
        }

        let hyst_trip_temps: Vec<i64> = trip_temps
            .iter()
            .enumerate()
            .map(|(i, &t)| if i == 0 { 0 } else { t - hysteresis })
            .collect();
        if !strictly_ascending(&hyst_trip_temps) {
            return Err(ConfigurationError::FallingNotAscending {
                hysteresis,
                falling: hyst_trip_temps,
            });
        }

        // gaps between consecutive non-sentinel trips
        if let Some(gap) = trip_temps[1..].windows(2).map(|w| w[1] - w[0]).min() {
            if hysteresis >= gap {
                return Err(ConfigurationError::HysteresisTooLarge { hysteresis, gap });
            }
        }

        Ok(Self {
            trip_temps,
            hyst_trip_temps,
            trip_speeds,
            hysteresis,
        })
    }

    /// Highest level index (N).
    pub fn top_level(&self) -> usize {
        self.trip_temps.len() - 1
    }

    pub fn trip_temps(&self) -> &[i64] {
        &self.trip_temps
    }

    pub fn hyst_trip_temps(&self) -> &[i64] {
        &self.hyst_trip_temps
    }

    pub fn hysteresis(&self) -> i64 {
        self.hysteresis
    }

    pub fn speed(&self, level: usize) -> u32 {
        self.trip_speeds[level.min(self.top_level())]
    }

    /// Maps the current state and a new reading to the next state and its duty.
    ///
    /// At or above the current level's trip temperature the rising table is
    /// searched, so the level may go up. Below it the falling table is
    /// searched, so the level only drops once the reading is under
    /// `trip - hysteresis`. Total over all `i64` readings.
    pub fn compute(&self, state: ControllerState, temperature: i64) -> (ControllerState, u32) {
        let current = state.level.min(self.top_level());
        let table = if temperature >= self.trip_temps[current] {
            &self.trip_temps
        } else {
            &self.hyst_trip_temps
        };

        let level = lookup(table, temperature);
        (ControllerState { level }, self.speed(level))
    }
}

/// Index `i` with `table[i] <= temperature < table[i + 1]`.
///
/// Readings below `table[0]` give 0, readings at or above the last entry give
/// the last index. `table` must be non-empty and strictly ascending.
pub fn lookup(table: &[i64], temperature: i64) -> usize {
    table
        .partition_point(|&t| t <= temperature)
        .saturating_sub(1)
}

fn strictly_ascending(table: &[i64]) -> bool {
    table.windows(2).all(|w| w[0] < w[1])
}
