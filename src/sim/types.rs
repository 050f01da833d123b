//! Core simulation types: timing configuration, charge mode flags, and route policy.

use enumset::{EnumSet, EnumSetType};
use serde::Deserialize;

/// Epoch offset of the first tick of every horizon (04:30 on day one).
pub const DEFAULT_START_TIME: i64 = 16_200;

/// Default scheduling granularity in seconds.
pub const DEFAULT_TICK_SECS: i64 = 60;

/// Convergence bound for the budget allocation loop (kW).
///
/// This is a heuristic bound rather than an exact zero check: the remaining
/// target is decremented by floating-point amounts and never lands on zero
/// exactly.
pub const CONVERGENCE_EPSILON_KW: f64 = 1e-5;

/// Seconds subtracted from a full tick when testing whether a bus can still
/// afford to skip the current tick.
pub const NECESSITY_SLACK_SECS: f64 = 0.1;

const SECONDS_PER_DAY: i64 = 86_400;

/// What the route handler does when a departing bus lacks the energy for its trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePolicy {
    /// Re-issue the trip draw as a forced command; SOC may fall below the floor.
    #[default]
    Force,
    /// Leave SOC untouched; only the shortfall is recorded.
    Strict,
}

/// Centralized simulation configuration.
///
/// Buses, the schedule index, and the engine all reference this struct for
/// timing and SOC policy, so no component carries its own copy of these
/// constants.
///
/// # Examples
///
/// ```
/// use bus_charge_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(1, 42);
/// assert_eq!(cfg.total_ticks(), 1440);
/// assert_eq!(cfg.end_time(), 16_200 + 86_400);
/// ```
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Epoch seconds of the first tick.
    pub start_time: i64,
    /// Duration of one tick in seconds.
    pub tick_secs: i64,
    /// Number of days to simulate.
    pub days: usize,
    /// Master random seed for synthetic inputs.
    pub seed: u64,
    /// SOC floor applied to unforced commands.
    pub min_soc: f64,
    /// SOC ceiling applied to unforced commands.
    pub max_soc: f64,
    /// SOC every bus holds before its pre-horizon driving is subtracted.
    pub initial_soc: f64,
    /// SOC the fallback trip distance charges a bus back to.
    pub fallback_target_soc: f64,
    /// Multiplier applied to trip energy when planning charge priorities.
    pub trip_energy_margin: f64,
    /// Behaviour for departures without enough energy.
    pub route_policy: RoutePolicy,
}

impl SimConfig {
    /// Creates a configuration with the default start time and one-minute ticks.
    ///
    /// # Panics
    ///
    /// Panics if `days` is zero.
    pub fn new(days: usize, seed: u64) -> Self {
        assert!(days > 0, "days must be > 0");
        Self {
            start_time: DEFAULT_START_TIME,
            tick_secs: DEFAULT_TICK_SECS,
            days,
            seed,
            min_soc: 0.10,
            max_soc: 0.90,
            initial_soc: 0.50,
            fallback_target_soc: 0.50,
            trip_energy_margin: 1.0,
            route_policy: RoutePolicy::Force,
        }
    }

    /// Overrides the tick size.
    ///
    /// # Panics
    ///
    /// Panics unless `tick_secs` is positive and divides a day evenly.
    pub fn with_tick_secs(mut self, tick_secs: i64) -> Self {
        assert!(tick_secs > 0 && SECONDS_PER_DAY % tick_secs == 0);
        self.tick_secs = tick_secs;
        self
    }

    /// Total number of ticks across all days.
    pub fn total_ticks(&self) -> usize {
        self.days * (SECONDS_PER_DAY / self.tick_secs) as usize
    }

    /// First epoch second after the horizon.
    pub fn end_time(&self) -> i64 {
        self.start_time + self.days as i64 * SECONDS_PER_DAY
    }

    /// Epoch seconds of the tick with the given index.
    pub fn tick_time(&self, index: usize) -> i64 {
        self.start_time + index as i64 * self.tick_secs
    }

    /// Tick duration in hours.
    pub fn dt_hours(&self) -> f64 {
        self.tick_secs as f64 / 3600.0
    }

    /// Tick duration in seconds as a float, for power commands.
    pub fn tick_duration(&self) -> f64 {
        self.tick_secs as f64
    }

    /// Returns `true` for the first tick of the horizon.
    pub fn is_horizon_start(&self, time: i64) -> bool {
        time == self.start_time
    }

    /// Returns `true` when `time` lies on the tick grid.
    pub fn is_aligned(&self, time: i64) -> bool {
        (time - self.start_time).rem_euclid(self.tick_secs) == 0
    }

    /// Iterates over every tick timestamp of the horizon.
    pub fn horizon(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.total_ticks()).map(|i| self.tick_time(i))
    }
}

/// Charging behaviours selectable per tick.
///
/// Declaration order fixes the bit positions of the raw `mode` integer.
#[derive(Debug, EnumSetType)]
pub enum ChargeFlag {
    /// Bit 0: track the external power budget instead of filling every plug.
    Opportunistic,
    /// Bit 1: allow budget allocation to discharge buses for negative targets.
    Bidirectional,
}

/// Set of [`ChargeFlag`]s passed to the engine for one tick.
pub type ChargeMode = EnumSet<ChargeFlag>;

/// Builds a mode set from the raw bit field, ignoring unknown bits.
pub fn mode_from_bits(bits: u32) -> ChargeMode {
    EnumSet::from_u32_truncated(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_config_basic() {
        let cfg = SimConfig::new(1, 42);
        assert_eq!(cfg.start_time, 16_200);
        assert_eq!(cfg.tick_secs, 60);
        assert_eq!(cfg.total_ticks(), 1440);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.min_soc, 0.10);
        assert_eq!(cfg.max_soc, 0.90);
    }

    #[test]
    fn sim_config_multi_day() {
        let cfg = SimConfig::new(3, 0);
        assert_eq!(cfg.total_ticks(), 3 * 1440);
        assert_eq!(cfg.end_time(), 16_200 + 3 * 86_400);
        assert_eq!(cfg.tick_time(2), 16_320);
    }

    #[test]
    fn custom_tick_size() {
        let cfg = SimConfig::new(1, 0).with_tick_secs(300);
        assert_eq!(cfg.total_ticks(), 288);
        assert!((cfg.dt_hours() - 300.0 / 3600.0).abs() < 1e-12);
        assert!(cfg.is_aligned(16_500));
        assert!(!cfg.is_aligned(16_260));
    }

    #[test]
    #[should_panic]
    fn sim_config_zero_days_panics() {
        SimConfig::new(0, 0);
    }

    #[test]
    #[should_panic]
    fn uneven_tick_panics() {
        let _ = SimConfig::new(1, 0).with_tick_secs(7);
    }

    #[test]
    fn horizon_start_only_matches_first_tick() {
        let cfg = SimConfig::new(1, 0);
        assert!(cfg.is_horizon_start(16_200));
        assert!(!cfg.is_horizon_start(16_260));
        assert_eq!(cfg.horizon().next(), Some(16_200));
        assert_eq!(cfg.horizon().count(), 1440);
    }

    #[test]
    fn mode_bits_map_to_flags() {
        assert!(mode_from_bits(0).is_empty());
        assert_eq!(mode_from_bits(1), ChargeMode::from(ChargeFlag::Opportunistic));
        let both = mode_from_bits(3);
        assert!(both.contains(ChargeFlag::Opportunistic));
        assert!(both.contains(ChargeFlag::Bidirectional));
        assert_eq!(mode_from_bits(2 | 8), ChargeMode::from(ChargeFlag::Bidirectional));
    }
}
