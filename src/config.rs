//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::sim::types::{
    ChargeFlag, ChargeMode, DEFAULT_START_TIME, DEFAULT_TICK_SECS, RoutePolicy, SimConfig,
};

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Horizon timing and route policy.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// SOC policy shared by every bus.
    #[serde(default)]
    pub fleet: FleetConfig,
    /// Charge mode flags passed to the engine each tick.
    #[serde(default)]
    pub charging: ChargingConfig,
    /// External power request profile.
    #[serde(default)]
    pub request: RequestConfig,
    /// CSV inputs. When absent the synthetic fleet is used.
    #[serde(default)]
    pub data: DataConfig,
    /// Synthetic fleet generator parameters.
    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

/// Horizon timing and route policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of days to simulate (must be > 0).
    pub days: usize,
    /// Master random seed.
    pub seed: u64,
    /// Tick size in seconds; must divide a day evenly.
    pub tick_secs: i64,
    /// Epoch seconds of the first tick.
    pub start_time: i64,
    /// `"force"` or `"strict"` handling of departures short on energy.
    pub route_policy: RoutePolicy,
    /// Multiplier on trip energy when planning priorities (must be > 0).
    pub trip_energy_margin: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            days: 1,
            seed: 42,
            tick_secs: DEFAULT_TICK_SECS,
            start_time: DEFAULT_START_TIME,
            route_policy: RoutePolicy::Force,
            trip_energy_margin: 1.0,
        }
    }
}

/// SOC policy shared by every bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    pub min_soc: f64,
    pub max_soc: f64,
    pub initial_soc: f64,
    /// SOC the fallback trip distance charges back to.
    pub fallback_target_soc: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            min_soc: 0.10,
            max_soc: 0.90,
            initial_soc: 0.50,
            fallback_target_soc: 0.50,
        }
    }
}

/// Charge mode flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChargingConfig {
    /// Track the power request; otherwise every free plug charges at full rate.
    pub opportunistic: bool,
    /// Allow discharging buses when the request is below what is consumed.
    pub bidirectional: bool,
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            opportunistic: true,
            bidirectional: false,
        }
    }
}

/// External power request profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestConfig {
    /// `"flat"`, `"series"`, or `"smoothed_renewable"`.
    pub model: String,
    /// Constant request for the flat model (kW).
    pub flat_kw: f64,
    /// Mean fleet draw the smoothed model oscillates around (kW).
    pub avg_bus_power_kw: f64,
    /// Low-pass filter factor in `[0, 1)`; higher is smoother.
    pub filter_factor: f64,
    /// Peak renewable generation (kW).
    pub renewable_peak_kw: f64,
    /// Renewable noise standard deviation as a fraction of the clean output.
    pub renewable_noise_std: f64,
    /// One `power_kw` column of per-tick requests, for the series model.
    pub series_csv: Option<PathBuf>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            model: "smoothed_renewable".to_string(),
            flat_kw: 0.0,
            avg_bus_power_kw: 300.0,
            filter_factor: 0.95,
            renewable_peak_kw: 1500.0,
            renewable_noise_std: 0.10,
            series_csv: None,
        }
    }
}

/// CSV inputs; all three paths are given together or not at all.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub chargers: Option<PathBuf>,
    pub buses: Option<PathBuf>,
    pub schedule: Option<PathBuf>,
}

impl DataConfig {
    /// Returns the three paths when every one is set.
    pub fn paths(&self) -> Option<(&Path, &Path, &Path)> {
        Some((
            self.chargers.as_deref()?,
            self.buses.as_deref()?,
            self.schedule.as_deref()?,
        ))
    }
}

/// Synthetic fleet generator parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntheticConfig {
    pub buses: u32,
    pub chargers: u32,
    pub plugs_per_charger: u32,
    pub plug_type: String,
    pub capacity_kwh: f64,
    pub consumption_kwh_per_mile: f64,
    pub charge_rate_kw: f64,
    /// Average speed used to turn trip durations into distances.
    pub avg_speed_mph: f64,
    pub trip_minutes_min: u32,
    pub trip_minutes_max: u32,
    pub charge_minutes_min: u32,
    pub charge_minutes_max: u32,
    /// Probability a schedule row carries no trip distance.
    pub missing_distance_prob: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            buses: 12,
            chargers: 2,
            plugs_per_charger: 3,
            plug_type: "A".to_string(),
            capacity_kwh: 440.0,
            consumption_kwh_per_mile: 2.0,
            charge_rate_kw: 150.0,
            avg_speed_mph: 12.0,
            trip_minutes_min: 60,
            trip_minutes_max: 150,
            charge_minutes_min: 20,
            charge_minutes_max: 75,
            missing_distance_prob: 0.0,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.days"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

const REQUEST_MODELS: &[&str] = &["flat", "series", "smoothed_renewable"];

impl ScenarioConfig {
    /// Twelve buses sharing two depots with three plugs each.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// A larger fleet squeezed onto a single two-plug depot.
    pub fn congested() -> Self {
        Self {
            synthetic: SyntheticConfig {
                buses: 16,
                chargers: 1,
                plugs_per_charger: 2,
                charge_minutes_min: 15,
                charge_minutes_max: 45,
                ..SyntheticConfig::default()
            },
            ..Self::default()
        }
    }

    /// Bidirectional charging against a noisy renewable request that
    /// regularly drops below zero.
    pub fn v2g() -> Self {
        Self {
            charging: ChargingConfig {
                opportunistic: true,
                bidirectional: true,
            },
            request: RequestConfig {
                avg_bus_power_kw: 100.0,
                filter_factor: 0.98,
                renewable_noise_std: 0.35,
                ..RequestConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "congested", "v2g"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "congested" => Ok(Self::congested()),
            "v2g" => Ok(Self::v2g()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// Relative `[data]` and `[request]` paths are resolved against the
    /// directory holding the file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut Option<PathBuf>| {
            if let Some(path) = p.as_mut().filter(|p| p.is_relative()) {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.data.chargers);
        resolve(&mut self.data.buses);
        resolve(&mut self.data.schedule);
        resolve(&mut self.request.series_csv);
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.days == 0 {
            errors.push(ConfigError::new("simulation.days", "must be > 0"));
        }
        if s.tick_secs <= 0 || 86_400 % s.tick_secs != 0 {
            errors.push(ConfigError::new(
                "simulation.tick_secs",
                "must be > 0 and divide 86400",
            ));
        }
        if !(s.trip_energy_margin.is_finite() && s.trip_energy_margin > 0.0) {
            errors.push(ConfigError::new("simulation.trip_energy_margin", "must be > 0"));
        }

        let f = &self.fleet;
        let unit = 0.0..=1.0;
        if !unit.contains(&f.min_soc) {
            errors.push(ConfigError::new("fleet.min_soc", "must be in [0.0, 1.0]"));
        }
        if !unit.contains(&f.max_soc) {
            errors.push(ConfigError::new("fleet.max_soc", "must be in [0.0, 1.0]"));
        }
        if f.min_soc >= f.max_soc {
            errors.push(ConfigError::new("fleet.min_soc", "must be < fleet.max_soc"));
        }
        if !unit.contains(&f.initial_soc) {
            errors.push(ConfigError::new("fleet.initial_soc", "must be in [0.0, 1.0]"));
        }
        if !unit.contains(&f.fallback_target_soc) {
            errors.push(ConfigError::new(
                "fleet.fallback_target_soc",
                "must be in [0.0, 1.0]",
            ));
        }

        let r = &self.request;
        if !REQUEST_MODELS.contains(&r.model.as_str()) {
            errors.push(ConfigError::new(
                "request.model",
                format!(
                    "must be one of {}, got \"{}\"",
                    REQUEST_MODELS.join(", "),
                    r.model
                ),
            ));
        }
        if !(0.0..1.0).contains(&r.filter_factor) {
            errors.push(ConfigError::new("request.filter_factor", "must be in [0.0, 1.0)"));
        }
        if r.renewable_peak_kw < 0.0 {
            errors.push(ConfigError::new("request.renewable_peak_kw", "must be >= 0"));
        }
        if r.renewable_noise_std < 0.0 {
            errors.push(ConfigError::new("request.renewable_noise_std", "must be >= 0"));
        }
        if r.model == "series" && r.series_csv.is_none() {
            errors.push(ConfigError::new(
                "request.series_csv",
                "required when request.model is \"series\"",
            ));
        }

        let d = &self.data;
        let given = [&d.chargers, &d.buses, &d.schedule]
            .iter()
            .filter(|p| p.is_some())
            .count();
        if given != 0 && given != 3 {
            errors.push(ConfigError::new(
                "data",
                "chargers, buses and schedule must be given together",
            ));
        }

        let syn = &self.synthetic;
        if syn.buses == 0 {
            errors.push(ConfigError::new("synthetic.buses", "must be > 0"));
        }
        if syn.chargers == 0 {
            errors.push(ConfigError::new("synthetic.chargers", "must be > 0"));
        }
        if syn.capacity_kwh <= 0.0 {
            errors.push(ConfigError::new("synthetic.capacity_kwh", "must be > 0"));
        }
        if syn.charge_rate_kw <= 0.0 {
            errors.push(ConfigError::new("synthetic.charge_rate_kw", "must be > 0"));
        }
        if syn.consumption_kwh_per_mile < 0.0 {
            errors.push(ConfigError::new(
                "synthetic.consumption_kwh_per_mile",
                "must be >= 0",
            ));
        }
        if syn.avg_speed_mph <= 0.0 {
            errors.push(ConfigError::new("synthetic.avg_speed_mph", "must be > 0"));
        }
        if syn.trip_minutes_min == 0 || syn.trip_minutes_min > syn.trip_minutes_max {
            errors.push(ConfigError::new(
                "synthetic.trip_minutes_min",
                "must be > 0 and <= synthetic.trip_minutes_max",
            ));
        }
        if syn.charge_minutes_min == 0 || syn.charge_minutes_min > syn.charge_minutes_max {
            errors.push(ConfigError::new(
                "synthetic.charge_minutes_min",
                "must be > 0 and <= synthetic.charge_minutes_max",
            ));
        }
        if !unit.contains(&syn.missing_distance_prob) {
            errors.push(ConfigError::new(
                "synthetic.missing_distance_prob",
                "must be in [0.0, 1.0]",
            ));
        }

        errors
    }

    /// Engine configuration for this scenario.
    ///
    /// Call only on a scenario whose [`validate`](Self::validate) came back empty.
    pub fn to_sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        let f = &self.fleet;
        SimConfig {
            start_time: s.start_time,
            route_policy: s.route_policy,
            trip_energy_margin: s.trip_energy_margin,
            min_soc: f.min_soc,
            max_soc: f.max_soc,
            initial_soc: f.initial_soc,
            fallback_target_soc: f.fallback_target_soc,
            ..SimConfig::new(s.days, s.seed).with_tick_secs(s.tick_secs)
        }
    }

    /// Charge flags enabled by the `[charging]` section.
    pub fn charge_mode(&self) -> ChargeMode {
        let mut mode = ChargeMode::empty();
        if self.charging.opportunistic {
            mode.insert(ChargeFlag::Opportunistic);
        }
        if self.charging.bidirectional {
            mode.insert(ChargeFlag::Bidirectional);
        }
        mode
    }
}
