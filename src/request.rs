//! Producers of the per-tick power request handed to the engine.
//!
//! The request is the power the grid side wants the fleet to draw (positive)
//! or supply (negative) during one tick. [`SmoothedRenewable`] models the
//! usual producer: the fleet absorbs the fast-moving part of renewable output
//! that a low-pass filtered dispatch leaves over.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::{ConfigError, RequestConfig};
use crate::error::Result;
use crate::io::records::load_request_series;
use crate::sim::types::SimConfig;

/// Source of the power request for each tick of a horizon.
pub trait RequestProfile {
    /// Requested fleet power for the tick with this index (kW).
    fn request_kw(&mut self, tick: usize) -> f64;
}

/// The same request every tick.
#[derive(Debug, Clone, Copy)]
pub struct FlatRequest {
    pub kw: f64,
}

impl RequestProfile for FlatRequest {
    fn request_kw(&mut self, _tick: usize) -> f64 {
        self.kw
    }
}

/// A recorded series, repeated when the horizon is longer than the recording.
#[derive(Debug, Clone)]
pub struct SeriesRequest {
    series: Vec<f64>,
}

impl SeriesRequest {
    pub fn new(series: Vec<f64>) -> Self {
        Self { series }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl RequestProfile for SeriesRequest {
    /// An empty series requests nothing.
    fn request_kw(&mut self, tick: usize) -> f64 {
        if self.series.is_empty() {
            return 0.0;
        }
        self.series[tick % self.series.len()]
    }
}

/// High-frequency residual of a renewable series around an average fleet draw.
///
/// Each tick the raw output is low-pass filtered with
/// `f = k * f + (1 - k) * raw`, seeded with the first raw value, and the
/// request is `avg_bus_power_kw + raw - f`.
#[derive(Debug, Clone)]
pub struct SmoothedRenewable {
    raw: Vec<f64>,
    avg_bus_power_kw: f64,
    filter_factor: f64,
    filtered: Option<f64>,
}

impl SmoothedRenewable {
    /// # Panics
    ///
    /// Panics if `filter_factor` is outside `[0, 1)`.
    pub fn new(raw: Vec<f64>, avg_bus_power_kw: f64, filter_factor: f64) -> Self {
        assert!((0.0..1.0).contains(&filter_factor));
        Self {
            raw,
            avg_bus_power_kw,
            filter_factor,
            filtered: None,
        }
    }
}

impl RequestProfile for SmoothedRenewable {
    /// Ticks must be requested in order; the filter carries state.
    fn request_kw(&mut self, tick: usize) -> f64 {
        let raw = if self.raw.is_empty() {
            0.0
        } else {
            self.raw[tick % self.raw.len()]
        };
        let k = self.filter_factor;
        let filtered = self.filtered.map_or(raw, |f| k * f + (1.0 - k) * raw);
        self.filtered = Some(filtered);
        self.avg_bus_power_kw + raw - filtered
    }
}

const SUNRISE_SECS: i64 = 6 * 3600;
const SUNSET_SECS: i64 = 18 * 3600;

/// Half-sine daylight shape in `[0, 1]` for a time of day in seconds.
pub fn daylight_frac(time_of_day: i64) -> f64 {
    if !(SUNRISE_SECS..SUNSET_SECS).contains(&time_of_day) {
        return 0.0;
    }
    let x = (time_of_day - SUNRISE_SECS) as f64 / (SUNSET_SECS - SUNRISE_SECS) as f64;
    (PI * x).sin()
}

/// Gaussian noise with mean 0 via the Box-Muller transform.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    z0 * std_dev
}

/// Seeded renewable generation for every tick of the horizon (kW, >= 0).
///
/// Output follows the daylight shape with multiplicative Gaussian noise
/// and is zero outside daylight.
pub fn renewable_profile(
    config: &SimConfig,
    peak_kw: f64,
    noise_std: f64,
    seed: u64,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    config
        .horizon()
        .map(|t| {
            let frac = daylight_frac(t.rem_euclid(86_400));
            if frac <= 0.0 {
                return 0.0;
            }
            let noise_mult = 1.0 + gaussian_noise(&mut rng, noise_std);
            (peak_kw.max(0.0) * frac * noise_mult).max(0.0)
        })
        .collect()
}

/// Builds the request profile described by a `[request]` section.
///
/// # Errors
///
/// Returns a `SimError` if the series file cannot be loaded or the model
/// name is unknown.
pub fn build_profile(
    request: &RequestConfig,
    config: &SimConfig,
) -> Result<Box<dyn RequestProfile>> {
    match request.model.as_str() {
        "flat" => Ok(Box::new(FlatRequest {
            kw: request.flat_kw,
        })),
        "series" => {
            let path = request.series_csv.as_deref().ok_or_else(|| ConfigError {
                field: "request.series_csv".to_string(),
                message: "required when request.model is \"series\"".to_string(),
            })?;
            Ok(Box::new(SeriesRequest::new(load_request_series(path)?)))
        }
        "smoothed_renewable" => {
            // Offset so the renewable draw is independent of fleet sampling.
            let raw = renewable_profile(
                config,
                request.renewable_peak_kw,
                request.renewable_noise_std,
                config.seed.wrapping_add(1),
            );
            Ok(Box::new(SmoothedRenewable::new(
                raw,
                request.avg_bus_power_kw,
                request.filter_factor,
            )))
        }
        other => Err(ConfigError {
            field: "request.model".to_string(),
            message: format!("unknown request model \"{other}\""),
        }
        .into()),
    }
}
