//! CSV input records for chargers, buses, charge schedules, and request series.
//!
//! Column names follow the struct field names; surrounding whitespace is trimmed.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::{Result, SimError};
use crate::fleet::PlugType;

/// One row of plug inventory. Several rows may describe the same charger.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChargerRecord {
    pub charger_id: u32,
    pub name: String,
    pub plug_count: u32,
    pub plug_type: PlugType,
}

/// Static attributes of one bus.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BusRecord {
    pub bus_id: u32,
    pub capacity_kwh: f64,
    pub consumption_kwh_per_mile: f64,
    pub charge_rate_kw: f64,
    pub dist_first_charge_mi: f64,
    pub plug_type: PlugType,
}

/// A charge window: `bus_id` sits at `charger_id` for `[window_start, window_end)`
/// and then drives `next_trip_mi` miles.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduleRecord {
    pub route_id: u32,
    pub bus_id: u32,
    pub window_start: i64,
    pub window_end: i64,
    /// Missing or unparseable distances load as `None`.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub next_trip_mi: Option<f64>,
    pub charger_id: u32,
}

impl ScheduleRecord {
    /// Next trip distance, `NaN` when unknown.
    pub fn next_trip_distance(&self) -> f64 {
        self.next_trip_mi.unwrap_or(f64::NAN)
    }
}

/// The three record tables a fleet is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRecords {
    pub chargers: Vec<ChargerRecord>,
    pub buses: Vec<BusRecord>,
    pub schedule: Vec<ScheduleRecord>,
}

#[derive(Debug, Deserialize)]
struct RequestRow {
    power_kw: f64,
}

/// Deserializes every row of a CSV document.
///
/// # Errors
///
/// Returns the first `csv::Error` encountered (malformed row, type mismatch).
pub fn read_records<T: DeserializeOwned>(
    reader: impl Read,
) -> std::result::Result<Vec<T>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    rdr.deserialize().collect()
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)?;
    let records = read_records(file).map_err(|source| SimError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows = records.len(), "Loaded records");
    Ok(records)
}

/// Loads charger plug inventory rows.
///
/// # Errors
///
/// Returns a `SimError` if the file cannot be opened or a row is malformed.
pub fn load_chargers(path: &Path) -> Result<Vec<ChargerRecord>> {
    load(path)
}

/// Loads bus attribute rows.
///
/// # Errors
///
/// Returns a `SimError` if the file cannot be opened or a row is malformed.
pub fn load_buses(path: &Path) -> Result<Vec<BusRecord>> {
    load(path)
}

/// Loads charge window rows.
///
/// # Errors
///
/// Returns a `SimError` if the file cannot be opened or a row is malformed.
pub fn load_schedule(path: &Path) -> Result<Vec<ScheduleRecord>> {
    load(path)
}

/// Loads charger, bus, and schedule tables together.
///
/// # Errors
///
/// Returns the first `SimError` raised by any of the three loaders.
pub fn load_inputs(chargers: &Path, buses: &Path, schedule: &Path) -> Result<InputRecords> {
    Ok(InputRecords {
        chargers: load_chargers(chargers)?,
        buses: load_buses(buses)?,
        schedule: load_schedule(schedule)?,
    })
}

/// Loads a single `power_kw` column of per-tick power requests.
///
/// # Errors
///
/// Returns a `SimError` if the file cannot be opened or a row is malformed.
pub fn load_request_series(path: &Path) -> Result<Vec<f64>> {
    let rows: Vec<RequestRow> = load(path)?;
    Ok(rows.into_iter().map(|row| row.power_kw).collect())
}
