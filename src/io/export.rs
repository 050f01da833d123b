//! CSV export of the per-tick tables of a finished run.
//!
//! Entity tables share one layout: a header row whose first cell is empty,
//! followed by one row per horizon tick with the epoch timestamp first.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::fleet::Bus;
use crate::sim::engine::Engine;
use crate::sim::telemetry::TickReport;

/// Column header for the per-tick report table.
const TICKS_HEADER: &str = "index,time,request_kw,consumed_kw,tracking_error_kw,\
                            necessity_commands,budget_commands,remaining_commands,\
                            departures,route_energy_kwh,plugs_in_use,shortfalls";

/// Per-bus quantity exported as one table, one column per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusTable {
    /// State of charge at each tick.
    Soc,
    /// Energy exchanged at a charger during each tick (kWh).
    ChargerEnergy,
    /// Energy drawn on route during each tick (kWh).
    RouteEnergy,
}

impl BusTable {
    pub const ALL: [Self; 3] = [Self::Soc, Self::ChargerEnergy, Self::RouteEnergy];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Soc => "bus_soc.csv",
            Self::ChargerEnergy => "bus_energy.csv",
            Self::RouteEnergy => "bus_route.csv",
        }
    }

    fn value(self, bus: &Bus, time: i64) -> f64 {
        match self {
            Self::Soc => bus.soc_at(time),
            Self::ChargerEnergy => bus.charger_energy_at(time),
            Self::RouteEnergy => bus.route_energy_at(time),
        }
    }
}

/// Writes the per-tick report table.
///
/// # Errors
///
/// Returns a `SimError` if writing fails.
pub fn write_ticks(reports: &[TickReport], writer: impl Write) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(TICKS_HEADER.split(',').map(str::trim))?;

    for r in reports {
        wtr.write_record(&[
            r.index.to_string(),
            r.time.to_string(),
            format!("{:.4}", r.power_request_kw),
            format!("{:.4}", r.power_consumed_kw),
            format!("{:.4}", r.tracking_error_kw),
            r.necessity_commands.to_string(),
            r.budget_commands.to_string(),
            r.remaining_commands.to_string(),
            r.departures.to_string(),
            format!("{:.4}", r.route_energy_kwh),
            r.plugs_in_use().to_string(),
            r.shortfalls.len().to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes plugs in use per `(charger, plug type)`, headed `name:plug`.
///
/// Ticks the engine has not run yet are written as zero usage.
///
/// # Errors
///
/// Returns a `SimError` if writing fails.
pub fn write_charger_usage(engine: &Engine, writer: impl Write) -> Result<()> {
    let fleet = engine.fleet();
    let columns = fleet.plug_columns();
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let mut header = vec![String::new()];
    for (charger, plug) in &columns {
        let name = fleet.charger(*charger).map_or("", |c| c.name());
        header.push(format!("{name}:{plug}"));
    }
    wtr.write_record(&header)?;

    let by_time: BTreeMap<i64, &TickReport> =
        engine.reports().iter().map(|r| (r.time, r)).collect();
    for time in engine.config().horizon() {
        let mut row = vec![time.to_string()];
        match by_time.get(&time) {
            Some(report) => row.extend(report.plug_usage.iter().map(u32::to_string)),
            None => row.extend(columns.iter().map(|_| "0".to_string())),
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes one per-bus table, columns in bus id order.
///
/// # Errors
///
/// Returns a `SimError` if writing fails.
pub fn write_bus_table(engine: &Engine, table: BusTable, writer: impl Write) -> Result<()> {
    let buses: Vec<&Bus> = engine.fleet().buses().collect();
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let header = std::iter::once(String::new()).chain(buses.iter().map(|b| b.id().to_string()));
    wtr.write_record(header)?;

    for time in engine.config().horizon() {
        let row = std::iter::once(time.to_string())
            .chain(buses.iter().map(|b| format!("{:.6}", table.value(b, time))));
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}

fn create(path: &Path) -> Result<io::BufWriter<File>> {
    Ok(io::BufWriter::new(File::create(path)?))
}

/// Exports the per-tick report table to a CSV file.
///
/// # Errors
///
/// Returns a `SimError` if file creation or writing fails.
pub fn export_ticks(reports: &[TickReport], path: &Path) -> Result<()> {
    write_ticks(reports, create(path)?)
}

/// Writes every output table into `dir`, creating it if needed.
///
/// Returns the paths written, in a fixed order.
///
/// # Errors
///
/// Returns a `SimError` if the directory or any file cannot be written.
pub fn export_tables(dir: &Path, engine: &Engine) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(5);

    let path = dir.join("charger_usage.csv");
    write_charger_usage(engine, create(&path)?)?;
    written.push(path);

    for table in BusTable::ALL {
        let path = dir.join(table.file_name());
        write_bus_table(engine, table, create(&path)?)?;
        written.push(path);
    }

    let path = dir.join("ticks.csv");
    export_ticks(engine.reports(), &path)?;
    written.push(path);

    info!(dir = %dir.display(), files = written.len(), "Exported tables");
    Ok(written)
}
