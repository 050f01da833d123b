//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use bus_charge_sim::fleet::PlugType;
use bus_charge_sim::io::records::{BusRecord, ChargerRecord, ScheduleRecord};
use bus_charge_sim::sim::engine::Engine;
use bus_charge_sim::sim::types::SimConfig;

/// Horizon start (04:30).
pub const T0: i64 = 16_200;

/// One day of one-minute ticks, seed 42.
pub fn default_config() -> SimConfig {
    SimConfig::new(1, 42)
}

pub fn charger(id: u32, name: &str, plugs: u32, plug_type: &str) -> ChargerRecord {
    ChargerRecord {
        charger_id: id,
        name: name.to_string(),
        plug_count: plugs,
        plug_type: PlugType::from(plug_type),
    }
}

/// A bus consuming 1 kWh per mile, so trip miles read as trip kWh.
///
/// `pre_trip_mi` miles driven before the horizon lower the initial SOC
/// of 0.5 by `pre_trip_mi / capacity_kwh`.
pub fn bus(
    id: u32,
    capacity_kwh: f64,
    rate_kw: f64,
    pre_trip_mi: f64,
    plug_type: &str,
) -> BusRecord {
    BusRecord {
        bus_id: id,
        capacity_kwh,
        consumption_kwh_per_mile: 1.0,
        charge_rate_kw: rate_kw,
        dist_first_charge_mi: pre_trip_mi,
        plug_type: PlugType::from(plug_type),
    }
}

pub fn window(bus_id: u32, charger_id: u32, start: i64, end: i64, trip_mi: f64) -> ScheduleRecord {
    ScheduleRecord {
        route_id: bus_id,
        bus_id,
        window_start: start,
        window_end: end,
        next_trip_mi: Some(trip_mi),
        charger_id,
    }
}

pub fn engine(
    chargers: &[ChargerRecord],
    buses: &[BusRecord],
    schedule: &[ScheduleRecord],
) -> Engine {
    Engine::from_records(default_config(), chargers, buses, schedule).expect("valid records")
}
