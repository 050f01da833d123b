//! Static charge schedule: which buses sit at which charger on every tick,
//! and how far each bus drives after leaving.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::{EntityKind, Result, SimError};
use crate::fleet::{Bus, BusId, ChargerId, Fleet};
use crate::io::records::ScheduleRecord;
use crate::sim::types::SimConfig;

/// For each charger and tick, the buses physically present.
///
/// Presence lists keep schedule-record order, which is the tie-break order
/// for equal charge priorities. Set operations compare bus identifiers only.
#[derive(Debug, Clone)]
pub struct ScheduleIndex {
    tick_secs: i64,
    presence: BTreeMap<ChargerId, BTreeMap<i64, Vec<BusId>>>,
}

impl ScheduleIndex {
    /// Creates an empty index on a grid of `tick_secs`.
    pub fn new(tick_secs: i64) -> Self {
        assert!(tick_secs > 0);
        Self {
            tick_secs,
            presence: BTreeMap::new(),
        }
    }

    /// Marks `bus` present at `charger` on every tick in `[start, end)`.
    pub fn insert_window(&mut self, charger: ChargerId, bus: BusId, start: i64, end: i64) {
        let ticks = self.presence.entry(charger).or_default();
        let mut t = start;
        while t < end {
            let present = ticks.entry(t).or_default();
            if !present.contains(&bus) {
                present.push(bus);
            }
            t += self.tick_secs;
        }
    }

    /// Buses at `charger` during the tick starting at `time`.
    pub fn present(&self, charger: ChargerId, time: i64) -> &[BusId] {
        self.presence
            .get(&charger)
            .and_then(|ticks| ticks.get(&time))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_present(&self, charger: ChargerId, bus: BusId, time: i64) -> bool {
        self.present(charger, time).contains(&bus)
    }

    /// Chargers that appear in at least one window.
    pub fn charger_ids(&self) -> impl Iterator<Item = ChargerId> + '_ {
        self.presence.keys().copied()
    }

    /// Buses present at `time - tick` but not at `time`, in identifier order.
    pub fn departures(&self, charger: ChargerId, time: i64) -> Vec<BusId> {
        let before: BTreeSet<BusId> = self
            .present(charger, time - self.tick_secs)
            .iter()
            .copied()
            .collect();
        let now: BTreeSet<BusId> = self.present(charger, time).iter().copied().collect();
        before.difference(&now).copied().collect()
    }

    /// Next departure time from `charger` for every bus present at `time`.
    ///
    /// Scans forward tick by tick; a bus departs at the first tick whose
    /// presence set no longer contains it.
    pub fn next_departures(&self, charger: ChargerId, time: i64) -> BTreeMap<BusId, i64> {
        let Some(ticks) = self.presence.get(&charger) else {
            return BTreeMap::new();
        };
        let mut waiting: BTreeSet<BusId> = self.present(charger, time).iter().copied().collect();
        let mut departures = BTreeMap::new();
        let mut t = time;

        while !waiting.is_empty() {
            t += self.tick_secs;
            let current: BTreeSet<BusId> = ticks
                .get(&t)
                .map(|v| v.iter().copied().collect())
                .unwrap_or_default();
            let left: Vec<BusId> = waiting.difference(&current).copied().collect();
            for bus in left {
                departures.insert(bus, t);
                waiting.remove(&bus);
            }
        }
        departures
    }
}

/// Distance of each bus's next trip, keyed by the end of the charge window
/// that precedes it.
#[derive(Debug, Clone, Default)]
pub struct TripEnergyTable {
    distances: BTreeMap<(BusId, i64), f64>,
}

impl TripEnergyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bus: BusId, window_end: i64, distance_mi: f64) {
        self.distances.insert((bus, window_end), distance_mi);
    }

    /// Recorded distance, or `None` when missing or not a number.
    pub fn distance(&self, bus: BusId, window_end: i64) -> Option<f64> {
        self.distances
            .get(&(bus, window_end))
            .copied()
            .filter(|d| !d.is_nan())
    }

    /// Recorded distance, or the distance whose energy would bring `bus`
    /// from its SOC floor back up to `config.fallback_target_soc`.
    pub fn distance_or_fallback(&self, bus: &Bus, window_end: i64, config: &SimConfig) -> f64 {
        self.distance(bus.id(), window_end)
            .unwrap_or_else(|| fallback_distance(bus, config))
    }
}

/// Trip distance that makes planning charge `bus` back to the fallback target SOC.
pub fn fallback_distance(bus: &Bus, config: &SimConfig) -> f64 {
    if bus.consumption_kwh_per_mile <= 0.0 {
        return 0.0;
    }
    let energy_kwh = (config.fallback_target_soc - bus.min_soc()).max(0.0) * bus.capacity_kwh;
    energy_kwh / bus.consumption_kwh_per_mile
}

/// Builds the presence index and trip table from schedule records.
///
/// # Errors
///
/// Returns [`SimError::EntityNotFound`] when a record names a bus or charger
/// missing from `fleet`, and [`SimError::MisalignedWindow`] when a window
/// boundary falls off the tick grid.
pub fn build_schedule(
    fleet: &Fleet,
    records: &[ScheduleRecord],
    config: &SimConfig,
) -> Result<(ScheduleIndex, TripEnergyTable)> {
    let mut index = ScheduleIndex::new(config.tick_secs);
    let mut trips = TripEnergyTable::new();

    for rec in records {
        if fleet.charger(ChargerId(rec.charger_id)).is_none() {
            return Err(SimError::EntityNotFound {
                kind: EntityKind::Charger,
                id: rec.charger_id,
                route: rec.route_id,
            });
        }
        if fleet.bus(BusId(rec.bus_id)).is_none() {
            return Err(SimError::EntityNotFound {
                kind: EntityKind::Bus,
                id: rec.bus_id,
                route: rec.route_id,
            });
        }
        if !config.is_aligned(rec.window_start) || !config.is_aligned(rec.window_end) {
            return Err(SimError::MisalignedWindow {
                route: rec.route_id,
                bus: rec.bus_id,
                start: rec.window_start,
                end: rec.window_end,
                tick_secs: config.tick_secs,
            });
        }
        if rec.window_end <= rec.window_start {
            warn!(
                route = rec.route_id,
                bus = rec.bus_id,
                start = rec.window_start,
                end = rec.window_end,
                "Empty charge window skipped"
            );
            continue;
        }

        index.insert_window(
            ChargerId(rec.charger_id),
            BusId(rec.bus_id),
            rec.window_start,
            rec.window_end,
        );
        trips.insert(BusId(rec.bus_id), rec.window_end, rec.next_trip_distance());
    }

    debug!(windows = records.len(), "Schedule index built");
    Ok((index, trips))
}
