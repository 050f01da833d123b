//! Charge urgency and necessity of every bus present at a charger.

use crate::fleet::{Bus, ChargerId, Fleet};
use crate::sim::schedule::{ScheduleIndex, TripEnergyTable};
use crate::sim::tick::Priority;
use crate::sim::types::{NECESSITY_SLACK_SECS, SimConfig};

/// Urgency of charging `bus` at `time` for a departure at `departure`.
///
/// Scores use the bus's rated charge per minute as the unit, so a score of
/// 1.0 means the bus must charge at full rate for every remaining minute.
/// A departure at or before `time` is treated as maximally urgent.
pub fn score_bus(
    bus: &Bus,
    time: i64,
    departure: i64,
    trip_distance_mi: f64,
    config: &SimConfig,
) -> Priority {
    let trip_energy = trip_distance_mi * bus.consumption_kwh_per_mile * config.trip_energy_margin;
    let deficit = trip_energy - bus.usable_energy_kwh();
    let rate = bus.charge_rate_kwh_per_min();

    let minutes = (departure - time) as f64 / 60.0;
    let score = if minutes > 0.0 {
        (deficit / minutes) / rate
    } else {
        f64::MAX
    };

    // Minutes left if this whole tick passes without charging.
    let lookahead =
        (departure as f64 - (time as f64 + config.tick_duration() - NECESSITY_SLACK_SECS)) / 60.0;
    let necessary = if lookahead > 0.0 {
        deficit / lookahead > rate
    } else {
        deficit > 0.0
    };

    Priority {
        bus: bus.id(),
        score,
        necessary,
        departure,
        energy_deficit_kwh: deficit,
    }
}

/// Sorts priorities by descending score, keeping input order among ties.
pub fn sort_descending(priorities: &mut [Priority]) {
    priorities.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Priorities of every bus present at `charger` at `time`, most urgent first.
///
/// Buses are scored in schedule order before sorting, so equal scores keep
/// the order in which their windows were loaded.
pub fn charger_priorities(
    fleet: &Fleet,
    schedule: &ScheduleIndex,
    trips: &TripEnergyTable,
    charger: ChargerId,
    time: i64,
    config: &SimConfig,
) -> Vec<Priority> {
    let departures = schedule.next_departures(charger, time);
    let mut priorities: Vec<Priority> = schedule
        .present(charger, time)
        .iter()
        .filter_map(|&id| {
            let bus = fleet.bus(id)?;
            let departure = *departures.get(&id)?;
            let distance = trips.distance_or_fallback(bus, departure, config);
            Some(score_bus(bus, time, departure, distance, config))
        })
        .collect();
    sort_descending(&mut priorities);
    priorities
}
