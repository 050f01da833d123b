//! Seeded synthetic fleet for running without external data.
//!
//! Every bus alternates between driving and sitting at its home charger.
//! Durations are drawn uniformly from the configured minute ranges and
//! rounded up to whole ticks so every window lies on the tick grid.

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::info;

use crate::config::SyntheticConfig;
use crate::fleet::PlugType;
use crate::io::records::{BusRecord, ChargerRecord, InputRecords, ScheduleRecord};
use crate::sim::types::SimConfig;

/// Generates charger, bus, and schedule records from `config.seed`.
///
/// Bus `n` is homed at charger `(n - 1) % chargers + 1` and serves route `n`.
/// Windows start anywhere in the horizon and may end after it; a bus whose
/// window ends past the horizon simply never departs.
///
/// # Examples
///
/// ```
/// use bus_charge_sim::config::SyntheticConfig;
/// use bus_charge_sim::scenario::generate;
/// use bus_charge_sim::sim::types::SimConfig;
///
/// let records = generate(&SyntheticConfig::default(), &SimConfig::new(1, 7));
/// assert_eq!(records.buses.len(), 12);
/// assert_eq!(records, generate(&SyntheticConfig::default(), &SimConfig::new(1, 7)));
/// ```
pub fn generate(synthetic: &SyntheticConfig, config: &SimConfig) -> InputRecords {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let plug_type = PlugType::from(synthetic.plug_type.as_str());

    let chargers: Vec<ChargerRecord> = (1..=synthetic.chargers)
        .map(|id| ChargerRecord {
            charger_id: id,
            name: format!("Depot {id}"),
            plug_count: synthetic.plugs_per_charger,
            plug_type: plug_type.clone(),
        })
        .collect();

    let mut buses = Vec::with_capacity(synthetic.buses as usize);
    let mut schedule = Vec::new();

    for id in 1..=synthetic.buses {
        // Up to one hour of driving before the first window.
        let first_trip_mi = rng.random_range(0.0..=synthetic.avg_speed_mph);
        buses.push(BusRecord {
            bus_id: id,
            capacity_kwh: synthetic.capacity_kwh,
            consumption_kwh_per_mile: synthetic.consumption_kwh_per_mile,
            charge_rate_kw: synthetic.charge_rate_kw,
            dist_first_charge_mi: first_trip_mi,
            plug_type: plug_type.clone(),
        });

        let charger_id = (id - 1) % synthetic.chargers.max(1) + 1;
        let mut t = config.start_time + ticks_in(&mut rng, synthetic.trip_range(), config);

        while t < config.end_time() {
            let window_end = t + ticks_in(&mut rng, synthetic.charge_range(), config);
            let trip_secs = ticks_in(&mut rng, synthetic.trip_range(), config);
            let missing = rng.random_bool(synthetic.missing_distance_prob);
            let next_trip_mi =
                (!missing).then(|| trip_secs as f64 / 3600.0 * synthetic.avg_speed_mph);

            schedule.push(ScheduleRecord {
                route_id: id,
                bus_id: id,
                window_start: t,
                window_end,
                next_trip_mi,
                charger_id,
            });
            t = window_end + trip_secs;
        }
    }

    info!(
        chargers = chargers.len(),
        buses = buses.len(),
        windows = schedule.len(),
        seed = config.seed,
        "Generated synthetic fleet"
    );

    InputRecords {
        chargers,
        buses,
        schedule,
    }
}

/// Draws a duration in minutes and rounds it up to whole ticks (seconds).
fn ticks_in(rng: &mut StdRng, minutes: (u32, u32), config: &SimConfig) -> i64 {
    let (lo, hi) = minutes;
    let secs = i64::from(rng.random_range(lo..=hi.max(lo))) * 60;
    let tick = config.tick_secs;
    (secs + tick - 1) / tick * tick
}

impl SyntheticConfig {
    fn trip_range(&self) -> (u32, u32) {
        (self.trip_minutes_min, self.trip_minutes_max)
    }

    fn charge_range(&self) -> (u32, u32) {
        (self.charge_minutes_min, self.charge_minutes_max)
    }
}
