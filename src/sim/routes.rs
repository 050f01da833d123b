//! Departure detection and trip energy draw.

use thiserror::Error;
use tracing::warn;

use crate::fleet::{BusId, ChargerId, Fleet, PowerCommand, SocError};
use crate::sim::schedule::{ScheduleIndex, TripEnergyTable};
use crate::sim::tick::TickContext;
use crate::sim::types::{RoutePolicy, SimConfig};

/// A bus left a charger without enough energy above its floor for the trip.
///
/// Recorded in telemetry; the run always continues.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "insufficient charge for scheduled route: bus {bus} left charger {charger} at {time} needing {required_kwh:.2} kWh with {available_kwh:.2} kWh above its floor"
)]
pub struct RouteShortfall {
    pub bus: BusId,
    pub charger: ChargerId,
    pub time: i64,
    pub required_kwh: f64,
    pub available_kwh: f64,
}

/// Draws trip energy from every bus that left a charger since the last tick.
///
/// The draw is the full trip energy issued as one hour of route power at the
/// departure time. A draw that would cross the SOC floor raises a
/// [`RouteShortfall`] and, under [`RoutePolicy::Force`], is committed anyway.
/// Nothing happens on the first tick of the horizon.
pub fn handle_departures(
    fleet: &mut Fleet,
    schedule: &ScheduleIndex,
    trips: &TripEnergyTable,
    ctx: &mut TickContext,
    config: &SimConfig,
) {
    if config.is_horizon_start(ctx.time) {
        return;
    }

    let chargers: Vec<ChargerId> = fleet.charger_ids().collect();
    for charger in chargers {
        for bus_id in schedule.departures(charger, ctx.time) {
            let Some(bus) = fleet.bus_mut(bus_id) else {
                continue;
            };
            ctx.departures += 1;

            let distance = trips.distance_or_fallback(bus, ctx.time, config);
            let required_kwh = distance * bus.consumption_kwh_per_mile;
            let command = PowerCommand::on_route(-required_kwh, 3600.0);

            match bus.command_power(command, ctx.time, false) {
                Ok(()) => ctx.route_energy_kwh -= required_kwh,
                Err(SocError::UnderMinSoc { .. }) => {
                    let shortfall = RouteShortfall {
                        bus: bus_id,
                        charger,
                        time: ctx.time,
                        required_kwh,
                        available_kwh: bus.usable_energy_kwh(),
                    };
                    warn!(bus = %bus_id, charger = %charger, "{shortfall}");
                    if config.route_policy == RoutePolicy::Force {
                        ctx.route_energy_kwh += bus.force_power(command, ctx.time);
                    }
                    ctx.shortfalls.push(shortfall);
                }
                // Still above the ceiling after the trip; nothing to protect.
                Err(SocError::OverMaxSoc { .. }) => {
                    ctx.route_energy_kwh += bus.force_power(command, ctx.time);
                }
            }
        }
    }
}
