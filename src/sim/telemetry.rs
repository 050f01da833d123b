//! Per-tick record archived by the engine.

use std::fmt;

use crate::fleet::Fleet;
use crate::sim::routes::RouteShortfall;
use crate::sim::tick::TickContext;

/// Outcome of one simulated tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Tick index from the start of the horizon.
    pub index: usize,
    /// Epoch seconds of the tick.
    pub time: i64,
    /// Power requested from the fleet (kW).
    pub power_request_kw: f64,
    /// Power committed at chargers (kW).
    pub power_consumed_kw: f64,
    /// Consumed minus requested (kW).
    pub tracking_error_kw: f64,
    pub necessity_commands: usize,
    pub budget_commands: usize,
    pub remaining_commands: usize,
    pub departures: usize,
    /// Energy drawn by departing buses (kWh, negative).
    pub route_energy_kwh: f64,
    /// Plugs in use, aligned with [`Fleet::plug_columns`].
    pub plug_usage: Vec<u32>,
    pub shortfalls: Vec<RouteShortfall>,
}

impl TickReport {
    /// Reduces a finished tick context into its report.
    pub fn from_context(index: usize, ctx: TickContext, fleet: &Fleet) -> Self {
        let plug_usage = fleet
            .plug_columns()
            .iter()
            .map(|(charger, plug)| ctx.plug_usage.in_use(*charger, plug))
            .collect();
        Self {
            index,
            time: ctx.time,
            power_request_kw: ctx.power_request_kw,
            power_consumed_kw: ctx.power_consumed_kw,
            tracking_error_kw: ctx.power_consumed_kw - ctx.power_request_kw,
            necessity_commands: ctx.necessity_commands,
            budget_commands: ctx.budget_commands,
            remaining_commands: ctx.remaining_commands,
            departures: ctx.departures,
            route_energy_kwh: ctx.route_energy_kwh,
            plug_usage,
            shortfalls: ctx.shortfalls,
        }
    }

    /// Total plugs occupied across every charger.
    pub fn plugs_in_use(&self) -> u32 {
        self.plug_usage.iter().sum()
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>7} req={:>9.2}kW used={:>9.2}kW err={:>8.2}kW plugs={:>3} cmds={}/{}/{} dep={} short={}",
            self.time,
            self.power_request_kw,
            self.power_consumed_kw,
            self.tracking_error_kw,
            self.plugs_in_use(),
            self.necessity_commands,
            self.budget_commands,
            self.remaining_commands,
            self.departures,
            self.shortfalls.len(),
        )
    }
}
