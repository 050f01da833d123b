//! Per-tick scratch state shared between the allocation phases.
//!
//! A [`TickContext`] is built fresh at the start of every tick, threaded
//! through priority computation, allocation, and departure handling, and
//! then reduced into a [`TickReport`](crate::sim::telemetry::TickReport).

use std::collections::{BTreeMap, BTreeSet};

use crate::fleet::{BusId, Charger, ChargerId, PlugType};
use crate::sim::routes::RouteShortfall;

/// Charge urgency of one bus at one charger for the current tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Priority {
    pub bus: BusId,
    /// Energy deficit per minute until departure, in multiples of the
    /// bus's rated charge per minute.
    pub score: f64,
    /// The deadline becomes unreachable at rated power if this tick is skipped.
    pub necessary: bool,
    /// Next departure from this charger.
    pub departure: i64,
    /// Trip energy still missing above the SOC floor (kWh).
    pub energy_deficit_kwh: f64,
}

/// Plugs placed this tick per `(charger, plug type)`.
#[derive(Debug, Clone, Default)]
pub struct PlugUsage {
    in_use: BTreeMap<(ChargerId, PlugType), u32>,
}

impl PlugUsage {
    pub fn in_use(&self, charger: ChargerId, plug_type: &PlugType) -> u32 {
        self.in_use
            .get(&(charger, plug_type.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Whether `charger` still has a free plug of `plug_type`.
    pub fn has_free(&self, charger: &Charger, plug_type: &PlugType) -> bool {
        charger
            .num_plugs_avail(plug_type, self.in_use(charger.id(), plug_type))
            .is_some_and(|free| free > 0)
    }

    /// Takes one plug of `plug_type` at `charger` if one is free.
    pub fn try_claim(&mut self, charger: &Charger, plug_type: &PlugType) -> bool {
        if !self.has_free(charger, plug_type) {
            return false;
        }
        *self
            .in_use
            .entry((charger.id(), plug_type.clone()))
            .or_insert(0) += 1;
        true
    }
}

/// Scratch state for one tick of the simulation.
#[derive(Debug, Clone)]
pub struct TickContext {
    pub time: i64,
    pub power_request_kw: f64,
    /// Sorted priorities of every bus present, per charger.
    pub priorities: BTreeMap<ChargerId, Vec<Priority>>,
    pub plug_usage: PlugUsage,
    /// Sum of committed charger power this tick (kW, negative when discharging).
    pub power_consumed_kw: f64,
    pub necessity_commands: usize,
    pub budget_commands: usize,
    pub remaining_commands: usize,
    pub departures: usize,
    /// Energy drawn by departures this tick (kWh, negative).
    pub route_energy_kwh: f64,
    pub shortfalls: Vec<RouteShortfall>,
    commanded: BTreeSet<BusId>,
}

impl TickContext {
    pub fn new(time: i64, power_request_kw: f64) -> Self {
        Self {
            time,
            power_request_kw,
            priorities: BTreeMap::new(),
            plug_usage: PlugUsage::default(),
            power_consumed_kw: 0.0,
            necessity_commands: 0,
            budget_commands: 0,
            remaining_commands: 0,
            departures: 0,
            route_energy_kwh: 0.0,
            shortfalls: Vec::new(),
            commanded: BTreeSet::new(),
        }
    }

    /// Records that `bus` received a charger command this tick.
    pub fn mark_commanded(&mut self, bus: BusId) {
        self.commanded.insert(bus);
    }

    /// A bus is plugged in at most once per tick, even if the schedule
    /// places it at two chargers.
    pub fn is_commanded(&self, bus: BusId) -> bool {
        self.commanded.contains(&bus)
    }

    /// Power request not yet met by committed commands.
    pub fn remaining_target_kw(&self) -> f64 {
        self.power_request_kw - self.power_consumed_kw
    }
}
