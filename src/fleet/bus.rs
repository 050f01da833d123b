use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::fleet::charger::PlugType;
use crate::sim::types::SimConfig;

/// Stable bus identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusId(pub u32);

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the energy of a power command is accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerType {
    /// Energy consumed while driving a route.
    OnRoute,
    /// Energy exchanged while plugged into a charger.
    AtCharger,
}

/// A single power instruction applied to one bus.
///
/// # Power Convention
/// - Positive `power_kw`: energy flows into the battery
/// - Negative `power_kw`: energy leaves the battery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerCommand {
    pub power_kw: f64,
    pub duration_secs: f64,
    pub power_type: PowerType,
}

impl PowerCommand {
    /// Command exchanged with a charger plug.
    pub fn at_charger(power_kw: f64, duration_secs: f64) -> Self {
        Self {
            power_kw,
            duration_secs,
            power_type: PowerType::AtCharger,
        }
    }

    /// Command representing a trip's energy draw.
    pub fn on_route(power_kw: f64, duration_secs: f64) -> Self {
        Self {
            power_kw,
            duration_secs,
            power_type: PowerType::OnRoute,
        }
    }

    /// Energy moved by this command in kWh (signed).
    pub fn energy_kwh(&self) -> f64 {
        self.power_kw * self.duration_secs / 3600.0
    }
}

/// Rejection of an unforced command that would leave the SOC safety band.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SocError {
    #[error("command would raise SOC to {soc:.4}, above ceiling {max_soc:.2}")]
    OverMaxSoc { soc: f64, max_soc: f64 },
    #[error("command would drop SOC to {soc:.4}, below floor {min_soc:.2}")]
    UnderMinSoc { soc: f64, min_soc: f64 },
}

/// An electric bus and its battery state trajectory.
///
/// The SOC is only ever mutated through [`Bus::command_power`] or
/// [`Bus::force_power`]; each committed command records the SOC at its
/// timestamp and back-fills skipped ticks so the history stays dense.
#[derive(Debug, Clone)]
pub struct Bus {
    id: BusId,
    /// Battery capacity in kilowatt-hours.
    pub capacity_kwh: f64,
    /// Energy consumed per mile driven.
    pub consumption_kwh_per_mile: f64,
    /// Rated charging power in kilowatts.
    pub charge_rate_kw: f64,
    /// Miles driven before the first charge window of the horizon.
    pub dist_first_charge_mi: f64,
    plug_type: PlugType,
    min_soc: f64,
    max_soc: f64,
    tick_secs: i64,

    soc: f64,
    soc_history: BTreeMap<i64, f64>,
    charger_energy: BTreeMap<i64, f64>,
    route_energy: BTreeMap<i64, f64>,
    last_commanded: i64,
}

impl Bus {
    /// Creates a bus at the start of the horizon.
    ///
    /// The initial SOC is `config.initial_soc` minus the energy spent driving
    /// `dist_first_charge_mi` before the first charge window.
    ///
    /// # Panics
    ///
    /// Panics if capacity or charge rate is not positive, or consumption is negative.
    pub fn new(
        id: BusId,
        capacity_kwh: f64,
        consumption_kwh_per_mile: f64,
        charge_rate_kw: f64,
        dist_first_charge_mi: f64,
        plug_type: PlugType,
        config: &SimConfig,
    ) -> Self {
        assert!(capacity_kwh > 0.0, "bus {id}: capacity must be > 0");
        assert!(charge_rate_kw > 0.0, "bus {id}: charge rate must be > 0");
        assert!(consumption_kwh_per_mile >= 0.0);

        let pre_horizon_kwh = dist_first_charge_mi.max(0.0) * consumption_kwh_per_mile;
        let soc = (config.initial_soc - pre_horizon_kwh / capacity_kwh).clamp(0.0, 1.0);

        let mut bus = Self {
            id,
            capacity_kwh,
            consumption_kwh_per_mile,
            charge_rate_kw,
            dist_first_charge_mi,
            plug_type,
            min_soc: config.min_soc,
            max_soc: config.max_soc,
            tick_secs: config.tick_secs,
            soc,
            soc_history: BTreeMap::new(),
            charger_energy: BTreeMap::new(),
            route_energy: BTreeMap::new(),
            last_commanded: config.start_time,
        };
        bus.soc_history.insert(config.start_time, soc);
        bus
    }

    /// Overwrites the current SOC and its entry at the last commanded timestamp.
    pub fn init_soc(&mut self, soc: f64) {
        self.soc = soc.clamp(0.0, 1.0);
        self.soc_history.insert(self.last_commanded, self.soc);
    }

    pub fn id(&self) -> BusId {
        self.id
    }

    pub fn plug_type(&self) -> &PlugType {
        &self.plug_type
    }

    pub fn min_soc(&self) -> f64 {
        self.min_soc
    }

    pub fn max_soc(&self) -> f64 {
        self.max_soc
    }

    /// Current state of charge (0.0 to 1.0).
    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Rated charging power expressed as energy per minute.
    pub fn charge_rate_kwh_per_min(&self) -> f64 {
        self.charge_rate_kw / 60.0
    }

    /// Energy stored above the SOC floor (negative when below it).
    pub fn usable_energy_kwh(&self) -> f64 {
        (self.soc - self.min_soc) * self.capacity_kwh
    }

    /// Power that would move the SOC exactly to `target_soc` over `duration_secs`.
    pub fn power_to_reach(&self, target_soc: f64, duration_secs: f64) -> f64 {
        (target_soc - self.soc) * self.capacity_kwh * 3600.0 / duration_secs
    }

    /// Applies a power command, rejecting it if it would leave `[min_soc, max_soc]`.
    ///
    /// With `force` the bounds are ignored and the command always commits.
    ///
    /// # Errors
    ///
    /// Returns [`SocError::OverMaxSoc`] or [`SocError::UnderMinSoc`] when an
    /// unforced command would breach the band; the bus is left unchanged.
    pub fn command_power(
        &mut self,
        command: PowerCommand,
        timestamp: i64,
        force: bool,
    ) -> Result<(), SocError> {
        if !force {
            let new_soc = self.soc + command.energy_kwh() / self.capacity_kwh;
            if new_soc > self.max_soc {
                return Err(SocError::OverMaxSoc {
                    soc: new_soc,
                    max_soc: self.max_soc,
                });
            }
            if new_soc < self.min_soc {
                return Err(SocError::UnderMinSoc {
                    soc: new_soc,
                    min_soc: self.min_soc,
                });
            }
        }
        self.force_power(command, timestamp);
        Ok(())
    }

    /// Applies a power command regardless of the SOC band.
    ///
    /// The battery itself still cannot hold less than nothing or more than its
    /// capacity, so the committed SOC is clamped to `[0, 1]` and the recorded
    /// energy reflects what was actually stored. Returns the committed energy
    /// in kWh.
    pub fn force_power(&mut self, command: PowerCommand, timestamp: i64) -> f64 {
        self.backfill_until(timestamp);

        let new_soc = (self.soc + command.energy_kwh() / self.capacity_kwh).clamp(0.0, 1.0);
        let delta_kwh = (new_soc - self.soc) * self.capacity_kwh;

        self.soc = new_soc;
        self.soc_history.insert(timestamp, new_soc);
        let bucket = match command.power_type {
            PowerType::AtCharger => &mut self.charger_energy,
            PowerType::OnRoute => &mut self.route_energy,
        };
        *bucket.entry(timestamp).or_insert(0.0) += delta_kwh;
        self.last_commanded = self.last_commanded.max(timestamp);
        delta_kwh
    }

    // Ticks strictly between the last command and `timestamp` hold the last SOC
    // and no energy flow.
    fn backfill_until(&mut self, timestamp: i64) {
        let mut t = self.last_commanded + self.tick_secs;
        while t < timestamp {
            self.soc_history.entry(t).or_insert(self.soc);
            self.charger_energy.entry(t).or_insert(0.0);
            self.route_energy.entry(t).or_insert(0.0);
            t += self.tick_secs;
        }
    }

    /// SOC at `timestamp`: the exact record if present, else the most recent
    /// earlier one. Never interpolates.
    pub fn soc_at(&self, timestamp: i64) -> f64 {
        self.soc_history
            .range(..=timestamp)
            .next_back()
            .or_else(|| self.soc_history.first_key_value())
            .map_or(self.soc, |(_, soc)| *soc)
    }

    /// Energy exchanged at a charger during the tick at `timestamp` (kWh).
    pub fn charger_energy_at(&self, timestamp: i64) -> f64 {
        self.charger_energy.get(&timestamp).copied().unwrap_or(0.0)
    }

    /// Energy drawn on route at `timestamp` (kWh, negative while driving).
    pub fn route_energy_at(&self, timestamp: i64) -> f64 {
        self.route_energy.get(&timestamp).copied().unwrap_or(0.0)
    }

    /// Timestamp of the latest committed command.
    pub fn last_commanded(&self) -> i64 {
        self.last_commanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cfg() -> SimConfig {
        SimConfig::new(1, 0)
    }

    fn bus() -> Bus {
        Bus::new(BusId(1), 100.0, 2.0, 60.0, 0.0, PlugType::from("A"), &cfg())
    }

    #[test]
    fn initial_soc_subtracts_pre_horizon_driving() {
        let b = Bus::new(BusId(7), 200.0, 2.0, 60.0, 10.0, PlugType::from("A"), &cfg());
        // 10 mi * 2 kWh/mi = 20 kWh = 0.1 of capacity
        assert_relative_eq!(b.soc(), 0.4, epsilon = 1e-12);
        assert_relative_eq!(b.soc_at(16_200), 0.4, epsilon = 1e-12);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        Bus::new(BusId(1), 0.0, 2.0, 60.0, 0.0, PlugType::from("A"), &cfg());
    }

    #[test]
    fn charge_for_one_minute() {
        let mut b = bus();
        b.command_power(PowerCommand::at_charger(60.0, 60.0), 16_200, false)
            .expect("within band");
        // 60 kW for 60 s = 1 kWh = 0.01 of capacity
        assert_relative_eq!(b.soc(), 0.51, epsilon = 1e-12);
        assert_relative_eq!(b.charger_energy_at(16_200), 1.0, epsilon = 1e-12);
        assert_eq!(b.route_energy_at(16_200), 0.0);
    }

    #[test]
    fn over_max_soc_leaves_state_unchanged() {
        let mut b = bus();
        b.init_soc(0.895);
        let err = b
            .command_power(PowerCommand::at_charger(60.0, 60.0), 16_260, false)
            .expect_err("exceeds ceiling");
        assert!(matches!(err, SocError::OverMaxSoc { .. }));
        assert_eq!(b.soc(), 0.895);
        assert_eq!(b.charger_energy_at(16_260), 0.0);
        assert_eq!(b.last_commanded(), 16_200);
    }

    #[test]
    fn under_min_soc_leaves_state_unchanged() {
        let mut b = bus();
        b.init_soc(0.12);
        let err = b
            .command_power(PowerCommand::on_route(-5.0, 3600.0), 16_260, false)
            .expect_err("breaches floor");
        assert!(matches!(err, SocError::UnderMinSoc { .. }));
        assert_eq!(b.soc(), 0.12);
    }

    #[test]
    fn forced_command_ignores_band() {
        let mut b = bus();
        b.init_soc(0.09);
        b.command_power(PowerCommand::at_charger(60.0, 60.0), 16_200, true)
            .expect("forced commands always commit");
        assert_relative_eq!(b.soc(), 0.10, epsilon = 1e-12);
    }

    #[test]
    fn forced_command_still_clamps_to_physical_limits() {
        let mut b = bus();
        b.init_soc(0.05);
        let delta = b.force_power(PowerCommand::on_route(-20.0, 3600.0), 16_260);
        assert_eq!(b.soc(), 0.0);
        assert_relative_eq!(delta, -5.0, epsilon = 1e-12);
        assert_relative_eq!(b.route_energy_at(16_260), -5.0, epsilon = 1e-12);
    }

    #[test]
    fn route_energy_is_signed_negative() {
        let mut b = bus();
        b.command_power(PowerCommand::on_route(-10.0, 3600.0), 16_260, false)
            .expect("within band");
        assert_relative_eq!(b.route_energy_at(16_260), -10.0, epsilon = 1e-12);
        assert_relative_eq!(b.soc(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn gap_fill_back_fills_skipped_ticks() {
        let mut b = bus();
        b.command_power(PowerCommand::at_charger(60.0, 60.0), 16_200, false)
            .expect("within band");
        b.command_power(PowerCommand::at_charger(60.0, 60.0), 16_500, false)
            .expect("within band");

        for t in [16_260, 16_320, 16_380, 16_440] {
            assert_relative_eq!(b.soc_at(t), 0.51, epsilon = 1e-12);
            assert_eq!(b.charger_energy_at(t), 0.0);
        }
        assert_relative_eq!(b.soc_at(16_500), 0.52, epsilon = 1e-12);
    }

    #[test]
    fn query_forward_fills_and_is_repeatable() {
        let mut b = bus();
        b.command_power(PowerCommand::at_charger(60.0, 60.0), 16_260, false)
            .expect("within band");
        let first = b.soc_at(20_000);
        let second = b.soc_at(20_000);
        assert_eq!(first, second);
        assert_eq!(first, b.soc_at(16_260));
        // Before the horizon the earliest known value is returned.
        assert_eq!(b.soc_at(0), 0.5);
    }

    #[test]
    fn power_to_reach_hits_target_exactly() {
        let mut b = bus();
        b.init_soc(0.895);
        let p = b.power_to_reach(b.max_soc(), 60.0);
        b.force_power(PowerCommand::at_charger(p, 60.0), 16_260);
        assert_relative_eq!(b.soc(), 0.9, epsilon = 1e-12);
    }
}
