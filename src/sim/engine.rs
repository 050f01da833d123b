//! Simulation engine that sequences one tick of fleet charging.

use tracing::{debug, info};

use crate::error::Result;
use crate::fleet::Fleet;
use crate::io::records::{BusRecord, ChargerRecord, ScheduleRecord};
use crate::request::RequestProfile;

use super::allocator::{allocate_budget, allocate_necessary, allocate_remaining};
use super::clock::Clock;
use super::kpi::KpiReport;
use super::priority::charger_priorities;
use super::routes::handle_departures;
use super::schedule::{ScheduleIndex, TripEnergyTable, build_schedule};
use super::telemetry::TickReport;
use super::tick::TickContext;
use super::types::{ChargeFlag, ChargeMode, SimConfig};

/// Simulation engine owning the fleet, the static schedule, and the
/// archive of tick reports.
///
/// Every tick runs the same sequence: priorities per charger, necessity
/// allocation, budget (or fill-to-capacity) allocation, then departures.
/// Per-tick scratch state lives in a [`TickContext`] that is dropped once
/// the tick's report is archived.
#[derive(Debug, Clone)]
pub struct Engine {
    config: SimConfig,
    fleet: Fleet,
    schedule: ScheduleIndex,
    trips: TripEnergyTable,
    reports: Vec<TickReport>,
}

impl Engine {
    pub fn new(
        config: SimConfig,
        fleet: Fleet,
        schedule: ScheduleIndex,
        trips: TripEnergyTable,
    ) -> Self {
        Self {
            config,
            fleet,
            schedule,
            trips,
            reports: Vec::new(),
        }
    }

    /// Builds the fleet and schedule from loader records.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` for invalid bus records, schedule records naming
    /// unknown entities, or windows off the tick grid.
    pub fn from_records(
        config: SimConfig,
        chargers: &[ChargerRecord],
        buses: &[BusRecord],
        schedule: &[ScheduleRecord],
    ) -> Result<Self> {
        let fleet = Fleet::from_records(chargers, buses, &config)?;
        let (schedule, trips) = build_schedule(&fleet, schedule, &config)?;
        Ok(Self::new(config, fleet, schedule, trips))
    }

    /// Runs one tick at `sim_time` and returns the power committed at chargers (kW).
    ///
    /// With [`ChargeFlag::Opportunistic`] in `mode` optional charging tracks
    /// `power_request_kw`; without it every free plug charges at full rate.
    pub fn run(&mut self, power_request_kw: f64, mode: ChargeMode, sim_time: i64) -> f64 {
        let mut ctx = TickContext::new(sim_time, power_request_kw);

        let chargers: Vec<_> = self.fleet.charger_ids().collect();
        for charger in chargers {
            let priorities = charger_priorities(
                &self.fleet,
                &self.schedule,
                &self.trips,
                charger,
                sim_time,
                &self.config,
            );
            if !priorities.is_empty() {
                ctx.priorities.insert(charger, priorities);
            }
        }

        allocate_necessary(&mut self.fleet, &mut ctx, &self.config);
        if mode.contains(ChargeFlag::Opportunistic) {
            allocate_budget(&mut self.fleet, &mut ctx, mode, &self.config);
        } else {
            allocate_remaining(&mut self.fleet, &mut ctx, &self.config);
        }
        handle_departures(
            &mut self.fleet,
            &self.schedule,
            &self.trips,
            &mut ctx,
            &self.config,
        );

        let consumed = ctx.power_consumed_kw;
        let report = TickReport::from_context(self.reports.len(), ctx, &self.fleet);
        debug!("{report}");

        let elapsed = sim_time - self.config.start_time;
        if elapsed % 3600 == 0 {
            info!(
                hour = elapsed / 3600,
                request_kw = power_request_kw,
                consumed_kw = consumed,
                plugs_in_use = report.plugs_in_use(),
                "Simulated hour"
            );
        }

        self.reports.push(report);
        consumed
    }

    /// Runs every tick of the horizon against `profile`.
    pub fn run_horizon(&mut self, profile: &mut dyn RequestProfile, mode: ChargeMode) {
        let mut clock = Clock::new(&self.config);
        clock.run(|index, time| {
            let request = profile.request_kw(index);
            self.run(request, mode, time);
        });
        info!(
            ticks = self.reports.len(),
            shortfalls = self.reports.iter().map(|r| r.shortfalls.len()).sum::<usize>(),
            "Horizon complete"
        );
    }

    /// KPIs over every tick run so far.
    pub fn kpi(&self) -> KpiReport {
        let total_plugs = self.fleet.chargers().map(|c| c.total_plugs()).sum();
        KpiReport::from_reports(&self.reports, self.config.dt_hours(), total_plugs)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn schedule(&self) -> &ScheduleIndex {
        &self.schedule
    }

    pub fn reports(&self) -> &[TickReport] {
        &self.reports
    }
}
