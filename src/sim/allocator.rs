//! Plug and power assignment for one tick.
//!
//! Three passes share the tick's plug usage and commanded-bus set:
//! [`allocate_necessary`] charges buses that cannot skip this tick,
//! [`allocate_budget`] tracks the external power request with the rest, and
//! [`allocate_remaining`] replaces the budget pass when the request is
//! ignored and every free plug charges at full rate.

use tracing::debug;

use crate::fleet::{Bus, BusId, ChargerId, Fleet, PowerCommand, SocError};
use crate::sim::tick::{PlugUsage, Priority, TickContext};
use crate::sim::types::{CONVERGENCE_EPSILON_KW, ChargeFlag, ChargeMode, SimConfig};

/// Charges every necessary bus at its rated power, charger by charger in
/// priority order, while plugs of its type remain.
///
/// Commands that would cross the SOC ceiling are clamped to land on it;
/// commands that leave a bus under the floor are forced through.
pub fn allocate_necessary(fleet: &mut Fleet, ctx: &mut TickContext, config: &SimConfig) {
    let dt = config.tick_duration();
    let necessary: Vec<(ChargerId, BusId)> = ctx
        .priorities
        .iter()
        .flat_map(|(&charger, ps)| {
            ps.iter()
                .filter(|p| p.necessary)
                .map(move |p| (charger, p.bus))
        })
        .collect();

    for (charger, bus_id) in necessary {
        if ctx.is_commanded(bus_id) || !claim_plug(fleet, &mut ctx.plug_usage, charger, bus_id) {
            continue;
        }
        let Some(bus) = fleet.bus_mut(bus_id) else {
            continue;
        };
        let rate = bus.charge_rate_kw;
        let committed = commit_clamped(bus, rate, ctx.time, dt);

        ctx.mark_commanded(bus_id);
        ctx.power_consumed_kw += committed;
        ctx.necessity_commands += 1;
    }
}

/// Matches optional buses against the power still requested this tick.
///
/// Candidates are ranked across the whole fleet. A positive target goes to
/// the most urgent bus with a positive score and a free plug; a negative
/// target, when [`ChargeFlag::Bidirectional`] is set, is drawn from the
/// least urgent bus with a negative score, never beyond its energy surplus.
/// Each candidate gets one attempt and the loop stops once the target is
/// within [`CONVERGENCE_EPSILON_KW`] or no candidate fits.
pub fn allocate_budget(
    fleet: &mut Fleet,
    ctx: &mut TickContext,
    mode: ChargeMode,
    config: &SimConfig,
) {
    let dt = config.tick_duration();
    let bidirectional = mode.contains(ChargeFlag::Bidirectional);
    let mut candidates = optional_candidates(ctx);
    let mut target = ctx.remaining_target_kw();

    while target.abs() >= CONVERGENCE_EPSILON_KW && !candidates.is_empty() {
        let usage = &ctx.plug_usage;
        let pick = if target > 0.0 {
            candidates
                .iter()
                .position(|(c, p)| p.score > 0.0 && plug_free(fleet, usage, *c, p.bus))
        } else if bidirectional {
            candidates
                .iter()
                .rposition(|(c, p)| p.score < 0.0 && plug_free(fleet, usage, *c, p.bus))
        } else {
            None
        };
        let Some(index) = pick else {
            break;
        };

        let (charger, priority) = candidates.remove(index);
        if ctx.is_commanded(priority.bus)
            || !claim_plug(fleet, &mut ctx.plug_usage, charger, priority.bus)
        {
            continue;
        }
        let Some(bus) = fleet.bus_mut(priority.bus) else {
            continue;
        };

        let rate = bus.charge_rate_kw;
        let power = if target > 0.0 {
            rate.min(target)
        } else {
            let surplus_kw = -priority.energy_deficit_kwh * 3600.0 / dt;
            (-rate).max(target).max(-surplus_kw)
        };
        let committed = commit_clamped(bus, power, ctx.time, dt);

        ctx.mark_commanded(priority.bus);
        ctx.power_consumed_kw += committed;
        ctx.budget_commands += 1;
        target -= committed;
    }
}

/// Fills every free plug with optional buses at rated power, most urgent
/// first, skipping buses already at the SOC ceiling.
///
/// Buses with surplus energy (non-positive score) charge too; the pass
/// fills plugs, it does not rank need.
pub fn allocate_remaining(fleet: &mut Fleet, ctx: &mut TickContext, config: &SimConfig) {
    let dt = config.tick_duration();

    for (charger, priority) in optional_candidates(ctx) {
        let full = fleet
            .bus(priority.bus)
            .is_none_or(|b| b.soc() >= b.max_soc());
        if full
            || ctx.is_commanded(priority.bus)
            || !claim_plug(fleet, &mut ctx.plug_usage, charger, priority.bus)
        {
            continue;
        }
        let Some(bus) = fleet.bus_mut(priority.bus) else {
            continue;
        };
        let rate = bus.charge_rate_kw;
        let committed = commit_clamped(bus, rate, ctx.time, dt);

        ctx.mark_commanded(priority.bus);
        ctx.power_consumed_kw += committed;
        ctx.remaining_commands += 1;
    }
}

/// Non-necessary priorities of buses not yet commanded, ranked fleet-wide.
fn optional_candidates(ctx: &TickContext) -> Vec<(ChargerId, Priority)> {
    let mut candidates: Vec<(ChargerId, Priority)> = ctx
        .priorities
        .iter()
        .flat_map(|(&charger, ps)| {
            ps.iter()
                .filter(|p| !p.necessary && !ctx.is_commanded(p.bus))
                .map(move |p| (charger, p.clone()))
        })
        .collect();
    // Stable, so equal scores keep charger order then schedule order.
    candidates.sort_by(|(_, a), (_, b)| b.score.total_cmp(&a.score));
    candidates
}

fn plug_free(fleet: &Fleet, usage: &PlugUsage, charger: ChargerId, bus: BusId) -> bool {
    match (fleet.charger(charger), fleet.bus(bus)) {
        (Some(c), Some(b)) => usage.has_free(c, b.plug_type()),
        _ => false,
    }
}

fn claim_plug(fleet: &Fleet, usage: &mut PlugUsage, charger: ChargerId, bus: BusId) -> bool {
    match (fleet.charger(charger), fleet.bus(bus)) {
        (Some(c), Some(b)) => usage.try_claim(c, b.plug_type()),
        _ => false,
    }
}

/// Commits `power_kw` at a plug for one tick and returns the power actually
/// delivered.
///
/// A charge past the ceiling is clamped to reach it and a discharge past
/// the floor is clamped to stop at it. A charge that still leaves the bus
/// under the floor, or a discharge that still leaves it over the ceiling,
/// moves the bus towards the band and is forced as issued.
fn commit_clamped(bus: &mut Bus, power_kw: f64, time: i64, dt: f64) -> f64 {
    let command = PowerCommand::at_charger(power_kw, dt);
    match bus.command_power(command, time, false) {
        Ok(()) => power_kw,
        Err(SocError::OverMaxSoc { .. }) if power_kw > 0.0 => {
            let clamped = bus.power_to_reach(bus.max_soc(), dt);
            debug!(
                bus = %bus.id(),
                requested_kw = power_kw,
                clamped_kw = clamped,
                "Charge clamped to SOC ceiling"
            );
            if clamped > 0.0 {
                force(bus, clamped, time, dt)
            } else {
                0.0
            }
        }
        Err(SocError::UnderMinSoc { .. }) if power_kw < 0.0 => {
            let clamped = bus.power_to_reach(bus.min_soc(), dt);
            debug!(
                bus = %bus.id(),
                requested_kw = power_kw,
                clamped_kw = clamped,
                "Discharge clamped to SOC floor"
            );
            if clamped < 0.0 {
                force(bus, clamped, time, dt)
            } else {
                0.0
            }
        }
        Err(err) => {
            debug!(bus = %bus.id(), %err, "Charger command forced outside SOC band");
            force(bus, power_kw, time, dt)
        }
    }
}

fn force(bus: &mut Bus, power_kw: f64, time: i64, dt: f64) -> f64 {
    bus.force_power(PowerCommand::at_charger(power_kw, dt), time) * 3600.0 / dt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{Charger, PlugType};
    use approx::assert_relative_eq;

    const T0: i64 = 16_200;

    fn cfg() -> SimConfig {
        SimConfig::new(1, 0)
    }

    fn fleet(buses: &[(u32, f64)], plugs: u32) -> Fleet {
        let config = cfg();
        let mut fleet = Fleet::new();
        let mut c = Charger::new(ChargerId(1), "Depot");
        c.add_plugs(plugs, PlugType::from("A"));
        fleet.add_charger(c);
        for &(id, rate) in buses {
            fleet.add_bus(Bus::new(BusId(id), 100.0, 1.0, rate, 0.0, PlugType::from("A"), &config));
        }
        fleet
    }

    fn priority(bus: u32, score: f64, necessary: bool, deficit: f64) -> Priority {
        Priority {
            bus: BusId(bus),
            score,
            necessary,
            departure: T0 + 3600,
            energy_deficit_kwh: deficit,
        }
    }

    fn ctx(request_kw: f64, priorities: Vec<Priority>) -> TickContext {
        let mut ctx = TickContext::new(T0, request_kw);
        ctx.priorities.insert(ChargerId(1), priorities);
        ctx
    }

    fn soc(fleet: &Fleet, id: u32) -> f64 {
        fleet.bus(BusId(id)).map_or(f64::NAN, Bus::soc)
    }

    #[test]
    fn necessity_respects_plug_count() {
        let mut f = fleet(&[(1, 60.0), (2, 60.0), (3, 60.0)], 2);
        let mut c = ctx(
            0.0,
            vec![
                priority(3, 2.0, true, 50.0),
                priority(1, 1.5, true, 40.0),
                priority(2, 1.2, true, 30.0),
            ],
        );
        allocate_necessary(&mut f, &mut c, &cfg());

        assert_eq!(c.necessity_commands, 2);
        assert_relative_eq!(c.power_consumed_kw, 120.0, epsilon = 1e-9);
        assert_relative_eq!(soc(&f, 3), 0.51, epsilon = 1e-12);
        assert_relative_eq!(soc(&f, 1), 0.51, epsilon = 1e-12);
        assert_eq!(soc(&f, 2), 0.5);
        assert_eq!(c.plug_usage.in_use(ChargerId(1), &PlugType::from("A")), 2);
    }

    #[test]
    fn necessity_forces_charge_below_floor() {
        let mut f = fleet(&[(1, 60.0)], 1);
        if let Some(b) = f.bus_mut(BusId(1)) {
            b.init_soc(0.05);
        }
        let mut c = ctx(0.0, vec![priority(1, 3.0, true, 60.0)]);
        allocate_necessary(&mut f, &mut c, &cfg());

        assert_relative_eq!(soc(&f, 1), 0.06, epsilon = 1e-12);
        assert_relative_eq!(c.power_consumed_kw, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn necessity_clamps_at_ceiling() {
        let mut f = fleet(&[(1, 60.0)], 1);
        if let Some(b) = f.bus_mut(BusId(1)) {
            b.init_soc(0.895);
        }
        let mut c = ctx(0.0, vec![priority(1, 3.0, true, 100.0)]);
        allocate_necessary(&mut f, &mut c, &cfg());

        assert_relative_eq!(soc(&f, 1), 0.9, epsilon = 1e-12);
        // 0.005 * 100 kWh over one minute
        assert_relative_eq!(c.power_consumed_kw, 30.0, epsilon = 1e-6);
        assert_eq!(c.necessity_commands, 1);
    }

    #[test]
    fn plug_type_mismatch_skips_bus() {
        let config = cfg();
        let mut f = fleet(&[], 2);
        f.add_bus(Bus::new(BusId(9), 100.0, 1.0, 60.0, 0.0, PlugType::from("B"), &config));
        let mut c = ctx(100.0, vec![priority(9, 3.0, true, 60.0)]);
        allocate_necessary(&mut f, &mut c, &config);
        assert_eq!(c.necessity_commands, 0);
        assert_eq!(soc(&f, 9), 0.5);
    }

    #[test]
    fn budget_charges_highest_priority_up_to_target() {
        let mut f = fleet(&[(1, 50.0), (2, 50.0)], 2);
        let mut c = ctx(
            50.0,
            vec![priority(1, 0.4, false, 60.0), priority(2, 0.4, false, 60.0)],
        );
        allocate_budget(&mut f, &mut c, ChargeFlag::Opportunistic.into(), &cfg());

        assert_eq!(c.budget_commands, 1);
        assert_relative_eq!(c.power_consumed_kw, 50.0, epsilon = 1e-9);
        assert_relative_eq!(soc(&f, 1), 0.5 + 50.0 / 60.0 / 100.0, epsilon = 1e-12);
        assert_eq!(soc(&f, 2), 0.5);
    }

    #[test]
    fn budget_splits_target_across_buses() {
        let mut f = fleet(&[(1, 50.0), (2, 50.0)], 2);
        let mut c = ctx(
            80.0,
            vec![priority(2, 0.6, false, 60.0), priority(1, 0.4, false, 60.0)],
        );
        allocate_budget(&mut f, &mut c, ChargeFlag::Opportunistic.into(), &cfg());

        assert_eq!(c.budget_commands, 2);
        assert_relative_eq!(c.power_consumed_kw, 80.0, epsilon = 1e-9);
        assert_relative_eq!(soc(&f, 2), 0.5 + 50.0 / 60.0 / 100.0, epsilon = 1e-12);
        assert_relative_eq!(soc(&f, 1), 0.5 + 30.0 / 60.0 / 100.0, epsilon = 1e-12);
    }

    #[test]
    fn budget_counts_power_already_consumed() {
        let mut f = fleet(&[(1, 50.0)], 1);
        let mut c = ctx(50.0, vec![priority(1, 0.4, false, 60.0)]);
        c.power_consumed_kw = 50.0;
        allocate_budget(&mut f, &mut c, ChargeFlag::Opportunistic.into(), &cfg());
        assert_eq!(c.budget_commands, 0);
        assert_eq!(soc(&f, 1), 0.5);
    }

    #[test]
    fn budget_skips_non_positive_scores_when_charging() {
        let mut f = fleet(&[(1, 50.0)], 1);
        let mut c = ctx(50.0, vec![priority(1, -0.2, false, -10.0)]);
        allocate_budget(&mut f, &mut c, ChargeFlag::Opportunistic.into(), &cfg());
        assert_eq!(c.budget_commands, 0);
    }

    #[test]
    fn budget_clamp_at_ceiling_passes_remainder_on() {
        let mut f = fleet(&[(1, 50.0), (2, 50.0)], 2);
        if let Some(b) = f.bus_mut(BusId(1)) {
            b.init_soc(0.8999);
        }
        let mut c = ctx(
            80.0,
            vec![priority(1, 0.6, false, 60.0), priority(2, 0.4, false, 60.0)],
        );
        allocate_budget(&mut f, &mut c, ChargeFlag::Opportunistic.into(), &cfg());

        // 0.0001 * 100 kWh over one minute is 0.6 kW.
        assert_eq!(c.budget_commands, 2);
        assert_relative_eq!(soc(&f, 1), 0.9, epsilon = 1e-12);
        assert_relative_eq!(soc(&f, 2), 0.5 + 50.0 / 60.0 / 100.0, epsilon = 1e-12);
        assert_relative_eq!(c.power_consumed_kw, 50.6, epsilon = 1e-6);
    }

    #[test]
    fn discharge_clamp_at_floor_passes_remainder_on() {
        let mut f = fleet(&[(1, 60.0), (2, 60.0)], 2);
        if let Some(b) = f.bus_mut(BusId(1)) {
            b.init_soc(0.1005);
        }
        let mut c = ctx(
            -80.0,
            vec![priority(2, -0.1, false, -5.0), priority(1, -0.5, false, -30.0)],
        );
        let mode = ChargeFlag::Opportunistic | ChargeFlag::Bidirectional;
        allocate_budget(&mut f, &mut c, mode, &cfg());

        // Bus 1 stops at the floor after 3 kW; bus 2 gives its full 60 kW.
        assert_eq!(c.budget_commands, 2);
        assert_relative_eq!(soc(&f, 1), 0.1, epsilon = 1e-12);
        assert_relative_eq!(soc(&f, 2), 0.49, epsilon = 1e-12);
        assert_relative_eq!(c.power_consumed_kw, -63.0, epsilon = 1e-6);
    }

    #[test]
    fn discharge_requires_bidirectional_flag() {
        let mut f = fleet(&[(1, 60.0)], 1);
        let mut c = ctx(-30.0, vec![priority(1, -0.5, false, -30.0)]);
        allocate_budget(&mut f, &mut c, ChargeFlag::Opportunistic.into(), &cfg());
        assert_eq!(c.budget_commands, 0);
        assert_eq!(soc(&f, 1), 0.5);
    }

    #[test]
    fn discharge_takes_lowest_priority_bus() {
        let mut f = fleet(&[(1, 60.0), (2, 60.0)], 2);
        let mut c = ctx(
            -30.0,
            vec![priority(1, -0.1, false, -5.0), priority(2, -0.5, false, -30.0)],
        );
        let mode = ChargeFlag::Opportunistic | ChargeFlag::Bidirectional;
        allocate_budget(&mut f, &mut c, mode, &cfg());

        assert_eq!(c.budget_commands, 1);
        assert_relative_eq!(c.power_consumed_kw, -30.0, epsilon = 1e-9);
        assert_relative_eq!(soc(&f, 2), 0.495, epsilon = 1e-12);
        assert_eq!(soc(&f, 1), 0.5);
    }

    #[test]
    fn discharge_is_limited_by_energy_surplus() {
        let mut f = fleet(&[(1, 60.0)], 1);
        // 0.25 kWh surplus over one minute is 15 kW.
        let mut c = ctx(-60.0, vec![priority(1, -0.01, false, -0.25)]);
        let mode = ChargeFlag::Opportunistic | ChargeFlag::Bidirectional;
        allocate_budget(&mut f, &mut c, mode, &cfg());

        assert_relative_eq!(c.power_consumed_kw, -15.0, epsilon = 1e-9);
    }

    #[test]
    fn remaining_fills_every_free_plug() {
        let mut f = fleet(&[(1, 60.0), (2, 60.0), (3, 60.0)], 2);
        if let Some(b) = f.bus_mut(BusId(1)) {
            b.init_soc(0.9);
        }
        let mut c = ctx(
            0.0,
            vec![
                priority(1, 0.9, false, 10.0),
                priority(2, 0.5, false, 10.0),
                priority(3, -0.5, false, -10.0),
            ],
        );
        allocate_remaining(&mut f, &mut c, &cfg());

        assert_eq!(c.remaining_commands, 2);
        assert_eq!(soc(&f, 1), 0.9);
        assert_relative_eq!(soc(&f, 2), 0.51, epsilon = 1e-12);
        assert_relative_eq!(soc(&f, 3), 0.51, epsilon = 1e-12);
        assert_relative_eq!(c.power_consumed_kw, 120.0, epsilon = 1e-9);
    }

    #[test]
    fn bus_is_commanded_once_per_tick() {
        let mut f = fleet(&[(1, 60.0)], 2);
        let mut c = ctx(100.0, vec![priority(1, 2.0, true, 60.0)]);
        allocate_necessary(&mut f, &mut c, &cfg());
        allocate_budget(&mut f, &mut c, ChargeFlag::Opportunistic.into(), &cfg());
        assert_eq!(c.necessity_commands + c.budget_commands, 1);
        assert_relative_eq!(soc(&f, 1), 0.51, epsilon = 1e-12);
    }
}
