//! Post-hoc KPI computation from simulation results.

use std::fmt;

use serde::Serialize;

use super::telemetry::TickReport;

/// Aggregate key performance indicators derived from a complete simulation run.
///
/// Computed post-hoc from `Vec<TickReport>` to ensure consistency between
/// tick data and reported metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    /// Ticks simulated.
    pub ticks: usize,
    /// Root-mean-square request tracking error (kW).
    pub rmse_tracking_kw: f64,
    /// Mean absolute request tracking error (kW).
    pub mae_tracking_kw: f64,
    /// Net energy exchanged at chargers (kWh).
    pub charger_energy_kwh: f64,
    /// Energy drawn on routes (kWh, positive magnitude).
    pub route_energy_kwh: f64,
    /// Highest power committed in a single tick (kW).
    pub peak_consumed_kw: f64,
    /// Necessity commands over the run.
    pub necessity_commands: usize,
    /// Departures without enough energy for the trip.
    pub route_shortfalls: usize,
    /// Largest fraction of all plugs in use during one tick.
    pub peak_plug_utilization: f64,
}

impl KpiReport {
    /// Computes all KPIs from the complete tick report vector.
    ///
    /// # Arguments
    ///
    /// * `reports` - Every tick of the run
    /// * `dt_hours` - Tick duration in hours
    /// * `total_plugs` - Plugs across every charger, for utilization
    pub fn from_reports(reports: &[TickReport], dt_hours: f64, total_plugs: u32) -> Self {
        if reports.is_empty() {
            return Self {
                ticks: 0,
                rmse_tracking_kw: 0.0,
                mae_tracking_kw: 0.0,
                charger_energy_kwh: 0.0,
                route_energy_kwh: 0.0,
                peak_consumed_kw: 0.0,
                necessity_commands: 0,
                route_shortfalls: 0,
                peak_plug_utilization: 0.0,
            };
        }

        let n = reports.len() as f64;
        let mut sq_sum = 0.0;
        let mut abs_sum = 0.0;
        let mut charger_energy = 0.0;
        let mut route_energy = 0.0;
        let mut peak_consumed = 0.0_f64;
        let mut necessity = 0;
        let mut shortfalls = 0;
        let mut peak_plugs = 0;

        for r in reports {
            let err = r.tracking_error_kw;
            sq_sum += err * err;
            abs_sum += err.abs();

            charger_energy += r.power_consumed_kw * dt_hours;
            route_energy -= r.route_energy_kwh;
            peak_consumed = peak_consumed.max(r.power_consumed_kw);

            necessity += r.necessity_commands;
            shortfalls += r.shortfalls.len();
            peak_plugs = peak_plugs.max(r.plugs_in_use());
        }

        let peak_plug_utilization = if total_plugs > 0 {
            f64::from(peak_plugs) / f64::from(total_plugs)
        } else {
            0.0
        };

        Self {
            ticks: reports.len(),
            rmse_tracking_kw: (sq_sum / n).sqrt(),
            mae_tracking_kw: abs_sum / n,
            charger_energy_kwh: charger_energy,
            route_energy_kwh: route_energy,
            peak_consumed_kw: peak_consumed,
            necessity_commands: necessity,
            route_shortfalls: shortfalls,
            peak_plug_utilization,
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Ticks simulated:       {}", self.ticks)?;
        writeln!(f, "RMSE tracking error:   {:.3} kW", self.rmse_tracking_kw)?;
        writeln!(f, "MAE tracking error:    {:.3} kW", self.mae_tracking_kw)?;
        writeln!(f, "Charger energy:        {:.2} kWh", self.charger_energy_kwh)?;
        writeln!(f, "Route energy:          {:.2} kWh", self.route_energy_kwh)?;
        writeln!(f, "Peak consumed power:   {:.2} kW", self.peak_consumed_kw)?;
        writeln!(f, "Necessity commands:    {}", self.necessity_commands)?;
        writeln!(f, "Route shortfalls:      {}", self.route_shortfalls)?;
        write!(
            f,
            "Peak plug utilization: {:.1}%",
            100.0 * self.peak_plug_utilization
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_report(request_kw: f64, consumed_kw: f64, plugs: Vec<u32>) -> TickReport {
        TickReport {
            index: 0,
            time: 16_200,
            power_request_kw: request_kw,
            power_consumed_kw: consumed_kw,
            tracking_error_kw: consumed_kw - request_kw,
            necessity_commands: 0,
            budget_commands: 0,
            remaining_commands: 0,
            departures: 0,
            route_energy_kwh: 0.0,
            plug_usage: plugs,
            shortfalls: Vec::new(),
        }
    }

    #[test]
    fn rmse_computation() {
        // errors: [1.0, -1.0, 2.0, -2.0]
        // sq_sum = 1 + 1 + 4 + 4 = 10, mean = 2.5
        let reports: Vec<TickReport> = [1.0, -1.0, 2.0, -2.0]
            .iter()
            .map(|&e| make_report(10.0, 10.0 + e, vec![]))
            .collect();
        let kpi = KpiReport::from_reports(&reports, 1.0 / 60.0, 4);
        assert_relative_eq!(kpi.rmse_tracking_kw, 2.5_f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(kpi.mae_tracking_kw, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn energy_and_peaks() {
        let mut reports = vec![
            make_report(0.0, 60.0, vec![1, 0]),
            make_report(0.0, 120.0, vec![2, 1]),
            make_report(0.0, -30.0, vec![1, 0]),
        ];
        reports[1].route_energy_kwh = -12.5;
        reports[2].necessity_commands = 2;

        let kpi = KpiReport::from_reports(&reports, 1.0 / 60.0, 4);
        // (60 + 120 - 30) kW for one minute each
        assert_relative_eq!(kpi.charger_energy_kwh, 2.5, epsilon = 1e-9);
        assert_relative_eq!(kpi.route_energy_kwh, 12.5, epsilon = 1e-9);
        assert_eq!(kpi.peak_consumed_kw, 120.0);
        assert_eq!(kpi.necessity_commands, 2);
        assert_relative_eq!(kpi.peak_plug_utilization, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn empty_reports() {
        let kpi = KpiReport::from_reports(&[], 1.0 / 60.0, 4);
        assert_eq!(kpi.ticks, 0);
        assert_eq!(kpi.rmse_tracking_kw, 0.0);
        assert_eq!(kpi.route_shortfalls, 0);
    }

    #[test]
    fn serializes_to_json() {
        let kpi = KpiReport::from_reports(&[make_report(5.0, 5.0, vec![0])], 1.0 / 60.0, 1);
        let json = serde_json::to_value(&kpi).expect("serializable");
        assert_eq!(json["ticks"], 1);
        assert_eq!(json["route_shortfalls"], 0);
    }
}
