//! Integration tests running whole scenarios through the runner.

use std::fs;
use std::path::Path;

use bus_charge_sim::config::ScenarioConfig;
use bus_charge_sim::io::export::export_tables;
use bus_charge_sim::runner::run_scenario;
use bus_charge_sim::sim::engine::Engine;

fn quarter_hour(mut scenario: ScenarioConfig) -> ScenarioConfig {
    scenario.simulation.tick_secs = 900;
    scenario
}

fn export(engine: &Engine, dir: &Path) -> Vec<Vec<u8>> {
    export_tables(dir, engine)
        .expect("export succeeds")
        .iter()
        .map(|p| fs::read(p).expect("readable table"))
        .collect()
}

#[test]
fn identical_runs_export_identical_tables() {
    let scenario = ScenarioConfig::v2g();
    let a = run_scenario(&scenario).expect("first run");
    let b = run_scenario(&scenario).expect("second run");

    let dir = tempfile::tempdir().expect("temp dir");
    let first = export(&a, &dir.path().join("a"));
    let second = export(&b, &dir.path().join("b"));
    assert_eq!(first.len(), 5);
    assert_eq!(first, second);
    assert_eq!(a.kpi(), b.kpi());
}

#[test]
fn different_seeds_diverge() {
    let mut scenario = quarter_hour(ScenarioConfig::baseline());
    let a = run_scenario(&scenario).expect("run");
    scenario.simulation.seed += 1;
    let b = run_scenario(&scenario).expect("run");
    assert_ne!(a.kpi(), b.kpi());
}

#[test]
fn soc_stays_physical_in_every_preset() {
    for name in ScenarioConfig::PRESETS {
        let scenario = ScenarioConfig::from_preset(name).expect("preset");
        let engine = run_scenario(&scenario).expect("runs");
        let config = engine.config();
        for bus in engine.fleet().buses() {
            for t in config.horizon() {
                let soc = bus.soc_at(t);
                assert!((0.0..=1.0).contains(&soc), "{name}: bus {} soc {soc} at {t}", bus.id());
            }
        }
    }
}

#[test]
fn fill_mode_charges_more_than_tracking_a_small_request() {
    let mut tracking = quarter_hour(ScenarioConfig::congested());
    tracking.request.model = "flat".to_string();
    tracking.request.flat_kw = 50.0;
    let mut fill = tracking.clone();
    fill.charging.opportunistic = false;

    let tracked = run_scenario(&tracking).expect("run").kpi();
    let filled = run_scenario(&fill).expect("run").kpi();
    assert!(filled.charger_energy_kwh > tracked.charger_energy_kwh);
}

#[test]
fn csv_depot_scenario_runs() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/depot_csv.toml");
    let scenario = ScenarioConfig::from_toml_file(&path).expect("scenario loads");
    assert!(scenario.validate().is_empty());

    let engine = run_scenario(&scenario).expect("runs");
    assert_eq!(engine.fleet().num_buses(), 5);
    assert_eq!(engine.fleet().plug_columns().len(), 3);

    let kpi = engine.kpi();
    assert_eq!(kpi.ticks, 1440);
    assert!(kpi.charger_energy_kwh > 0.0);
    assert!(kpi.route_energy_kwh > 0.0);
    assert!(kpi.peak_plug_utilization <= 1.0);
}

#[test]
fn scenario_files_match_presets() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    for name in ["baseline", "congested", "v2g"] {
        let from_file = ScenarioConfig::from_toml_file(&dir.join(format!("{name}.toml")))
            .expect("scenario loads");
        let preset = ScenarioConfig::from_preset(name).expect("preset");
        assert!(from_file.validate().is_empty(), "{name}");
        assert_eq!(from_file.charge_mode(), preset.charge_mode(), "{name}");
        assert_eq!(from_file.synthetic.buses, preset.synthetic.buses, "{name}");
    }
}
