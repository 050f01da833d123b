//! Scenario-level driver: inputs, request profile, and a full horizon run.

use tracing::info;

use crate::config::ScenarioConfig;
use crate::error::Result;
use crate::io::records::{InputRecords, load_inputs};
use crate::request::build_profile;
use crate::scenario::generate;
use crate::sim::engine::Engine;

/// Loads the CSV inputs named by `[data]`, or generates the synthetic fleet.
///
/// # Errors
///
/// Returns a `SimError` if a CSV file cannot be read or parsed.
pub fn scenario_inputs(scenario: &ScenarioConfig) -> Result<InputRecords> {
    let config = scenario.to_sim_config();
    match scenario.data.paths() {
        Some((chargers, buses, schedule)) => load_inputs(chargers, buses, schedule),
        None => Ok(generate(&scenario.synthetic, &config)),
    }
}

/// Builds an engine ready to run the scenario's horizon.
///
/// The scenario must already have passed [`ScenarioConfig::validate`].
///
/// # Errors
///
/// Returns a `SimError` for unreadable inputs or records that do not form a
/// consistent fleet and schedule.
pub fn build_engine(scenario: &ScenarioConfig) -> Result<Engine> {
    let inputs = scenario_inputs(scenario)?;
    Engine::from_records(
        scenario.to_sim_config(),
        &inputs.chargers,
        &inputs.buses,
        &inputs.schedule,
    )
}

/// Builds the engine and runs every tick of the horizon.
///
/// # Errors
///
/// Returns a `SimError` if the engine or the request profile cannot be built.
pub fn run_scenario(scenario: &ScenarioConfig) -> Result<Engine> {
    let mut engine = build_engine(scenario)?;
    let mut profile = build_profile(&scenario.request, engine.config())?;
    let mode = scenario.charge_mode();

    info!(
        ticks = engine.config().total_ticks(),
        buses = engine.fleet().num_buses(),
        request = %scenario.request.model,
        mode = ?mode,
        "Starting simulation"
    );
    engine.run_horizon(profile.as_mut(), mode);
    Ok(engine)
}
