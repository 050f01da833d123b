//! Command-line arguments of the `bus-charge-sim` binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{ConfigError, ScenarioConfig};

/// Log line encoding on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Minute-resolution electric bus fleet charging simulator.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Load the scenario from a TOML file.
    #[arg(long, value_name = "FILE", conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, congested, v2g).
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Override the scenario's random seed.
    #[arg(long, env = "BUS_SIM_SEED")]
    pub seed: Option<u64>,

    /// Override the number of simulated days.
    #[arg(long)]
    pub days: Option<usize>,

    /// Write every output table into this directory.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write the per-tick report table to this CSV file.
    #[arg(long, value_name = "FILE")]
    pub telemetry_out: Option<PathBuf>,

    /// Write the KPI report as JSON to this file.
    #[arg(long, value_name = "FILE")]
    pub summary_json: Option<PathBuf>,

    /// Print one line per tick to stdout before the KPI report.
    #[arg(long)]
    pub print_ticks: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Resolves the scenario source and applies command-line overrides.
    ///
    /// Without `--scenario` or `--preset` the baseline preset is used.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be loaded or the preset is unknown.
    pub fn scenario_config(&self) -> Result<ScenarioConfig, ConfigError> {
        let mut scenario = match (&self.scenario, &self.preset) {
            (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
            (None, Some(name)) => ScenarioConfig::from_preset(name)?,
            (None, None) => ScenarioConfig::baseline(),
        };
        if let Some(seed) = self.seed {
            scenario.simulation.seed = seed;
        }
        if let Some(days) = self.days {
            scenario.simulation.days = days;
        }
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_baseline() {
        let cli = Cli::try_parse_from(["bus-charge-sim"]).expect("parses");
        let scenario = cli.scenario_config().expect("baseline");
        assert_eq!(scenario.synthetic.buses, 12);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(!cli.print_ticks);
    }

    #[test]
    fn overrides_apply_to_preset() {
        let cli = Cli::try_parse_from([
            "bus-charge-sim",
            "--preset",
            "congested",
            "--seed",
            "9",
            "--days",
            "3",
            "--log-format",
            "json",
        ])
        .expect("parses");
        let scenario = cli.scenario_config().expect("preset");
        assert_eq!(scenario.simulation.seed, 9);
        assert_eq!(scenario.simulation.days, 3);
        assert_eq!(scenario.synthetic.chargers, 1);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn scenario_and_preset_conflict() {
        let parsed =
            Cli::try_parse_from(["bus-charge-sim", "--scenario", "a.toml", "--preset", "v2g"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_preset_is_a_config_error() {
        let cli = Cli::try_parse_from(["bus-charge-sim", "--preset", "rush"]).expect("parses");
        let err = cli.scenario_config().expect_err("unknown preset");
        assert_eq!(err.field, "preset");
    }
}
