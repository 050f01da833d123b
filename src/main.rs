//! Bus charging simulator entry point: CLI wiring, logging, and exports.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bus_charge_sim::cli::{Cli, LogFormat};
use bus_charge_sim::error::{Result, SimError};
use bus_charge_sim::io::export::{export_tables, export_ticks};
use bus_charge_sim::runner::run_scenario;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let scenario = cli.scenario_config()?;

    let errors = scenario.validate();
    if let Some((first, rest)) = errors.split_first() {
        for e in rest {
            eprintln!("{e}");
        }
        return Err(first.clone().into());
    }

    let engine = run_scenario(&scenario)?;

    if cli.print_ticks {
        for report in engine.reports() {
            println!("{report}");
        }
        println!();
    }

    let kpi = engine.kpi();
    println!("{kpi}");

    if let Some(dir) = &cli.output_dir {
        export_tables(dir, &engine)?;
    }
    if let Some(path) = &cli.telemetry_out {
        export_ticks(engine.reports(), path)?;
        info!(path = %path.display(), "Telemetry written");
    }
    if let Some(path) = &cli.summary_json {
        let json = serde_json::to_string_pretty(&kpi).map_err(SimError::Json)?;
        fs::write(path, json)?;
        info!(path = %path.display(), "Summary written");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
