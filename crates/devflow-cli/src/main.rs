//! Devflow Runner
//!
//! Runs one delivery-pipeline simulation and prints its history.
//!
//! Usage: `devflow [--scenario FILE] [overrides...] [--format table|json] [--check]`

use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use devflow_cli::report::HistoryReport;
use devflow_cli::{CliError, Overrides};
use devflow_core::config::SimConfig;
use devflow_core::engine::run;
use devflow_core::fixed::checked_f64_to_fixed64;
use devflow_core::history::History;
use devflow_core::validation::{audit_history, validate_determinism};
use devflow_data::ranges::check_ranges;
use devflow_data::{ScenarioData, load_scenario, loader::resolve_scenario_path};
use devflow_stats::{PipelineStats, StatsConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "devflow")]
#[command(about = "Simulate work moving through a software delivery pipeline")]
struct Args {
    /// Scenario file (.ron, .toml, .json), or a path without extension to
    /// search for one
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Print every Nth tick in table output
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    stride: u64,

    /// Audit the run for invariant violations and check determinism
    #[arg(long)]
    check: bool,

    /// Rolling window, in steps, for rate statistics
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    window: u64,

    /// Largest step-to-step flow change still counted as equilibrium
    #[arg(long, default_value = "0.01")]
    tolerance: f64,
}

fn main() {
    devflow_cli::init_logging();

    let args = Args::parse();
    if let Err(e) = execute(&args) {
        error!("{e}");
        process::exit(1);
    }
}

fn execute(args: &Args) -> Result<(), CliError> {
    let scenario = match &args.scenario {
        Some(reference) => {
            let path = resolve_scenario_path(reference)?;
            let scenario = load_scenario(&path)?;
            info!("Loaded scenario: {} ({})", scenario.name, path.display());
            scenario
        }
        None => ScenarioData::default(),
    };

    let config = args.overrides.apply(scenario.to_builder()).build()?;
    for notice in check_ranges(&config) {
        warn!("{notice}");
    }

    let tolerance = checked_f64_to_fixed64(args.tolerance)
        .filter(|t| !t.is_negative())
        .ok_or(CliError::InvalidTolerance(args.tolerance))?;

    info!(
        "Running {} steps from {} tickets",
        config.duration(),
        config.initial_total()
    );
    let history = run(&config);

    let stats_config = StatsConfig {
        window_size: usize::try_from(args.window).unwrap_or(usize::MAX),
        ..StatsConfig::default()
    };
    let stats = PipelineStats::from_history(&history, stats_config);
    let report = HistoryReport::new(scenario.name.as_str(), &history, &stats, tolerance);

    match args.format {
        OutputFormat::Table => print!("{}", report.render_table(args.stride)),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    info!("{}", report.summary_line());

    if args.check {
        check(&config, &history)?;
    }
    Ok(())
}

/// Audit `history` and re-run `config` to confirm it replays identically.
fn check(config: &SimConfig, history: &History) -> Result<(), CliError> {
    let violations = audit_history(config, history);
    for violation in &violations {
        error!("{violation}");
    }

    let determinism = validate_determinism(config);
    if !determinism.is_deterministic {
        error!(
            "Runs diverged at tick {}",
            determinism.divergence_tick.unwrap_or_default()
        );
    }

    let count = violations.len() + usize::from(!determinism.is_deterministic);
    if count > 0 {
        return Err(CliError::CheckFailed { violations: count });
    }
    info!("Check passed: no invariant violations, runs are deterministic");
    Ok(())
}
