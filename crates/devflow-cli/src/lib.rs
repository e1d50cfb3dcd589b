//! Devflow CLI
//!
//! Shared pieces of the `devflow` binary: logging setup, command-line
//! parameter overrides, and run reports.

pub mod report;

use devflow_core::config::{ConfigError, SimConfigBuilder};
use devflow_core::stage::Stage;
use devflow_data::DataLoadError;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging with a default filter.
///
/// Use `RUST_LOG` environment variable to override the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Errors that stop a CLI run.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Data(#[from] DataLoadError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("equilibrium tolerance must be a non-negative number, got {0}")]
    InvalidTolerance(f64),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("check failed with {violations} violation(s)")]
    CheckFailed { violations: usize },
}

/// Parameter overrides applied on top of a scenario (or the defaults).
///
/// Rates and capacities apply to every stage they make sense for.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// Initial tickets in Backlog
    #[arg(long)]
    pub backlog: Option<i64>,

    /// Number of steps to simulate
    #[arg(long)]
    pub duration: Option<i64>,

    /// Tickets advanced per step out of every non-terminal stage
    #[arg(long)]
    pub flow_rate: Option<f64>,

    /// WIP cap of every middle stage
    #[arg(long)]
    pub capacity: Option<i64>,

    /// Fraction of In Testing sent back to development each step
    #[arg(long)]
    pub testing_error_rate: Option<f64>,

    /// Fraction of Awaiting Release sent back to development each step
    #[arg(long)]
    pub release_error_rate: Option<f64>,

    /// Fraction of Live in Production reopened into Backlog each step
    #[arg(long)]
    pub production_error_rate: Option<f64>,

    /// New tickets added to Backlog each step
    #[arg(long)]
    pub arrival_rate: Option<f64>,
}

impl Overrides {
    /// Apply every override that was given, leaving the rest of `builder`
    /// untouched.
    pub fn apply(&self, mut builder: SimConfigBuilder) -> SimConfigBuilder {
        if let Some(backlog) = self.backlog {
            builder = builder.initial_backlog(backlog);
        }
        if let Some(duration) = self.duration {
            builder = builder.duration(duration);
        }
        if let Some(rate) = self.flow_rate {
            builder = builder.all_flow_rates(rate);
        }
        if let Some(capacity) = self.capacity {
            builder = builder.all_capacities(capacity);
        }
        let error_rates = [
            (Stage::InTesting, self.testing_error_rate),
            (Stage::AwaitingRelease, self.release_error_rate),
            (Stage::LiveInProduction, self.production_error_rate),
        ];
        for (stage, rate) in error_rates {
            if let Some(rate) = rate {
                builder = builder.error_rate(stage, rate);
            }
        }
        if let Some(rate) = self.arrival_rate {
            builder = builder.arrival_rate(rate);
        }
        builder
    }
}
