//! Validated simulation configuration.
//!
//! A [`SimConfig`] is an immutable value built once through
//! [`SimConfigBuilder`]. Every parameter is checked in
//! [`SimConfigBuilder::build`]; the step loop never re-validates anything.
//!
//! ```rust
//! use devflow_core::config::SimConfig;
//! use devflow_core::stage::Stage;
//!
//! let config = SimConfig::builder()
//!     .initial_backlog(100)
//!     .error_rate(Stage::InTesting, 0.25)
//!     .duration(50)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.duration(), 50);
//! ```

use std::fmt;

use serde::Serialize;

use crate::fixed::{Fixed64, MAX_TICKETS, Ticks, checked_f64_to_fixed64};
use crate::stage::{Stage, StageMap};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_INITIAL_BACKLOG: i64 = 100;
pub const DEFAULT_FLOW_RATE: f64 = 10.0;
pub const DEFAULT_CAPACITY: i64 = 50;
pub const DEFAULT_TESTING_ERROR_RATE: f64 = 0.15;
pub const DEFAULT_RELEASE_ERROR_RATE: f64 = 0.10;
pub const DEFAULT_PRODUCTION_ERROR_RATE: f64 = 0.25;
pub const DEFAULT_DURATION: i64 = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Which family of rate a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKind {
    Flow,
    Error,
    Arrival,
}

impl fmt::Display for RateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RateKind::Flow => "flow",
            RateKind::Error => "error",
            RateKind::Arrival => "arrival",
        })
    }
}

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A flow, error, or arrival rate is outside its allowed range.
    #[error("{kind} rate for {stage} is {value}, expected {expected}")]
    OutOfRangeRate {
        stage: Stage,
        kind: RateKind,
        value: f64,
        expected: &'static str,
    },

    /// A WIP capacity is zero or negative.
    #[error("capacity for {stage} is {value}, expected a positive integer")]
    NonPositiveCapacity { stage: Stage, value: i64 },

    /// The initial backlog is negative.
    #[error("initial backlog is {value}, expected a non-negative integer")]
    NegativeInitialBacklog { value: i64 },

    /// The duration is zero or negative.
    #[error("duration is {value}, expected a positive number of steps")]
    NonPositiveDuration { value: i64 },

    /// An initial stock outside Backlog is negative.
    #[error("initial stock for {stage} is {value}, expected a non-negative integer")]
    NegativeInitialStock { stage: Stage, value: i64 },

    /// A capacity-constrained stage starts above its capacity.
    #[error("initial stock for {stage} is {stock}, above its capacity of {capacity}")]
    InitialStockExceedsCapacity {
        stage: Stage,
        stock: i64,
        capacity: i64,
    },

    /// A parameter was set for a stage it has no meaning for.
    #[error("{parameter} does not apply to {stage}")]
    NotApplicable {
        stage: Stage,
        parameter: &'static str,
    },

    /// A quantity exceeds [`MAX_TICKETS`].
    #[error("{parameter} is {value}, above the limit of {MAX_TICKETS} tickets")]
    ExceedsTicketLimit { parameter: String, value: f64 },
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

/// Immutable, validated simulation parameters.
///
/// Per-stage values are stored densely; entries for stages a parameter does
/// not apply to are zero and are never read by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimConfig {
    flow_rates: StageMap<Fixed64>,
    capacities: StageMap<Fixed64>,
    error_rates: StageMap<Fixed64>,
    initial_stocks: StageMap<Fixed64>,
    arrival_rate: Fixed64,
    duration: Ticks,
}

impl SimConfig {
    /// Start a builder populated with the default parameters.
    pub fn builder() -> SimConfigBuilder {
        SimConfigBuilder::default()
    }

    /// Maximum tickets advanced per step out of `stage`, or `None` for the
    /// terminal stage.
    pub fn flow_rate(&self, stage: Stage) -> Option<Fixed64> {
        stage.forward_target().map(|_| self.flow_rates[stage])
    }

    /// WIP cap of `stage`, or `None` for uncapped reservoirs.
    pub fn capacity(&self, stage: Stage) -> Option<Fixed64> {
        stage
            .is_capacity_constrained()
            .then(|| self.capacities[stage])
    }

    /// Fraction of `stage`'s stock sent back each step, or `None` for stages
    /// without an error target.
    pub fn error_rate(&self, stage: Stage) -> Option<Fixed64> {
        stage.error_target().map(|_| self.error_rates[stage])
    }

    /// Stock level of every stage at tick 0.
    pub fn initial_stocks(&self) -> &StageMap<Fixed64> {
        &self.initial_stocks
    }

    /// Backlog at tick 0.
    pub fn initial_backlog(&self) -> Fixed64 {
        self.initial_stocks[Stage::Backlog]
    }

    /// Total tickets present at tick 0.
    pub fn initial_total(&self) -> Fixed64 {
        self.initial_stocks.values().copied().sum()
    }

    /// New tickets added to Backlog each step.
    pub fn arrival_rate(&self) -> Fixed64 {
        self.arrival_rate
    }

    /// Number of steps `run` performs.
    pub fn duration(&self) -> Ticks {
        self.duration
    }

    /// Tickets that should exist after `tick` steps.
    pub fn expected_total(&self, tick: Ticks) -> Fixed64 {
        let arrived = self
            .arrival_rate
            .saturating_mul_int(i64::try_from(tick).unwrap_or(i64::MAX));
        self.initial_total().saturating_add(arrived)
    }

    /// Whether every error rate is zero.
    pub fn is_error_free(&self) -> bool {
        Stage::ALL
            .into_iter()
            .filter_map(|s| self.error_rate(s))
            .all(|r| r == Fixed64::ZERO)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        // Builder defaults are always valid.
        match SimConfigBuilder::default().build() {
            Ok(config) => config,
            Err(e) => unreachable!("default configuration rejected: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Unvalidated parameters. Accepts raw `f64`/`i64` input so that callers can
/// pass user data straight through and get a precise [`ConfigError`] back.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfigBuilder {
    flow_rates: StageMap<Option<f64>>,
    capacities: StageMap<Option<i64>>,
    error_rates: StageMap<Option<f64>>,
    initial_stocks: StageMap<Option<i64>>,
    arrival_rate: f64,
    duration: i64,
}

impl Default for SimConfigBuilder {
    fn default() -> Self {
        let flow_rates = StageMap::from_fn(|s| s.forward_target().map(|_| DEFAULT_FLOW_RATE));
        let capacities =
            StageMap::from_fn(|s| s.is_capacity_constrained().then_some(DEFAULT_CAPACITY));
        let error_rates = StageMap::from_fn(|s| match s {
            Stage::InTesting => Some(DEFAULT_TESTING_ERROR_RATE),
            Stage::AwaitingRelease => Some(DEFAULT_RELEASE_ERROR_RATE),
            Stage::LiveInProduction => Some(DEFAULT_PRODUCTION_ERROR_RATE),
            _ => None,
        });
        let mut initial_stocks = StageMap::splat(None);
        initial_stocks[Stage::Backlog] = Some(DEFAULT_INITIAL_BACKLOG);

        Self {
            flow_rates,
            capacities,
            error_rates,
            initial_stocks,
            arrival_rate: 0.0,
            duration: DEFAULT_DURATION,
        }
    }
}

impl SimConfigBuilder {
    pub fn flow_rate(mut self, stage: Stage, rate: f64) -> Self {
        self.flow_rates[stage] = Some(rate);
        self
    }

    /// Set the same flow rate on every stage that has a forward target.
    pub fn all_flow_rates(mut self, rate: f64) -> Self {
        for stage in Stage::ALL {
            if stage.forward_target().is_some() {
                self.flow_rates[stage] = Some(rate);
            }
        }
        self
    }

    pub fn capacity(mut self, stage: Stage, capacity: i64) -> Self {
        self.capacities[stage] = Some(capacity);
        self
    }

    /// Set the same capacity on every WIP stage.
    pub fn all_capacities(mut self, capacity: i64) -> Self {
        for stage in Stage::ALL {
            if stage.is_capacity_constrained() {
                self.capacities[stage] = Some(capacity);
            }
        }
        self
    }

    pub fn error_rate(mut self, stage: Stage, rate: f64) -> Self {
        self.error_rates[stage] = Some(rate);
        self
    }

    /// Set the same error rate on every stage that has an error target.
    pub fn all_error_rates(mut self, rate: f64) -> Self {
        for stage in Stage::ALL {
            if stage.error_target().is_some() {
                self.error_rates[stage] = Some(rate);
            }
        }
        self
    }

    pub fn initial_backlog(mut self, tickets: i64) -> Self {
        self.initial_stocks[Stage::Backlog] = Some(tickets);
        self
    }

    /// Start a stage other than Backlog with some tickets already in it.
    pub fn initial_stock(mut self, stage: Stage, tickets: i64) -> Self {
        self.initial_stocks[stage] = Some(tickets);
        self
    }

    pub fn arrival_rate(mut self, rate: f64) -> Self {
        self.arrival_rate = rate;
        self
    }

    pub fn duration(mut self, steps: i64) -> Self {
        self.duration = steps;
        self
    }

    /// Validate every parameter and produce an immutable configuration.
    ///
    /// Checks run in a fixed order (duration, backlog, rates, capacities,
    /// stocks, totals) so the reported error is deterministic.
    pub fn build(self) -> Result<SimConfig, ConfigError> {
        if self.duration <= 0 {
            return Err(ConfigError::NonPositiveDuration {
                value: self.duration,
            });
        }

        let backlog = self.initial_stocks[Stage::Backlog].unwrap_or(0);
        if backlog < 0 {
            return Err(ConfigError::NegativeInitialBacklog { value: backlog });
        }

        let mut flow_rates = StageMap::splat(Fixed64::ZERO);
        for (stage, rate) in self.flow_rates.iter() {
            flow_rates[stage] = match (stage.forward_target(), rate) {
                (Some(_), Some(rate)) => validate_flow_rate(stage, *rate)?,
                (Some(_), None) => validate_flow_rate(stage, DEFAULT_FLOW_RATE)?,
                (None, Some(_)) => return Err(not_applicable(stage, "flow rate")),
                (None, None) => Fixed64::ZERO,
            };
        }

        let mut error_rates = StageMap::splat(Fixed64::ZERO);
        for (stage, rate) in self.error_rates.iter() {
            error_rates[stage] = match (stage.error_target(), rate) {
                (Some(_), Some(rate)) => validate_error_rate(stage, *rate)?,
                (Some(_), None) => Fixed64::ZERO,
                (None, Some(_)) => return Err(not_applicable(stage, "error rate")),
                (None, None) => Fixed64::ZERO,
            };
        }

        let mut capacities = StageMap::splat(Fixed64::ZERO);
        for (stage, capacity) in self.capacities.iter() {
            capacities[stage] = match (stage.is_capacity_constrained(), capacity) {
                (true, Some(capacity)) => validate_capacity(stage, *capacity)?,
                (true, None) => validate_capacity(stage, DEFAULT_CAPACITY)?,
                (false, Some(_)) => return Err(not_applicable(stage, "capacity")),
                (false, None) => Fixed64::ZERO,
            };
        }

        let mut initial_stocks = StageMap::splat(Fixed64::ZERO);
        let mut initial_total: i64 = 0;
        for (stage, stock) in self.initial_stocks.iter() {
            let stock = stock.unwrap_or(0);
            if stock < 0 {
                return Err(ConfigError::NegativeInitialStock {
                    stage,
                    value: stock,
                });
            }
            if let Some(capacity) = self.capacities[stage].filter(|_| stage.is_capacity_constrained())
            {
                if stock > capacity {
                    return Err(ConfigError::InitialStockExceedsCapacity {
                        stage,
                        stock,
                        capacity,
                    });
                }
            }
            let stock_limit = i64::from(MAX_TICKETS);
            if stock > stock_limit {
                return Err(ConfigError::ExceedsTicketLimit {
                    parameter: format!("initial stock for {stage}"),
                    value: stock as f64,
                });
            }
            initial_stocks[stage] = Fixed64::from_num(stock);
            initial_total = initial_total.saturating_add(stock);
        }

        let arrival_rate = validate_arrival_rate(self.arrival_rate)?;

        // Worst case: every arrival over the whole run is still in the system.
        let worst_total = initial_total as f64 + self.arrival_rate * self.duration as f64;
        if worst_total > f64::from(MAX_TICKETS) {
            return Err(ConfigError::ExceedsTicketLimit {
                parameter: "total tickets over the run".to_string(),
                value: worst_total,
            });
        }

        Ok(SimConfig {
            flow_rates,
            capacities,
            error_rates,
            initial_stocks,
            arrival_rate,
            duration: self.duration as Ticks,
        })
    }
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

fn not_applicable(stage: Stage, parameter: &'static str) -> ConfigError {
    ConfigError::NotApplicable { stage, parameter }
}

fn validate_flow_rate(stage: Stage, rate: f64) -> Result<Fixed64, ConfigError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(ConfigError::OutOfRangeRate {
            stage,
            kind: RateKind::Flow,
            value: rate,
            expected: "a finite positive number",
        });
    }
    to_bounded_fixed(rate, || format!("flow rate for {stage}"))
}

fn validate_error_rate(stage: Stage, rate: f64) -> Result<Fixed64, ConfigError> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError::OutOfRangeRate {
            stage,
            kind: RateKind::Error,
            value: rate,
            expected: "a fraction in [0, 1]",
        });
    }
    to_bounded_fixed(rate, || format!("error rate for {stage}"))
}

fn validate_arrival_rate(rate: f64) -> Result<Fixed64, ConfigError> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(ConfigError::OutOfRangeRate {
            stage: Stage::Backlog,
            kind: RateKind::Arrival,
            value: rate,
            expected: "a finite non-negative number",
        });
    }
    to_bounded_fixed(rate, || "arrival rate".to_string())
}

fn validate_capacity(stage: Stage, capacity: i64) -> Result<Fixed64, ConfigError> {
    if capacity <= 0 {
        return Err(ConfigError::NonPositiveCapacity {
            stage,
            value: capacity,
        });
    }
    to_bounded_fixed(capacity as f64, || format!("capacity for {stage}"))
}

fn to_bounded_fixed(value: f64, parameter: impl FnOnce() -> String) -> Result<Fixed64, ConfigError> {
    if value > f64::from(MAX_TICKETS) {
        return Err(ConfigError::ExceedsTicketLimit {
            parameter: parameter(),
            value,
        });
    }
    checked_f64_to_fixed64(value).ok_or_else(|| ConfigError::ExceedsTicketLimit {
        parameter: parameter(),
        value,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
