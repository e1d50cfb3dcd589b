//! Serde data file structs for simulation scenarios.
//!
//! A scenario file describes one configuration. Every field is optional on
//! disk and falls back to the engine default, so a file only needs to name
//! what it changes. Parameters that do not apply to a stage (a capacity on
//! Backlog, a flow rate out of Live in Production) have no field at all.

use devflow_core::config::{
    ConfigError, DEFAULT_CAPACITY, DEFAULT_DURATION, DEFAULT_FLOW_RATE, DEFAULT_INITIAL_BACKLOG,
    DEFAULT_PRODUCTION_ERROR_RATE, DEFAULT_RELEASE_ERROR_RATE, DEFAULT_TESTING_ERROR_RATE,
    SimConfig, SimConfigBuilder,
};
use devflow_core::stage::Stage;
use serde::{Deserialize, Serialize};

// ===========================================================================
// Scenario
// ===========================================================================

/// A complete scenario as written in a data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioData {
    pub name: String,
    pub description: String,
    pub initial: InitialStocksData,
    pub flow_rates: FlowRatesData,
    pub capacities: CapacitiesData,
    pub error_rates: ErrorRatesData,
    pub arrival_rate: f64,
    pub duration: i64,
}

impl Default for ScenarioData {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: String::new(),
            initial: InitialStocksData::default(),
            flow_rates: FlowRatesData::default(),
            capacities: CapacitiesData::default(),
            error_rates: ErrorRatesData::default(),
            arrival_rate: 0.0,
            duration: DEFAULT_DURATION,
        }
    }
}

impl ScenarioData {
    /// A builder carrying every value of this scenario, ready for further
    /// overrides.
    pub fn to_builder(&self) -> SimConfigBuilder {
        let flow_rates = [
            (Stage::Backlog, self.flow_rates.backlog),
            (Stage::InDevelopment, self.flow_rates.in_development),
            (Stage::InTesting, self.flow_rates.in_testing),
            (Stage::AwaitingRelease, self.flow_rates.awaiting_release),
        ];
        let capacities = [
            (Stage::InDevelopment, self.capacities.in_development),
            (Stage::InTesting, self.capacities.in_testing),
            (Stage::AwaitingRelease, self.capacities.awaiting_release),
        ];
        let error_rates = [
            (Stage::InTesting, self.error_rates.in_testing),
            (Stage::AwaitingRelease, self.error_rates.awaiting_release),
            (Stage::LiveInProduction, self.error_rates.live_in_production),
        ];
        let stocks = [
            (Stage::InDevelopment, self.initial.in_development),
            (Stage::InTesting, self.initial.in_testing),
            (Stage::AwaitingRelease, self.initial.awaiting_release),
            (Stage::LiveInProduction, self.initial.live_in_production),
        ];

        let mut builder = SimConfig::builder()
            .initial_backlog(self.initial.backlog)
            .arrival_rate(self.arrival_rate)
            .duration(self.duration);
        for (stage, rate) in flow_rates {
            builder = builder.flow_rate(stage, rate);
        }
        for (stage, capacity) in capacities {
            builder = builder.capacity(stage, capacity);
        }
        for (stage, rate) in error_rates {
            builder = builder.error_rate(stage, rate);
        }
        for (stage, tickets) in stocks {
            builder = builder.initial_stock(stage, tickets);
        }
        builder
    }

    /// Validate this scenario into a configuration.
    pub fn to_config(&self) -> Result<SimConfig, ConfigError> {
        self.to_builder().build()
    }
}

// ===========================================================================
// Per-stage tables
// ===========================================================================

/// Tickets in each stage at tick 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitialStocksData {
    pub backlog: i64,
    pub in_development: i64,
    pub in_testing: i64,
    pub awaiting_release: i64,
    pub live_in_production: i64,
}

impl Default for InitialStocksData {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_INITIAL_BACKLOG,
            in_development: 0,
            in_testing: 0,
            awaiting_release: 0,
            live_in_production: 0,
        }
    }
}

/// Tickets advanced per step out of each non-terminal stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowRatesData {
    pub backlog: f64,
    pub in_development: f64,
    pub in_testing: f64,
    pub awaiting_release: f64,
}

impl Default for FlowRatesData {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_FLOW_RATE,
            in_development: DEFAULT_FLOW_RATE,
            in_testing: DEFAULT_FLOW_RATE,
            awaiting_release: DEFAULT_FLOW_RATE,
        }
    }
}

/// WIP caps of the three middle stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacitiesData {
    pub in_development: i64,
    pub in_testing: i64,
    pub awaiting_release: i64,
}

impl Default for CapacitiesData {
    fn default() -> Self {
        Self {
            in_development: DEFAULT_CAPACITY,
            in_testing: DEFAULT_CAPACITY,
            awaiting_release: DEFAULT_CAPACITY,
        }
    }
}

/// Fraction of stock sent back each step by the stages that find defects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorRatesData {
    pub in_testing: f64,
    pub awaiting_release: f64,
    pub live_in_production: f64,
}

impl Default for ErrorRatesData {
    fn default() -> Self {
        Self {
            in_testing: DEFAULT_TESTING_ERROR_RATE,
            awaiting_release: DEFAULT_RELEASE_ERROR_RATE,
            live_in_production: DEFAULT_PRODUCTION_ERROR_RATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_core::test_utils::fixed as fx;

    #[test]
    fn empty_ron_gives_default_config() {
        let scenario: ScenarioData = ron::from_str("()").unwrap();
        assert_eq!(scenario, ScenarioData::default());
        assert_eq!(scenario.to_config().unwrap(), SimConfig::default());
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let scenario: ScenarioData =
            ron::from_str("(error_rates: (in_testing: 0.5), duration: 20)").unwrap();
        assert_eq!(scenario.error_rates.in_testing, 0.5);
        assert_eq!(
            scenario.error_rates.live_in_production,
            DEFAULT_PRODUCTION_ERROR_RATE
        );
        assert_eq!(scenario.flow_rates, FlowRatesData::default());
        assert_eq!(scenario.duration, 20);
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<ScenarioData, _> = ron::from_str("(capacities: (backlog: 10))");
        assert!(result.is_err());
        let result: Result<ScenarioData, _> = ron::from_str("(durration: 10)");
        assert!(result.is_err());
    }

    #[test]
    fn to_config_carries_every_field() {
        let scenario = ScenarioData {
            initial: InitialStocksData {
                backlog: 7,
                in_testing: 3,
                ..InitialStocksData::default()
            },
            flow_rates: FlowRatesData {
                in_development: 2.5,
                ..FlowRatesData::default()
            },
            capacities: CapacitiesData {
                awaiting_release: 9,
                ..CapacitiesData::default()
            },
            error_rates: ErrorRatesData {
                awaiting_release: 0.5,
                ..ErrorRatesData::default()
            },
            arrival_rate: 1.5,
            duration: 12,
            ..ScenarioData::default()
        };
        let config = scenario.to_config().unwrap();
        let initial = config.initial_stocks();

        assert_eq!(initial[Stage::Backlog], fx(7.0));
        assert_eq!(initial[Stage::InTesting], fx(3.0));
        assert_eq!(config.flow_rate(Stage::InDevelopment), Some(fx(2.5)));
        assert_eq!(config.capacity(Stage::AwaitingRelease), Some(fx(9.0)));
        assert_eq!(config.error_rate(Stage::AwaitingRelease), Some(fx(0.5)));
        assert_eq!(config.arrival_rate(), fx(1.5));
        assert_eq!(config.duration(), 12);
    }

    #[test]
    fn invalid_values_surface_config_errors() {
        let scenario = ScenarioData {
            error_rates: ErrorRatesData {
                in_testing: 1.2,
                ..ErrorRatesData::default()
            },
            ..ScenarioData::default()
        };
        assert!(matches!(
            scenario.to_config(),
            Err(ConfigError::OutOfRangeRate {
                stage: Stage::InTesting,
                ..
            })
        ));
    }
}
