//! Scenario files for the devflow simulator.
//!
//! Loads RON, TOML, or JSON scenario descriptions into validated
//! configurations, and reports parameters that fall outside the ranges an
//! interactive host would normally offer.

pub mod loader;
pub mod ranges;
pub mod schema;

pub use loader::{DataLoadError, load_config, load_scenario};
pub use schema::ScenarioData;
