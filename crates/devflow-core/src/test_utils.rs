//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::SimConfig;
use crate::fixed::{Fixed64, fixed64_to_f64};
use crate::history::History;
use crate::stage::Stage;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Configurations
// ===========================================================================

/// Same flow rate, capacity, and error rate on every stage that takes them.
pub fn uniform_config(
    backlog: i64,
    flow_rate: f64,
    capacity: i64,
    error_rate: f64,
    duration: i64,
) -> SimConfig {
    SimConfig::builder()
        .initial_backlog(backlog)
        .all_flow_rates(flow_rate)
        .all_capacities(capacity)
        .all_error_rates(error_rate)
        .duration(duration)
        .build()
        .expect("uniform test configuration should be valid")
}

/// Backlog 100, rates 10, capacities 50, error rates {0.25, 0.1, 0.25},
/// 50 steps.
pub fn baseline_config() -> SimConfig {
    SimConfig::builder()
        .initial_backlog(100)
        .all_flow_rates(10.0)
        .all_capacities(50)
        .error_rate(Stage::InTesting, 0.25)
        .error_rate(Stage::AwaitingRelease, 0.1)
        .error_rate(Stage::LiveInProduction, 0.25)
        .duration(50)
        .build()
        .expect("baseline test configuration should be valid")
}

/// Large rates and caps with no errors: everything drains straight through.
pub fn error_free_config(backlog: i64, duration: i64) -> SimConfig {
    uniform_config(backlog, 100.0, 200, 0.0, duration)
}

/// A single-ticket bottleneck in InDevelopment.
pub fn bottleneck_config(backlog: i64, duration: i64) -> SimConfig {
    SimConfig::builder()
        .initial_backlog(backlog)
        .all_flow_rates(10.0)
        .capacity(Stage::InDevelopment, 1)
        .all_error_rates(0.0)
        .duration(duration)
        .build()
        .expect("bottleneck test configuration should be valid")
}

// ===========================================================================
// Assertions
// ===========================================================================

/// Assert every state's total equals the configured expectation exactly.
pub fn assert_conserved(config: &SimConfig, history: &History) {
    for state in history.states() {
        assert_eq!(
            state.total(),
            config.expected_total(state.tick),
            "ticket total drifted at tick {}",
            state.tick
        );
    }
}

/// Assert every stock and every flow is non-negative.
pub fn assert_non_negative(history: &History) {
    for state in history.states() {
        for (stage, stock) in state.stocks.iter() {
            assert!(
                *stock >= Fixed64::ZERO,
                "{stage} went negative at tick {}",
                state.tick
            );
        }
    }
    for flows in history.flows() {
        for stage in Stage::ALL {
            assert!(flows.forward(stage) >= Fixed64::ZERO);
            assert!(flows.error(stage) >= Fixed64::ZERO);
        }
    }
}

/// Assert no WIP-capped stage ever holds more than its capacity.
pub fn assert_within_capacity(config: &SimConfig, history: &History) {
    for state in history.states() {
        for stage in Stage::ALL {
            if let Some(capacity) = config.capacity(stage) {
                assert!(
                    state.stock(stage) <= capacity,
                    "{stage} over capacity at tick {}: {} > {}",
                    state.tick,
                    state.stock(stage),
                    capacity
                );
            }
        }
    }
}

/// Assert `actual` is within `tolerance` of `expected`.
pub fn assert_close(actual: Fixed64, expected: f64, tolerance: f64) {
    let actual = fixed64_to_f64(actual);
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} +/- {tolerance}, got {actual}"
    );
}
