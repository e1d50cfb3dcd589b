//! Suggested parameter ranges for interactive hosts.
//!
//! These are the ranges a UI should offer by default. They are not engine
//! limits: a configuration outside them is valid and simply produces a
//! [`RangeNotice`].

use std::fmt;
use std::ops::RangeInclusive;

use devflow_core::config::SimConfig;
use devflow_core::fixed::fixed64_to_f64;
use devflow_core::stage::Stage;

pub const ERROR_RATE_RANGE: RangeInclusive<f64> = 0.0..=0.5;
pub const FLOW_RATE_RANGE: RangeInclusive<f64> = 1.0..=100.0;
pub const CAPACITY_RANGE: RangeInclusive<f64> = 1.0..=200.0;
pub const INITIAL_BACKLOG_RANGE: RangeInclusive<f64> = 10.0..=1000.0;
pub const DURATION_RANGE: RangeInclusive<f64> = 20.0..=200.0;

/// A parameter that lies outside its suggested range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeNotice {
    pub parameter: String,
    pub value: f64,
    pub suggested: RangeInclusive<f64>,
}

impl fmt::Display for RangeNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is {}, outside the suggested range {}..={}",
            self.parameter,
            self.value,
            self.suggested.start(),
            self.suggested.end()
        )
    }
}

/// List every parameter of `config` outside its suggested range.
pub fn check_ranges(config: &SimConfig) -> Vec<RangeNotice> {
    let mut notices = Vec::new();
    let mut check = |parameter: String, value: f64, suggested: &RangeInclusive<f64>| {
        if !suggested.contains(&value) {
            notices.push(RangeNotice {
                parameter,
                value,
                suggested: suggested.clone(),
            });
        }
    };

    check(
        "initial backlog".to_string(),
        fixed64_to_f64(config.initial_backlog()),
        &INITIAL_BACKLOG_RANGE,
    );
    check(
        "duration".to_string(),
        config.duration() as f64,
        &DURATION_RANGE,
    );
    for stage in Stage::ALL {
        if let Some(rate) = config.flow_rate(stage) {
            check(
                format!("flow rate for {stage}"),
                fixed64_to_f64(rate),
                &FLOW_RATE_RANGE,
            );
        }
        if let Some(capacity) = config.capacity(stage) {
            check(
                format!("capacity for {stage}"),
                fixed64_to_f64(capacity),
                &CAPACITY_RANGE,
            );
        }
        if let Some(rate) = config.error_rate(stage) {
            check(
                format!("error rate for {stage}"),
                fixed64_to_f64(rate),
                &ERROR_RATE_RANGE,
            );
        }
    }

    notices
}
