//! Invariant audit and determinism checking for recorded runs.
//!
//! [`audit_history`] re-derives every property a History must satisfy from
//! the History itself, so it can check runs produced elsewhere (e.g. loaded
//! from JSON). [`validate_determinism`] runs a configuration twice and
//! compares per-step state hashes.

use std::fmt;

use crate::config::SimConfig;
use crate::engine::Engine;
use crate::fixed::{Fixed64, Ticks};
use crate::history::History;
use crate::stage::Stage;

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// One broken invariant, located by tick and (where relevant) stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The ticket total differs from the initial total plus arrivals.
    Conservation {
        tick: Ticks,
        expected: Fixed64,
        actual: Fixed64,
    },
    /// A stock dropped below zero.
    NegativeStock { tick: Ticks, stage: Stage, stock: Fixed64 },
    /// A recorded flow is negative.
    NegativeFlow { tick: Ticks, stage: Stage, flow: Fixed64 },
    /// A WIP-capped stage holds more than its capacity.
    CapacityExceeded {
        tick: Ticks,
        stage: Stage,
        stock: Fixed64,
        capacity: Fixed64,
    },
    /// Forward flow out of a stage exceeds its flow rate.
    RateExceeded {
        tick: Ticks,
        stage: Stage,
        flow: Fixed64,
        rate: Fixed64,
    },
    /// A stage moved more tickets than it held at the start of the step.
    Overdrawn {
        tick: Ticks,
        stage: Stage,
        outflow: Fixed64,
        stock: Fixed64,
    },
    /// A flow was recorded on a link that does not exist.
    PhantomFlow { tick: Ticks, stage: Stage },
    /// Arrivals differ from the configured arrival rate.
    ArrivalMismatch { tick: Ticks, arrivals: Fixed64 },
    /// A state does not equal its predecessor plus the step's flows.
    ReplayMismatch { tick: Ticks },
    /// The History's length does not match the tick numbering.
    MisnumberedTick { index: usize, tick: Ticks },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conservation {
                tick,
                expected,
                actual,
            } => write!(f, "tick {tick}: total is {actual}, expected {expected}"),
            Self::NegativeStock { tick, stage, stock } => {
                write!(f, "tick {tick}: {stage} stock is negative ({stock})")
            }
            Self::NegativeFlow { tick, stage, flow } => {
                write!(f, "tick {tick}: flow out of {stage} is negative ({flow})")
            }
            Self::CapacityExceeded {
                tick,
                stage,
                stock,
                capacity,
            } => write!(f, "tick {tick}: {stage} holds {stock}, capacity {capacity}"),
            Self::RateExceeded {
                tick,
                stage,
                flow,
                rate,
            } => write!(f, "tick {tick}: {stage} advanced {flow}, rate {rate}"),
            Self::Overdrawn {
                tick,
                stage,
                outflow,
                stock,
            } => write!(f, "tick {tick}: {stage} sent {outflow} but held {stock}"),
            Self::PhantomFlow { tick, stage } => {
                write!(f, "tick {tick}: flow recorded on a missing link of {stage}")
            }
            Self::ArrivalMismatch { tick, arrivals } => {
                write!(f, "tick {tick}: {arrivals} arrivals recorded")
            }
            Self::ReplayMismatch { tick } => {
                write!(f, "tick {tick}: state does not follow from recorded flows")
            }
            Self::MisnumberedTick { index, tick } => {
                write!(f, "entry {index} is labelled tick {tick}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Check every state and flow of `history` against `config`.
///
/// Returns all violations found, in tick order. An empty vector means the
/// run satisfied conservation, non-negativity, capacity, rate, and replay
/// consistency at every step.
pub fn audit_history(config: &SimConfig, history: &History) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (index, state) in history.states().iter().enumerate() {
        let tick = state.tick;
        if tick != index as Ticks {
            violations.push(InvariantViolation::MisnumberedTick { index, tick });
        }

        let expected = config.expected_total(tick);
        let actual = state.total();
        if actual != expected {
            violations.push(InvariantViolation::Conservation {
                tick,
                expected,
                actual,
            });
        }

        for (stage, stock) in state.stocks.iter() {
            if *stock < Fixed64::ZERO {
                violations.push(InvariantViolation::NegativeStock {
                    tick,
                    stage,
                    stock: *stock,
                });
            }
            if let Some(capacity) = config.capacity(stage) {
                if *stock > capacity {
                    violations.push(InvariantViolation::CapacityExceeded {
                        tick,
                        stage,
                        stock: *stock,
                        capacity,
                    });
                }
            }
        }
    }

    for (prev, flows) in history.states().iter().zip(history.flows()) {
        let tick = flows.tick;

        for stage in Stage::ALL {
            let forward = flows.forward(stage);
            let error = flows.error(stage);

            for flow in [forward, error] {
                if flow < Fixed64::ZERO {
                    violations.push(InvariantViolation::NegativeFlow { tick, stage, flow });
                }
            }

            if (stage.forward_target().is_none() && forward != Fixed64::ZERO)
                || (stage.error_target().is_none() && error != Fixed64::ZERO)
            {
                violations.push(InvariantViolation::PhantomFlow { tick, stage });
            }

            if let Some(rate) = config.flow_rate(stage) {
                if forward > rate {
                    violations.push(InvariantViolation::RateExceeded {
                        tick,
                        stage,
                        flow: forward,
                        rate,
                    });
                }
            }

            let outflow = flows.outflow(stage);
            if outflow > prev.stock(stage) {
                violations.push(InvariantViolation::Overdrawn {
                    tick,
                    stage,
                    outflow,
                    stock: prev.stock(stage),
                });
            }
        }

        if flows.arrivals != config.arrival_rate() {
            violations.push(InvariantViolation::ArrivalMismatch {
                tick,
                arrivals: flows.arrivals,
            });
        }

        match history.state(tick) {
            Some(next) if flows.apply_to(prev) == *next => {}
            _ => violations.push(InvariantViolation::ReplayMismatch { tick }),
        }
    }

    if !violations.is_empty() {
        tracing::debug!(count = violations.len(), "history audit found violations");
    }
    violations
}

// ---------------------------------------------------------------------------
// Determinism validation
// ---------------------------------------------------------------------------

/// Result of a determinism validation run.
#[derive(Debug)]
pub struct DeterminismResult {
    /// Whether the two runs produced identical results.
    pub is_deterministic: bool,
    /// Tick at which divergence was first detected (if any).
    pub divergence_tick: Option<Ticks>,
    /// Hash log: (tick, hash_run1, hash_run2) for each tick.
    pub hash_log: Vec<(Ticks, u64, u64)>,
}

/// Validate that running the same configuration twice produces identical
/// states at every tick.
pub fn validate_determinism(config: &SimConfig) -> DeterminismResult {
    let mut engine_a = Engine::new(config.clone());
    let mut engine_b = Engine::new(config.clone());

    let mut hash_log = Vec::new();
    let mut divergence_tick = None;

    while engine_a.step().is_some() {
        engine_b.step();

        let hash_a = engine_a.state().state_hash();
        let hash_b = engine_b.state().state_hash();
        let tick = engine_a.tick();

        hash_log.push((tick, hash_a, hash_b));

        if hash_a != hash_b && divergence_tick.is_none() {
            divergence_tick = Some(tick);
        }
    }

    DeterminismResult {
        is_deterministic: divergence_tick.is_none(),
        divergence_tick,
        hash_log,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
