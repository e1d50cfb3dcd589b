//! The simulation engine: the per-step update rule and the loop that turns a
//! configuration into a [`History`].
//!
//! # Step algorithm
//!
//! Every flow of a step is computed from the previous snapshot and applied
//! at once, so the order stages are visited in never changes the result:
//!
//! 1. **Rework** -- each stage with an error target earmarks
//!    `error_rate * stock` to send back.
//! 2. **Admission** -- rework headed for a WIP-capped stage is admitted up to
//!    that stage's headroom. When the total exceeds headroom every source is
//!    scaled by the same factor; the remainder stays put for this step.
//! 3. **Forward** -- each non-terminal stage advances
//!    `min(flow_rate, stock - earmarked)`, clamped to the target's headroom
//!    after admitted rework when the target is WIP-capped.
//! 4. **Apply** -- outflows are subtracted, inflows and arrivals added, and
//!    levels floored at zero.
//!
//! Earmarked rework plus forward flow never exceeds a stage's stock, and
//! every flow has both ends inside the graph, so the ticket total is
//! conserved exactly.

use crate::config::SimConfig;
use crate::fixed::{Fixed64, Ticks, headroom};
use crate::history::History;
use crate::sim::{FlowRecord, SimulationState};
use crate::stage::{Stage, StageMap};

// ---------------------------------------------------------------------------
// Pure step
// ---------------------------------------------------------------------------

/// Advance `state` by one tick under `config`.
///
/// Returns the next state and the flows realized during the transition.
/// Never fails: all clamping is part of the contract.
pub fn step(config: &SimConfig, state: &SimulationState) -> (SimulationState, FlowRecord) {
    let stocks = &state.stocks;

    // Phase 1: rework earmarked from the pre-step snapshot.
    let earmarked = StageMap::from_fn(|stage| match config.error_rate(stage) {
        Some(rate) => (rate * stocks[stage]).min(stocks[stage]).max(Fixed64::ZERO),
        None => Fixed64::ZERO,
    });

    // Phase 2: rework admitted into its target.
    let error = admit_rework(config, stocks, &earmarked);
    let mut rework_in = StageMap::splat(Fixed64::ZERO);
    for stage in Stage::ALL {
        if let Some(target) = stage.error_target() {
            rework_in[target] += error[stage];
        }
    }

    // Phase 3: forward flow.
    let forward = StageMap::from_fn(|stage| {
        let (Some(target), Some(rate)) = (stage.forward_target(), config.flow_rate(stage)) else {
            return Fixed64::ZERO;
        };
        let available = (stocks[stage] - earmarked[stage]).max(Fixed64::ZERO);
        let attempted = rate.min(available);
        match config.capacity(target) {
            Some(capacity) => attempted.min(headroom(capacity, stocks[target] + rework_in[target])),
            None => attempted,
        }
    });

    // Phase 4: apply atomically.
    let record = FlowRecord {
        tick: state.tick + 1,
        forward,
        error,
        arrivals: config.arrival_rate(),
    };
    let next = record.apply_to(state);

    tracing::trace!(tick = next.tick, total = %next.total(), "pipeline step");

    (next, record)
}

/// Scale earmarked rework so that no WIP-capped target receives more than
/// its headroom. Sources feeding the same target share one scale factor.
fn admit_rework(
    config: &SimConfig,
    stocks: &StageMap<Fixed64>,
    earmarked: &StageMap<Fixed64>,
) -> StageMap<Fixed64> {
    let mut requested = StageMap::splat(Fixed64::ZERO);
    for stage in Stage::ALL {
        if let Some(target) = stage.error_target() {
            requested[target] += earmarked[stage];
        }
    }

    let mut admitted = *earmarked;
    for target in Stage::ALL {
        let Some(capacity) = config.capacity(target) else {
            continue;
        };
        let room = headroom(capacity, stocks[target]);
        if requested[target] <= room {
            continue;
        }

        let scale = room / requested[target];
        let mut granted = Fixed64::ZERO;
        let mut largest: Option<Stage> = None;
        for source in Stage::ALL {
            if source.error_target() != Some(target) {
                continue;
            }
            admitted[source] = (earmarked[source] * scale).min(earmarked[source]);
            granted += admitted[source];
            if largest.is_none_or(|l| admitted[source] > admitted[l]) {
                largest = Some(source);
            }
        }

        // Rounding in `scale` can overshoot the room by a few ulps.
        if granted > room {
            if let Some(l) = largest {
                admitted[l] = (admitted[l] - (granted - room)).max(Fixed64::ZERO);
            }
        }
    }
    admitted
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Simulate `config.duration()` steps from the initial state.
///
/// Deterministic: equal configurations always produce equal histories.
pub fn run(config: &SimConfig) -> History {
    let mut engine = Engine::new(config.clone());
    engine.run_to_end();
    engine.into_history()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateful wrapper around [`step`] for callers that advance one tick at a
/// time, e.g. an interactive host that wants to stop between steps.
#[derive(Debug, Clone)]
pub struct Engine {
    config: SimConfig,
    state: SimulationState,
    history: History,
}

impl Engine {
    /// Create an engine positioned at tick 0.
    pub fn new(config: SimConfig) -> Self {
        let state = SimulationState::initial(&config);
        let history = History::new(state.clone());
        Self {
            config,
            state,
            history,
        }
    }

    /// The configuration this engine runs.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The most recent state.
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Current tick.
    pub fn tick(&self) -> Ticks {
        self.state.tick
    }

    /// Whether the configured duration has been reached.
    pub fn is_finished(&self) -> bool {
        self.state.tick >= self.config.duration()
    }

    /// Flows of the most recent step, or `None` before the first step.
    pub fn current_flows(&self) -> Option<&FlowRecord> {
        self.history.flows().last()
    }

    /// Everything recorded so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Consume the engine and return its history.
    pub fn into_history(self) -> History {
        self.history
    }

    /// Advance one tick and return the flows realized during it.
    ///
    /// Returns `None` once the configured duration has been reached. The
    /// ticket ceiling checked by the builder only covers that many steps of
    /// arrivals.
    pub fn step(&mut self) -> Option<&FlowRecord> {
        if self.is_finished() {
            return None;
        }
        let (next, record) = step(&self.config, &self.state);
        self.state = next.clone();
        Some(self.history.record(next, record))
    }

    /// Advance up to `steps` ticks, stopping early at the configured
    /// duration.
    pub fn advance(&mut self, steps: Ticks) {
        for _ in 0..steps {
            if self.step().is_none() {
                break;
            }
        }
    }

    /// Advance until the configured duration is reached.
    pub fn run_to_end(&mut self) {
        let remaining = self.config.duration().saturating_sub(self.state.tick);
        tracing::debug!(
            from_tick = self.state.tick,
            steps = remaining,
            tickets = %self.state.total(),
            "running pipeline simulation"
        );
        self.advance(remaining);
        tracing::debug!(
            tick = self.state.tick,
            live = %self.state.stock(Stage::LiveInProduction),
            "pipeline simulation finished"
        );
    }

    /// Return to tick 0, discarding the history.
    pub fn reset(&mut self) {
        self.state = SimulationState::initial(&self.config);
        self.history = History::new(self.state.clone());
    }
}

// ===========================================================================
// Tests
// ===========================================================================
