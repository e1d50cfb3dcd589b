//! The ordered record of a simulation run.
//!
//! A [`History`] holds `n + 1` states and `n` flow records: state `t` is the
//! snapshot at tick `t`, and flow record `t` (for `t >= 1`) holds the flows
//! realized by the step that produced state `t`. Consumers read it as two
//! time series, stocks per stage and flows per stage.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Ticks};
use crate::sim::{FlowRecord, SimulationState, StateHash};
use crate::stage::Stage;

/// Per-step snapshots of one run. Read-only to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    states: Vec<SimulationState>,
    flows: Vec<FlowRecord>,
}

/// One step of a history: the flows of the step and the state they produced.
#[derive(Debug, Clone, Copy)]
pub struct StepView<'a> {
    pub flows: &'a FlowRecord,
    pub state: &'a SimulationState,
}

impl History {
    /// A history holding only its initial state.
    pub(crate) fn new(initial: SimulationState) -> Self {
        Self {
            states: vec![initial],
            flows: Vec::new(),
        }
    }

    /// Append one step. Returns the stored flow record.
    pub(crate) fn record(&mut self, state: SimulationState, flows: FlowRecord) -> &FlowRecord {
        debug_assert_eq!(state.tick, flows.tick);
        debug_assert_eq!(state.tick as usize, self.states.len());
        self.states.push(state);
        self.flows.push(flows);
        &self.flows[self.flows.len() - 1]
    }

    /// Number of states (steps + 1).
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false: a history holds at least its initial state.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of steps recorded.
    pub fn duration(&self) -> Ticks {
        self.flows.len() as Ticks
    }

    /// All states in tick order.
    pub fn states(&self) -> &[SimulationState] {
        &self.states
    }

    /// All flow records in tick order (the first belongs to tick 1).
    pub fn flows(&self) -> &[FlowRecord] {
        &self.flows
    }

    /// State at `tick`.
    pub fn state(&self, tick: Ticks) -> Option<&SimulationState> {
        self.states.get(usize::try_from(tick).ok()?)
    }

    /// Flows of the step that ended at `tick`. `None` for tick 0.
    pub fn flow(&self, tick: Ticks) -> Option<&FlowRecord> {
        let index = usize::try_from(tick).ok()?.checked_sub(1)?;
        self.flows.get(index)
    }

    /// The tick-0 state.
    pub fn initial_state(&self) -> &SimulationState {
        &self.states[0]
    }

    /// The last recorded state.
    pub fn final_state(&self) -> &SimulationState {
        &self.states[self.states.len() - 1]
    }

    /// Iterate steps in order, pairing each flow record with the state it
    /// produced.
    pub fn steps(&self) -> impl Iterator<Item = StepView<'_>> {
        self.flows
            .iter()
            .zip(self.states[1..].iter())
            .map(|(flows, state)| StepView { flows, state })
    }

    /// Stock of `stage` at every tick, starting with tick 0.
    pub fn stock_series(&self, stage: Stage) -> Vec<Fixed64> {
        self.states.iter().map(|s| s.stock(stage)).collect()
    }

    /// Forward flow out of `stage` for every step.
    pub fn forward_series(&self, stage: Stage) -> Vec<Fixed64> {
        self.flows.iter().map(|f| f.forward(stage)).collect()
    }

    /// Error flow out of `stage` for every step.
    pub fn error_series(&self, stage: Stage) -> Vec<Fixed64> {
        self.flows.iter().map(|f| f.error(stage)).collect()
    }

    /// Total forward flow out of `stage` over the whole run.
    pub fn cumulative_forward(&self, stage: Stage) -> Fixed64 {
        self.flows.iter().map(|f| f.forward(stage)).sum()
    }

    /// Total error flow out of `stage` over the whole run.
    pub fn cumulative_error(&self, stage: Stage) -> Fixed64 {
        self.flows.iter().map(|f| f.error(stage)).sum()
    }

    /// Hash of the whole history, chained state by state.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        for state in &self.states {
            h.write_u64(state.state_hash());
        }
        h.finish()
    }
}
