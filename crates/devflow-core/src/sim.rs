//! Per-step simulation values: stock snapshots, flow records, and the state
//! hash used for determinism checks.

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::fixed::{Fixed64, Ticks};
use crate::stage::{Stage, StageMap};

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Stock level of every stage at one tick.
///
/// Produced by the engine and never mutated once it is recorded in a
/// [`History`](crate::history::History).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Tick this snapshot belongs to. Tick 0 is the initial state.
    pub tick: Ticks,

    /// Tickets resident in each stage.
    pub stocks: StageMap<Fixed64>,
}

impl SimulationState {
    /// The tick-0 state described by `config`.
    pub fn initial(config: &SimConfig) -> Self {
        Self {
            tick: 0,
            stocks: *config.initial_stocks(),
        }
    }

    /// Tickets resident in `stage`.
    #[inline]
    pub fn stock(&self, stage: Stage) -> Fixed64 {
        self.stocks[stage]
    }

    /// Sum of every stock.
    pub fn total(&self) -> Fixed64 {
        self.stocks.values().copied().sum()
    }

    /// Deterministic hash of this snapshot.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.tick);
        for stock in self.stocks.values() {
            h.write_fixed64(*stock);
        }
        h.finish()
    }
}

// ---------------------------------------------------------------------------
// Flow record
// ---------------------------------------------------------------------------

/// Realized (post-clamp) flow volumes for one step.
///
/// `forward[s]` is what left `s` for its forward target and `error[s]` is
/// what left `s` for its error target. Entries for stages without the
/// corresponding target are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Tick reached by the step that produced this record.
    pub tick: Ticks,

    pub forward: StageMap<Fixed64>,

    pub error: StageMap<Fixed64>,

    /// New tickets added to Backlog from outside the pipeline.
    pub arrivals: Fixed64,
}

impl FlowRecord {
    /// A record with every flow at zero.
    pub fn empty(tick: Ticks) -> Self {
        Self {
            tick,
            forward: StageMap::splat(Fixed64::ZERO),
            error: StageMap::splat(Fixed64::ZERO),
            arrivals: Fixed64::ZERO,
        }
    }

    /// Forward flow out of `stage`.
    #[inline]
    pub fn forward(&self, stage: Stage) -> Fixed64 {
        self.forward[stage]
    }

    /// Error flow out of `stage`.
    #[inline]
    pub fn error(&self, stage: Stage) -> Fixed64 {
        self.error[stage]
    }

    /// Everything that left `stage` during the step.
    pub fn outflow(&self, stage: Stage) -> Fixed64 {
        self.forward[stage] + self.error[stage]
    }

    /// Everything that entered `stage` during the step, arrivals included.
    pub fn inflow(&self, stage: Stage) -> Fixed64 {
        let mut total = if stage == Stage::Backlog {
            self.arrivals
        } else {
            Fixed64::ZERO
        };
        for source in Stage::ALL {
            if source.forward_target() == Some(stage) {
                total += self.forward[source];
            }
            if source.error_target() == Some(stage) {
                total += self.error[source];
            }
        }
        total
    }

    /// Apply this record to `state`, producing the next state.
    ///
    /// The engine builds its next state the same way, so replaying a
    /// History's flow records over its first state reproduces every later
    /// state exactly.
    pub fn apply_to(&self, state: &SimulationState) -> SimulationState {
        let stocks = state.stocks.map(|stage, stock| {
            stock
                .saturating_sub(self.outflow(stage))
                .saturating_add(self.inflow(stage))
                .max(Fixed64::ZERO)
        });
        SimulationState {
            tick: self.tick,
            stocks,
        }
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for divergence checks.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Start a new hash.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    /// Feed a u64 into the hash.
    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a Fixed64 into the hash.
    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
