//! Pipeline statistics for the devflow simulator.
//!
//! Turns the per-step [`FlowRecord`]s of a run into rolling metrics:
//! throughput per stage, rework volume, the share of moved work that is
//! rework, and cumulative deliveries. Also detects when a run has reached
//! equilibrium, which the engine itself never does.
//!
//! # Usage
//!
//! ```ignore
//! let mut stats = PipelineStats::new(StatsConfig::default());
//! // Feed one record per step:
//! while let Some(flows) = engine.step() {
//!     stats.record(flows);
//! }
//! // Query metrics:
//! let rate = stats.throughput(Stage::AwaitingRelease);
//! ```

use std::collections::VecDeque;

use devflow_core::fixed::{Fixed64, Ticks};
use devflow_core::history::History;
use devflow_core::sim::FlowRecord;
use devflow_core::stage::{Stage, StageMap};
use fixed::types::I64F64;
use serde::{Deserialize, Serialize};

/// Wide accumulator for sums of many per-step volumes. A single step never
/// exceeds the `Fixed64` range, but a window or a whole run can.
pub type Volume = I64F64;

#[inline]
fn widen(v: Fixed64) -> Volume {
    Volume::from_num(v)
}

#[inline]
fn narrow(v: Volume) -> Fixed64 {
    v.saturating_to_num::<Fixed64>()
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the statistics module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Window size in steps for rolling averages.
    pub window_size: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Rolling window
// ---------------------------------------------------------------------------

/// A rolling sum of a per-step volume over the most recent N steps.
///
/// # Step lifecycle
///
/// 1. Call [`add`](Self::add) zero or more times during the step.
/// 2. Call [`commit`](Self::commit) exactly once at end-of-step to write the
///    current step into the window and prepare for the next one.
///
/// [`rate`](Self::rate) and [`total`](Self::total) include the committed steps
/// **plus** any in-progress volume, so queries are accurate at any point.
///
/// Storage grows with the steps actually committed, so a window longer than
/// the run costs no more than the run itself.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    window_size: usize,
    /// Committed per-step volumes, oldest first, at most `window_size`.
    step_volumes: VecDeque<Volume>,
    /// Running total of committed volumes in the window.
    committed_total: Volume,
    /// Accumulator for the current (uncommitted) step.
    current: Volume,
}

impl RollingWindow {
    /// Create a window over `window_size` steps (at least one).
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            step_volumes: VecDeque::new(),
            committed_total: Volume::ZERO,
            current: Volume::ZERO,
        }
    }

    /// Number of steps the window spans.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Accumulate volume for the current (in-progress) step.
    pub fn add(&mut self, volume: Fixed64) {
        self.current += widen(volume);
    }

    /// Commit the current step and prepare for the next.
    ///
    /// If the window is full, the oldest step is evicted.
    pub fn commit(&mut self) {
        if self.step_volumes.len() == self.window_size {
            if let Some(oldest) = self.step_volumes.pop_front() {
                self.committed_total -= oldest;
            }
        }
        self.step_volumes.push_back(self.current);
        self.committed_total += self.current;
        self.current = Volume::ZERO;
    }

    /// Total over the window (committed steps + current in-progress step).
    pub fn total(&self) -> Volume {
        self.committed_total + self.current
    }

    /// Average volume per step over the window.
    ///
    /// Divides by the number of contributing steps, counting the current step
    /// only once something has been added to it.
    pub fn rate(&self) -> Fixed64 {
        let committed = self.step_volumes.len();
        let effective_count = if self.current > Volume::ZERO {
            committed + 1
        } else {
            committed
        };
        if effective_count == 0 {
            return Fixed64::ZERO;
        }
        narrow(self.total() / Volume::from_num(effective_count))
    }

    /// Drop every committed and in-progress volume.
    pub fn clear(&mut self) {
        self.step_volumes.clear();
        self.committed_total = Volume::ZERO;
        self.current = Volume::ZERO;
    }
}

// ---------------------------------------------------------------------------
// Pipeline statistics
// ---------------------------------------------------------------------------

/// Rolling and cumulative flow metrics for one run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    config: StatsConfig,
    forward: StageMap<RollingWindow>,
    error: StageMap<RollingWindow>,
    arrivals: RollingWindow,
    total_delivered: Volume,
    total_reopened: Volume,
    total_rework: Volume,
    steps_recorded: u64,
    last_tick: Option<Ticks>,
}

impl PipelineStats {
    pub fn new(config: StatsConfig) -> Self {
        let window = config.window_size;
        Self {
            forward: StageMap::from_fn(|_| RollingWindow::new(window)),
            error: StageMap::from_fn(|_| RollingWindow::new(window)),
            arrivals: RollingWindow::new(window),
            total_delivered: Volume::ZERO,
            total_reopened: Volume::ZERO,
            total_rework: Volume::ZERO,
            steps_recorded: 0,
            last_tick: None,
            config,
        }
    }

    /// Feed every step of `history` in order.
    pub fn from_history(history: &History, config: StatsConfig) -> Self {
        let mut stats = Self::new(config);
        for flows in history.flows() {
            stats.record(flows);
        }
        tracing::debug!(
            steps = stats.steps_recorded,
            window = stats.config.window_size,
            "computed pipeline statistics"
        );
        stats
    }

    /// Account for one step's flows.
    pub fn record(&mut self, flows: &FlowRecord) {
        for stage in Stage::ALL {
            let forward = flows.forward(stage);
            let error = flows.error(stage);
            self.forward[stage].add(forward);
            self.error[stage].add(error);
            self.total_rework += widen(error);
        }
        self.arrivals.add(flows.arrivals);
        self.total_delivered += widen(flows.forward(Stage::AwaitingRelease));
        self.total_reopened += widen(flows.error(Stage::LiveInProduction));

        for window in self.forward.values_mut().chain(self.error.values_mut()) {
            window.commit();
        }
        self.arrivals.commit();

        self.steps_recorded += 1;
        self.last_tick = Some(flows.tick);
    }

    /// The configuration these statistics were built with.
    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Rolling forward flow out of `stage`, per step.
    pub fn throughput(&self, stage: Stage) -> Fixed64 {
        self.forward[stage].rate()
    }

    /// Rolling error flow out of `stage`, per step.
    pub fn rework_rate(&self, stage: Stage) -> Fixed64 {
        self.error[stage].rate()
    }

    /// Rolling flow into Live in Production, per step.
    pub fn delivery_rate(&self) -> Fixed64 {
        self.throughput(Stage::AwaitingRelease)
    }

    /// Rolling external arrivals, per step.
    pub fn arrival_rate(&self) -> Fixed64 {
        self.arrivals.rate()
    }

    /// Share of the work moved within the window that was rework, in
    /// `[0, 1]`. Zero when nothing moved.
    pub fn rework_ratio(&self) -> Fixed64 {
        let rework: Volume = self.error.values().map(RollingWindow::total).sum();
        let forward: Volume = self.forward.values().map(RollingWindow::total).sum();
        let moved = rework + forward;
        if moved == Volume::ZERO {
            return Fixed64::ZERO;
        }
        narrow(rework / moved)
    }

    /// Cumulative flow into Live in Production.
    pub fn total_delivered(&self) -> Volume {
        self.total_delivered
    }

    /// Cumulative tickets reopened from production.
    pub fn total_reopened(&self) -> Volume {
        self.total_reopened
    }

    /// Cumulative error flow out of every stage.
    pub fn total_rework(&self) -> Volume {
        self.total_rework
    }

    /// Number of steps fed so far.
    pub fn steps_recorded(&self) -> u64 {
        self.steps_recorded
    }

    /// Tick of the most recent record.
    pub fn last_tick(&self) -> Option<Ticks> {
        self.last_tick
    }

    /// Forget everything recorded, keeping the configuration.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

// ---------------------------------------------------------------------------
// Equilibrium detection
// ---------------------------------------------------------------------------

/// The first tick after which every flow stays within `tolerance` of its
/// previous value through the end of `history`.
///
/// Returns `None` when the last step still moved some flow by more than
/// `tolerance`, or when the history is too short to tell (fewer than two
/// steps).
pub fn steady_state_tick(history: &History, tolerance: Fixed64) -> Option<Ticks> {
    let flows = history.flows();
    if flows.len() < 2 {
        return None;
    }

    let changed = |prev: &FlowRecord, next: &FlowRecord| {
        Stage::ALL.into_iter().any(|stage| {
            (next.forward(stage) - prev.forward(stage)).abs() > tolerance
                || (next.error(stage) - prev.error(stage)).abs() > tolerance
        })
    };

    let last_change = flows
        .windows(2)
        .rposition(|pair| changed(&pair[0], &pair[1]))
        .map_or(0, |i| i + 1);

    if last_change == flows.len() - 1 {
        return None;
    }
    Some(flows[last_change].tick)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_core::config::SimConfig;
    use devflow_core::engine::{Engine, run};
    use devflow_core::test_utils::*;

    fn small_config() -> StatsConfig {
        StatsConfig { window_size: 4 }
    }

    fn volume(v: f64) -> Volume {
        Volume::from_num(v)
    }

    // -----------------------------------------------------------------------
    // RollingWindow
    // -----------------------------------------------------------------------

    #[test]
    fn rolling_window_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.add(fixed(v));
            window.commit();
        }
        // Holds 2, 3, 4.
        assert_eq!(window.total(), volume(9.0));
        assert_eq!(window.rate(), fixed(3.0));
    }

    #[test]
    fn rolling_window_counts_in_progress_step() {
        let mut window = RollingWindow::new(4);
        window.add(fixed(2.0));
        window.commit();
        assert_eq!(window.rate(), fixed(2.0));

        window.add(fixed(4.0));
        assert_eq!(window.total(), volume(6.0));
        assert_eq!(window.rate(), fixed(3.0));
    }

    #[test]
    fn rolling_window_empty_rate_is_zero() {
        let mut window = RollingWindow::new(0);
        assert_eq!(window.window_size(), 1);
        assert_eq!(window.rate(), Fixed64::ZERO);
        window.add(fixed(5.0));
        window.commit();
        window.clear();
        assert_eq!(window.total(), Volume::ZERO);
    }

    #[test]
    fn rolling_window_of_unbounded_size_allocates_lazily() {
        let mut window = RollingWindow::new(usize::MAX);
        for v in [2.0, 4.0] {
            window.add(fixed(v));
            window.commit();
        }
        assert_eq!(window.window_size(), usize::MAX);
        assert_eq!(window.rate(), fixed(3.0));
    }

    #[test]
    fn rolling_window_sums_beyond_fixed64_range() {
        let mut window = RollingWindow::new(8);
        for _ in 0..8 {
            window.add(fixed(1.0e9));
            window.commit();
        }
        assert_eq!(window.total(), volume(8.0e9));
        assert_eq!(window.rate(), fixed(1.0e9));
    }

    // -----------------------------------------------------------------------
    // PipelineStats
    // -----------------------------------------------------------------------

    #[test]
    fn error_free_run_delivers_everything() {
        let history = run(&error_free_config(10, 8));
        let stats = PipelineStats::from_history(&history, small_config());

        assert_eq!(stats.total_delivered(), volume(10.0));
        assert_eq!(stats.total_rework(), Volume::ZERO);
        assert_eq!(stats.rework_ratio(), Fixed64::ZERO);
        assert_eq!(stats.steps_recorded(), 8);
        assert_eq!(stats.last_tick(), Some(8));
    }

    #[test]
    fn throughput_averages_over_window() {
        // Backlog drains at 10 per step for the first 10 steps.
        let history = run(&uniform_config(100, 10.0, 200, 0.0, 8));
        let stats = PipelineStats::from_history(&history, small_config());
        assert_eq!(stats.throughput(Stage::Backlog), fixed(10.0));
        assert_eq!(stats.throughput(Stage::LiveInProduction), Fixed64::ZERO);
        assert_eq!(stats.delivery_rate(), fixed(10.0));
    }

    #[test]
    fn window_longer_than_run_averages_whole_run() {
        let history = run(&uniform_config(100, 10.0, 200, 0.0, 8));
        let mut stats = PipelineStats::new(StatsConfig {
            window_size: usize::MAX,
        });
        for flows in history.flows() {
            stats.record(flows);
        }
        assert_eq!(stats.throughput(Stage::Backlog), fixed(10.0));
        // Nothing is delivered until step 4, then 10 per step.
        assert_eq!(stats.delivery_rate(), fixed(6.25));
    }

    #[test]
    fn rework_shows_up_in_ratio() {
        let history = run(&baseline_config());
        let stats = PipelineStats::from_history(&history, StatsConfig::default());

        let ratio = stats.rework_ratio();
        assert!(ratio > Fixed64::ZERO && ratio < Fixed64::ONE);
        assert!(stats.rework_rate(Stage::LiveInProduction) > Fixed64::ZERO);
        assert!(stats.total_reopened() > Volume::ZERO);
        assert!(stats.total_rework() >= stats.total_reopened());
    }

    #[test]
    fn record_matches_from_history() {
        let config = baseline_config();
        let mut engine = Engine::new(config.clone());
        let mut live = PipelineStats::new(small_config());
        while let Some(flows) = engine.step() {
            live.record(flows);
        }
        let replayed = PipelineStats::from_history(engine.history(), small_config());

        assert_eq!(live.total_delivered(), replayed.total_delivered());
        assert_eq!(live.rework_ratio(), replayed.rework_ratio());
        assert_eq!(live.delivery_rate(), replayed.delivery_rate());
    }

    #[test]
    fn arrivals_are_tracked() {
        let config = SimConfig::builder()
            .arrival_rate(2.5)
            .duration(6)
            .build()
            .unwrap();
        let stats = PipelineStats::from_history(&run(&config), small_config());
        assert_eq!(stats.arrival_rate(), fixed(2.5));
    }

    #[test]
    fn reset_clears_counters() {
        let mut stats = PipelineStats::from_history(&run(&baseline_config()), small_config());
        stats.reset();
        assert_eq!(stats.steps_recorded(), 0);
        assert_eq!(stats.total_delivered(), Volume::ZERO);
        assert_eq!(stats.delivery_rate(), Fixed64::ZERO);
        assert_eq!(stats.config().window_size, 4);
    }

    // -----------------------------------------------------------------------
    // Equilibrium
    // -----------------------------------------------------------------------

    #[test]
    fn drained_pipeline_is_steady_after_last_delivery() {
        // Flows change every step until the last delivery at step 5, then
        // stay at zero.
        let history = run(&error_free_config(10, 10));
        assert_eq!(steady_state_tick(&history, fixed(0.001)), Some(5));
    }

    #[test]
    fn still_draining_is_not_steady() {
        let history = run(&error_free_config(10, 5));
        assert_eq!(steady_state_tick(&history, fixed(0.001)), None);
    }

    #[test]
    fn rework_loop_reaches_equilibrium() {
        let history = run(&baseline_config());
        let tick = steady_state_tick(&history, fixed(0.01)).unwrap();
        assert!(tick > 4 && tick < 50, "steady at {tick}");
    }

    #[test]
    fn short_history_is_inconclusive() {
        let history = run(&error_free_config(10, 1));
        assert_eq!(steady_state_tick(&history, fixed(1.0)), None);
    }
}
