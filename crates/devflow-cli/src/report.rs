//! Run reports: a serializable view of a History plus its summary, rendered
//! as a text table or JSON.

use devflow_core::fixed::{Fixed64, Ticks, fixed64_to_f64};
use devflow_core::history::History;
use devflow_core::stage::Stage;
use devflow_stats::{PipelineStats, Volume, steady_state_tick};
use serde::Serialize;

/// Time series for one stage, converted to `f64` for output.
///
/// `stock` has one entry per state (tick 0 through the end); `forward` and
/// `error` have one entry per step (tick 1 through the end).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSeries {
    pub stage: &'static str,
    pub stock: Vec<f64>,
    pub forward: Vec<f64>,
    pub error: Vec<f64>,
}

/// End-of-run figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub final_stocks: Vec<(&'static str, f64)>,
    pub total_delivered: f64,
    pub total_reopened: f64,
    pub rework_ratio: f64,
    pub delivery_rate: f64,
    pub equilibrium_tick: Option<Ticks>,
}

/// Everything the CLI prints about one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryReport {
    pub scenario: String,
    pub duration: Ticks,
    pub stages: Vec<StageSeries>,
    pub summary: Summary,
}

fn volume_to_f64(v: Volume) -> f64 {
    v.to_num::<f64>()
}

impl HistoryReport {
    pub fn new(
        scenario: impl Into<String>,
        history: &History,
        stats: &PipelineStats,
        tolerance: Fixed64,
    ) -> Self {
        let to_f64 = |series: Vec<Fixed64>| series.into_iter().map(fixed64_to_f64).collect();
        let stages = Stage::ALL
            .into_iter()
            .map(|stage| StageSeries {
                stage: stage.key(),
                stock: to_f64(history.stock_series(stage)),
                forward: to_f64(history.forward_series(stage)),
                error: to_f64(history.error_series(stage)),
            })
            .collect();

        let final_state = history.final_state();
        let summary = Summary {
            final_stocks: Stage::ALL
                .into_iter()
                .map(|stage| (stage.key(), fixed64_to_f64(final_state.stock(stage))))
                .collect(),
            total_delivered: volume_to_f64(stats.total_delivered()),
            total_reopened: volume_to_f64(stats.total_reopened()),
            rework_ratio: fixed64_to_f64(stats.rework_ratio()),
            delivery_rate: fixed64_to_f64(stats.delivery_rate()),
            equilibrium_tick: steady_state_tick(history, tolerance),
        };

        Self {
            scenario: scenario.into(),
            duration: history.duration(),
            stages,
            summary,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Stock per stage at tick 0, every `stride` ticks, and the final tick,
    /// plus the flow delivered into production during that step.
    pub fn render_table(&self, stride: Ticks) -> String {
        let mut out = format!("{:>6}", "tick");
        for series in &self.stages {
            out.push_str(&format!(" {:>18}", series.stage));
        }
        out.push_str(&format!(" {:>10}\n", "delivered"));

        let delivered = self
            .stages
            .iter()
            .find(|s| s.stage == Stage::AwaitingRelease.key());

        for tick in sampled_ticks(self.duration, stride) {
            let i = tick as usize;
            out.push_str(&format!("{tick:>6}"));
            for series in &self.stages {
                let stock = series.stock.get(i).copied().unwrap_or(0.0);
                out.push_str(&format!(" {stock:>18.2}"));
            }
            let step_delivered = match (tick, delivered) {
                (0, _) | (_, None) => 0.0,
                (_, Some(series)) => series.forward.get(i - 1).copied().unwrap_or(0.0),
            };
            out.push_str(&format!(" {step_delivered:>10.2}\n"));
        }
        out
    }

    /// One-line description of where the run ended.
    pub fn summary_line(&self) -> String {
        let stocks: Vec<String> = self
            .summary
            .final_stocks
            .iter()
            .map(|(key, value)| format!("{key}={value:.2}"))
            .collect();
        let equilibrium = match self.summary.equilibrium_tick {
            Some(tick) => format!("equilibrium from tick {tick}"),
            None => format!("no equilibrium within {} ticks", self.duration),
        };
        format!(
            "{}: final stocks [{}], delivered {:.2}, {}",
            self.scenario,
            stocks.join(" "),
            self.summary.total_delivered,
            equilibrium
        )
    }
}

/// Tick 0, every multiple of `stride` up to `duration`, and `duration`
/// itself. A stride of 0 is treated as 1.
pub fn sampled_ticks(duration: Ticks, stride: Ticks) -> Vec<Ticks> {
    let stride = stride.max(1);
    let mut ticks: Vec<Ticks> = (0..=duration).step_by(stride as usize).collect();
    if ticks.last() != Some(&duration) {
        ticks.push(duration);
    }
    ticks
}
