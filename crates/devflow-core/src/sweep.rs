//! Batch runs over independent configurations.
//!
//! Runs share nothing, so with the `parallel` feature they are spread over
//! the rayon thread pool. Output order always matches input order and every
//! History is identical to what [`run`] produces for the same configuration.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SimConfig;
use crate::engine::run;
use crate::history::History;

/// Run every configuration and return the histories in input order.
pub fn run_batch(configs: &[SimConfig]) -> Vec<History> {
    tracing::debug!(runs = configs.len(), "running simulation batch");

    #[cfg(feature = "parallel")]
    let histories = configs.par_iter().map(run).collect();

    #[cfg(not(feature = "parallel"))]
    let histories = configs.iter().map(run).collect();

    histories
}

/// Run one simulation per value, with `apply` deriving each configuration.
///
/// Values whose configuration fails to build are reported in place, so the
/// output lines up with `values`.
pub fn sweep<T, E>(
    values: &[T],
    apply: impl FnMut(&T) -> Result<SimConfig, E>,
) -> Vec<Result<History, E>> {
    let outcomes: Vec<Result<SimConfig, E>> = values.iter().map(apply).collect();
    let configs: Vec<SimConfig> = outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().ok().cloned())
        .collect();

    let mut histories = run_batch(&configs).into_iter();
    outcomes
        .into_iter()
        .map(|outcome| outcome.map(|config| histories.next().unwrap_or_else(|| run(&config))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::fixed::Fixed64;
    use crate::stage::Stage;
    use crate::test_utils::*;

    #[test]
    fn batch_matches_individual_runs() {
        let configs = vec![
            baseline_config(),
            error_free_config(10, 5),
            bottleneck_config(5, 20),
        ];
        let histories = run_batch(&configs);
        assert_eq!(histories.len(), 3);
        for (config, history) in configs.iter().zip(&histories) {
            assert_eq!(*history, run(config));
        }
    }

    #[test]
    fn empty_batch_is_empty() {
        assert!(run_batch(&[]).is_empty());
    }

    #[test]
    fn sweep_keeps_failures_in_place() {
        let rates = [0.0, 0.25, 1.5, 0.5];
        let results = sweep(&rates, |&rate| {
            SimConfig::builder()
                .error_rate(Stage::InTesting, rate)
                .duration(10)
                .build()
        });

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(ConfigError::OutOfRangeRate { .. })
        ));
        assert_eq!(results[3].as_ref().unwrap().duration(), 10);
    }

    #[test]
    fn higher_testing_error_delivers_less() {
        let rates = [0.0, 0.25, 0.5];
        let results = sweep(&rates, |&rate| {
            SimConfig::builder()
                .all_error_rates(0.0)
                .error_rate(Stage::InTesting, rate)
                .duration(20)
                .build()
        });
        let delivered: Vec<Fixed64> = results
            .iter()
            .map(|r| r.as_ref().unwrap().final_state().stock(Stage::LiveInProduction))
            .collect();
        assert!(delivered[0] > delivered[1]);
        assert!(delivered[1] > delivered[2]);
    }
}
