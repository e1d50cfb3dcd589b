//! Every scenario shipped in `scenarios/` must load, validate, and run
//! cleanly.

use std::path::{Path, PathBuf};

use devflow_core::config::SimConfig;
use devflow_core::engine::run;
use devflow_core::stage::Stage;
use devflow_core::test_utils::*;
use devflow_core::validation::audit_history;
use devflow_data::loader::{find_scenario, resolve_scenario_path};
use devflow_data::ranges::check_ranges;
use devflow_data::{load_config, load_scenario};

fn scenarios_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

fn bundled(name: &str) -> SimConfig {
    let path = find_scenario(&scenarios_dir(), name)
        .unwrap()
        .unwrap_or_else(|| panic!("scenario {name} is missing"));
    load_config(&path).unwrap()
}

#[test]
fn all_bundled_scenarios_load_and_pass_audit() {
    let mut count = 0;
    for entry in std::fs::read_dir(scenarios_dir()).unwrap() {
        let path = entry.unwrap().path();
        let scenario = load_scenario(&path).unwrap();
        assert_eq!(
            path.file_stem().unwrap().to_str().unwrap(),
            scenario.name,
            "file name and scenario name differ"
        );

        let config = scenario.to_config().unwrap();
        let history = run(&config);
        assert!(audit_history(&config, &history).is_empty(), "{}", path.display());
        count += 1;
    }
    assert_eq!(count, 5);
}

#[test]
fn baseline_matches_engine_defaults() {
    let config = bundled("baseline");
    assert_eq!(config, SimConfig::default());
    assert!(check_ranges(&config).is_empty());
}

#[test]
fn high_error_settles_below_full_delivery() {
    let config = bundled("high_error");
    assert_eq!(config, baseline_config());
    let history = run(&config);
    assert_close(history.final_state().stock(Stage::LiveInProduction), 27.0, 0.01);
}

#[test]
fn no_errors_drains_in_four_steps() {
    let history = run(&bundled("no_errors"));
    assert_eq!(
        history.state(4).unwrap().stock(Stage::LiveInProduction),
        fixed(10.0)
    );
    assert_eq!(history.final_state().stock(Stage::Backlog), fixed(0.0));
}

#[test]
fn bottleneck_delivers_everything_eventually() {
    let config = bundled("bottleneck");
    assert_eq!(config, bottleneck_config(5, 12));
    let history = run(&config);
    assert_eq!(
        history.final_state().stock(Stage::LiveInProduction),
        fixed(5.0)
    );
}

#[test]
fn steady_inflow_grows_the_total() {
    let config = bundled("steady_inflow");
    let history = run(&config);
    assert_eq!(config.initial_total(), fixed(65.0));
    assert_eq!(history.final_state().total(), fixed(65.0 + 4.0 * 150.0));
    assert_within_capacity(&config, &history);
}

#[test]
fn names_resolve_without_extension() {
    let path = resolve_scenario_path(&scenarios_dir().join("high_error")).unwrap();
    assert_eq!(path.extension().unwrap(), "toml");
}
