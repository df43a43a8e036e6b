use std::fs;
use std::path::PathBuf;

use sr_arq_simulator::scenario_runner::run_scenario;

fn scenario_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios")
}

#[test]
fn bundled_scenarios_pass() {
    let mut ran = 0;
    for entry in fs::read_dir(scenario_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            run_scenario(&path).unwrap_or_else(|e| panic!("{}: {e:#}", path.display()));
            ran += 1;
        }
    }
    assert!(ran >= 3);
}
