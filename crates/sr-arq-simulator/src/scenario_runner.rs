use anyhow::{Context, anyhow};
use sr_arq_abstract::{ArqConfig, SimConfig, TestAction, TestAssertion, TestScenario};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::{NodeId, Simulator};
use crate::trace::SimulationReport;

/// The endpoint that sends the stream in a scenario.
const SENDING: NodeId = NodeId::Node0;
/// The endpoint that acknowledges it.
const ACKING: NodeId = NodeId::Node1;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))
}

/// Build a simulator for `scenario` on top of the given base configuration.
pub fn build_simulator(
    scenario: &TestScenario,
    mut arq: ArqConfig,
    mut sim: SimConfig,
) -> anyhow::Result<Simulator> {
    scenario.arq.apply_to(&mut arq);
    scenario.sim.apply_to(&mut sim);

    let mut simulator = Simulator::new(arq, sim).context("Invalid scenario configuration")?;
    for action in &scenario.actions {
        match action {
            TestAction::DropData { seq } => simulator.add_drop_data_once(*seq),
            TestAction::DropAck { seq } => simulator.add_drop_ack_once(*seq),
        }
    }
    Ok(simulator)
}

pub fn run_scenario(path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run_loaded_scenario(&scenario, ArqConfig::default(), SimConfig::default())
}

pub fn run_loaded_scenario(
    scenario: &TestScenario,
    arq: ArqConfig,
    sim: SimConfig,
) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut simulator = build_simulator(scenario, arq, sim)?;
    simulator.run_until_complete();
    check_assertions(&simulator, &scenario.assertions)?;

    info!("Scenario '{}' passed", scenario.name);
    Ok(simulator.export_report())
}

fn check_range(what: &str, value: u32, min: u32, max: Option<u32>) -> anyhow::Result<()> {
    if value < min {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected min {}",
            what,
            value,
            min
        ));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected max {}",
            what,
            value,
            max
        ));
    }
    Ok(())
}

pub fn check_assertions(sim: &Simulator, assertions: &[TestAssertion]) -> anyhow::Result<()> {
    let sender = sim.engine(SENDING);
    let stats = sender.sender().stats();

    for assertion in assertions {
        match assertion {
            TestAssertion::Drained => {
                if !sender.is_drained() {
                    return Err(anyhow!(
                        "Assertion Failed: window not drained (base={}, total={})",
                        sender.sender().base(),
                        sender.sender().total_packets()
                    ));
                }
            }
            TestAssertion::MaxDuration { ms } => match sim.drained_at(SENDING) {
                Some(at) if at <= *ms => {}
                Some(at) => {
                    return Err(anyhow!(
                        "Assertion Failed: drained at {} ms, limit {} ms",
                        at,
                        ms
                    ));
                }
                None => {
                    return Err(anyhow!(
                        "Assertion Failed: never drained within {} ms",
                        ms
                    ));
                }
            },
            TestAssertion::DataTransmissions { min, max } => {
                check_range("DATA transmissions", stats.transmissions, *min, *max)?;
            }
            TestAssertion::Retransmissions { min, max } => {
                check_range("retransmissions", stats.retransmissions, *min, *max)?;
            }
            TestAssertion::AckCount { min, max } => {
                let acks = sim.engine(ACKING).receiver().stats().acks_sent;
                check_range("ACKs sent", acks, *min, *max)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(src: &str) -> TestScenario {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn passing_scenario_returns_report() {
        let s = scenario(
            r#"
            name = "lost-ack"
            [sim]
            min_latency = 2
            max_latency = 2
            [[actions]]
            type = "drop_ack"
            seq = 1
            [[assertions]]
            type = "drained"
            [[assertions]]
            type = "retransmissions"
            min = 1
            max = 1
            [[assertions]]
            type = "ack_count"
            min = 11
            max = 11
        "#,
        );
        let report = run_loaded_scenario(&s, ArqConfig::default(), SimConfig::default()).unwrap();
        let node0 = report.node(NodeId::Node0).unwrap();
        assert!(node0.engine.drained);
        assert_eq!(node0.link.sent, 11);
    }

    #[test]
    fn failing_assertion_is_reported() {
        let s = scenario(
            r#"
            name = "too-strict"
            [sim]
            min_latency = 2
            max_latency = 2
            [[actions]]
            type = "drop_data"
            seq = 0
            [[assertions]]
            type = "max_duration"
            ms = 2000
        "#,
        );
        let err = run_loaded_scenario(&s, ArqConfig::default(), SimConfig::default()).unwrap_err();
        assert!(err.to_string().contains("drained at"));
    }
}
