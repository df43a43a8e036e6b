use crate::config::{ArqConfig, SimConfig};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arq: ArqConfigOverride,
    #[serde(default)]
    pub sim: SimConfigOverride,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ArqConfigOverride {
    pub window_size: Option<u32>,
    pub total_packets: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub start_delay_ms: Option<u64>,
    pub max_retransmissions: Option<u32>,
}

impl ArqConfigOverride {
    pub fn apply_to(&self, config: &mut ArqConfig) {
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.total_packets {
            config.total_packets = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.start_delay_ms {
            config.start_delay_ms = v;
        }
        if let Some(v) = self.max_retransmissions {
            config.max_retransmissions = Some(v);
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
    pub stop_at: Option<u64>,
    pub duplex: Option<bool>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.stop_at {
            config.stop_at = v;
        }
        if let Some(v) = self.duplex {
            config.duplex = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Drop the first DATA packet the sending endpoint emits for `seq`.
    DropData { seq: u32 },
    /// Drop the first ACK the acknowledging endpoint emits for `seq`.
    DropAck { seq: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// The sending endpoint's window reached `total_packets`.
    Drained,
    /// The window drained no later than `ms` of virtual time.
    MaxDuration { ms: u64 },
    /// Total DATA transmissions (first sends and retransmissions).
    DataTransmissions { min: u32, max: Option<u32> },
    Retransmissions { min: u32, max: Option<u32> },
    /// ACKs emitted by the acknowledging endpoint.
    AckCount { min: u32, max: Option<u32> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_actions_and_assertions() {
        let src = r#"
            name = "lost-first"
            [arq]
            window_size = 2
            [sim]
            seed = 7
            [[actions]]
            type = "drop_data"
            seq = 0
            [[assertions]]
            type = "drained"
            [[assertions]]
            type = "retransmissions"
            min = 1
        "#;
        let scenario: TestScenario = toml::from_str(src).unwrap();
        assert_eq!(scenario.arq.window_size, Some(2));
        assert!(matches!(scenario.actions[0], TestAction::DropData { seq: 0 }));
        assert!(matches!(scenario.assertions[0], TestAssertion::Drained));
        assert!(matches!(
            scenario.assertions[1],
            TestAssertion::Retransmissions { min: 1, max: None }
        ));

        let mut arq = ArqConfig::default();
        scenario.arq.apply_to(&mut arq);
        assert_eq!(arq.window_size, 2);
        assert_eq!(arq.total_packets, 10);
    }
}
