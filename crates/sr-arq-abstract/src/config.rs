use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Per-endpoint protocol parameters. Fixed once an engine is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArqConfig {
    /// Maximum number of sequence numbers outstanding at once.
    pub window_size: u32,
    /// Length of the stream; valid sequence numbers are `0..total_packets`.
    pub total_packets: u32,
    /// Retransmission timeout, in milliseconds.
    pub timeout_ms: u64,
    /// Delay between engine construction and the first window fill.
    pub start_delay_ms: u64,
    /// Give up on a sequence after this many retransmissions.
    /// `None` retries forever.
    pub max_retransmissions: Option<u32>,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            window_size: 4,
            total_packets: 10,
            timeout_ms: 2000,
            start_delay_ms: 1000,
            max_retransmissions: None,
        }
    }
}

impl ArqConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.total_packets == 0 {
            return Err(ConfigError::ZeroTotalPackets);
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Channel and run parameters for the discrete-event simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Virtual time (ms) at which the run is cut off.
    pub stop_at: u64,
    /// Start both endpoints instead of only the first one.
    pub duplex: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            seed: 0,
            stop_at: 30_000,
            duplex: false,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(ConfigError::InvalidLossRate(self.loss_rate));
        }
        if self.min_latency > self.max_latency {
            return Err(ConfigError::LatencyRange {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let cfg = ArqConfig::default();
        assert_eq!(cfg.window_size, 4);
        assert_eq!(cfg.total_packets, 10);
        assert_eq!(cfg.timeout(), Duration::from_secs(2));
        assert_eq!(cfg.start_delay(), Duration::from_secs(1));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_values() {
        let cfg = ArqConfig {
            window_size: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWindow));

        let cfg = ArqConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));

        let sim = SimConfig {
            min_latency: 50,
            max_latency: 10,
            ..Default::default()
        };
        assert!(matches!(
            sim.validate(),
            Err(ConfigError::LatencyRange { min: 50, max: 10 })
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: ArqConfig = toml::from_str("window_size = 8\nmax_retransmissions = 5").unwrap();
        assert_eq!(cfg.window_size, 8);
        assert_eq!(cfg.total_packets, 10);
        assert_eq!(cfg.max_retransmissions, Some(5));
    }
}
