use anyhow::Context;
use serde::Deserialize;
use sr_arq_abstract::{ArqConfig, SimConfig};
use std::fs;
use std::path::Path;

/// Contents of a `--config` file. Both sections are optional.
///
/// ```toml
/// [arq]
/// window_size = 8
/// timeout_ms = 500
///
/// [sim]
/// loss_rate = 0.1
/// seed = 7
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub arq: ArqConfig,
    pub sim: SimConfig,
}

impl FileConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}
