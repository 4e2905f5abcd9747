//! On-disk config: the node's [`NodeConfig`] plus a `log` section.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use chainoracle_core::NodeConfig;
use chainoracle_observability::LogConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub node: NodeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl CliConfig {
    /// Load a `.json`, `.yaml` or `.yml` file. The node section is validated.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file '{}'", path.display()))?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw).context("parse JSON config")?,
            _ => serde_yaml::from_str(&raw).context("parse YAML config")?,
        };
        config.node.validate()?;
        Ok(config)
    }
}
