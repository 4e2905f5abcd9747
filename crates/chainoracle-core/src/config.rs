//! Node configuration: phase timeouts, retry budgets, chain polling and
//! signing parameters.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::phase::Phase;
use crate::retry::RetryConfig;

/// Timeout and retry budget for one phase checker.
///
/// For [`Phase::RequestEnd`] the timeout is the retention window after which
/// terminal requests are archived; its retry budget is unused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// How long a request may sit in the phase before the checker acts.
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PhaseConfig {
    pub fn new(timeout_ms: u64, max_attempts: u32) -> Self {
        Self {
            timeout_ms,
            retry: RetryConfig {
                max_attempts,
                ..RetryConfig::default()
            },
        }
    }
}

/// One [`PhaseConfig`] per checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSettings {
    #[serde(default = "default_request_received")]
    pub request_received: PhaseConfig,
    #[serde(default = "default_observation_commit")]
    pub observation_commit: PhaseConfig,
    #[serde(default = "default_report_received")]
    pub report_received: PhaseConfig,
    #[serde(default = "default_report_commit")]
    pub report_commit: PhaseConfig,
    #[serde(default = "default_transmit")]
    pub transmit: PhaseConfig,
    #[serde(default = "default_request_end")]
    pub request_end: PhaseConfig,
}

fn default_request_received() -> PhaseConfig { PhaseConfig::new(30_000, 5) }
fn default_observation_commit() -> PhaseConfig { PhaseConfig::new(30_000, 5) }
fn default_report_received() -> PhaseConfig { PhaseConfig::new(60_000, 10) }
fn default_report_commit() -> PhaseConfig { PhaseConfig::new(30_000, 20) }
fn default_transmit() -> PhaseConfig { PhaseConfig::new(60_000, 50) }
fn default_request_end() -> PhaseConfig { PhaseConfig::new(86_400_000, 1) }

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            request_received: default_request_received(),
            observation_commit: default_observation_commit(),
            report_received: default_report_received(),
            report_commit: default_report_commit(),
            transmit: default_transmit(),
            request_end: default_request_end(),
        }
    }
}

impl PhaseSettings {
    pub fn get(&self, phase: Phase) -> &PhaseConfig {
        match phase {
            Phase::RequestReceived => &self.request_received,
            Phase::ObservationCommit => &self.observation_commit,
            Phase::ReportReceived => &self.report_received,
            Phase::ReportCommit => &self.report_commit,
            Phase::Transmit => &self.transmit,
            Phase::RequestEnd => &self.request_end,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhaseConfig {
        match phase {
            Phase::RequestReceived => &mut self.request_received,
            Phase::ObservationCommit => &mut self.observation_commit,
            Phase::ReportReceived => &mut self.report_received,
            Phase::ReportCommit => &mut self.report_commit,
            Phase::Transmit => &mut self.transmit,
            Phase::RequestEnd => &mut self.request_end,
        }
    }
}

/// Indexer polling parameters for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPollConfig {
    /// Chain slug (e.g. `"ethereum"`).
    pub chain_id: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Height span queried per poll: `(cursor, cursor + page_limit]`.
    #[serde(default = "default_page_limit")]
    pub page_limit: u64,
    /// Cursor used when the chain has never been polled.
    #[serde(default)]
    pub start_height: u64,
}

fn default_poll_interval_ms() -> u64 { 2_000 }
fn default_page_limit() -> u64 { 100 }

impl ChainPollConfig {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            poll_interval_ms: default_poll_interval_ms(),
            page_limit: default_page_limit(),
            start_height: 0,
        }
    }
}

/// Threshold-signature parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Partials needed to combine a report signature (T).
    pub threshold: u32,
    /// Total participants (N).
    pub participants: u32,
    /// This node's 1-based signer index.
    pub signer_index: u32,
    /// New epochs tried after a collection timeout before the request expires.
    #[serde(default = "default_max_epoch_retries")]
    pub max_epoch_retries: u64,
    /// How long peer partials for a request this node has not seen are kept.
    #[serde(default = "default_orphan_session_ttl_ms")]
    pub orphan_session_ttl_ms: u64,
}

fn default_max_epoch_retries() -> u64 { 2 }
fn default_orphan_session_ttl_ms() -> u64 { 600_000 }

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            threshold: 1,
            participants: 1,
            signer_index: 1,
            max_epoch_retries: default_max_epoch_retries(),
            orphan_session_ttl_ms: default_orphan_session_ttl_ms(),
        }
    }
}

/// Top-level node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Checker tick period.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// A tick running longer than this is abandoned.
    #[serde(default = "default_tick_deadline_ms")]
    pub tick_deadline_ms: u64,
    /// Due requests a checker tick retries at once.
    #[serde(default = "default_checker_concurrency")]
    pub checker_concurrency: usize,
    #[serde(default)]
    pub phases: PhaseSettings,
    #[serde(default)]
    pub chains: Vec<ChainPollConfig>,
    #[serde(default)]
    pub signing: SigningConfig,
}

fn default_node_id() -> String { "node-1".into() }
fn default_tick_interval_ms() -> u64 { 1_000 }
fn default_tick_deadline_ms() -> u64 { 30_000 }
fn default_checker_concurrency() -> usize { 16 }

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            tick_interval_ms: default_tick_interval_ms(),
            tick_deadline_ms: default_tick_deadline_ms(),
            checker_concurrency: default_checker_concurrency(),
            phases: PhaseSettings::default(),
            chains: vec![],
            signing: SigningConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, OracleError> {
        serde_yaml::from_str(yaml).map_err(|e| OracleError::FatalConfig(e.to_string()))
    }

    /// Parse JSON.
    pub fn from_json_str(json: &str) -> Result<Self, OracleError> {
        serde_json::from_str(json).map_err(|e| OracleError::FatalConfig(e.to_string()))
    }

    /// Load from a `.json`, `.yaml` or `.yml` file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OracleError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| OracleError::FatalConfig(format!("{}: {e}", path.display())))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw)?,
            _ => Self::from_yaml_str(&raw)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn chain(&self, chain_id: &str) -> Option<&ChainPollConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Check startup invariants; any violation is a [`OracleError::FatalConfig`].
    pub fn validate(&self) -> Result<(), OracleError> {
        let fatal = |msg: String| Err(OracleError::FatalConfig(msg));

        if self.tick_interval_ms == 0 {
            return fatal("tick_interval_ms must be > 0".into());
        }
        if self.tick_deadline_ms == 0 {
            return fatal("tick_deadline_ms must be > 0".into());
        }
        if self.checker_concurrency == 0 {
            return fatal("checker_concurrency must be > 0".into());
        }
        if self.chains.is_empty() {
            return fatal("no chains configured".into());
        }
        let mut seen = HashSet::new();
        for chain in &self.chains {
            if chain.chain_id.is_empty() {
                return fatal("chain_id must not be empty".into());
            }
            if !seen.insert(chain.chain_id.as_str()) {
                return fatal(format!("duplicate chain configuration: {}", chain.chain_id));
            }
            if chain.poll_interval_ms == 0 {
                return fatal(format!("{}: poll_interval_ms must be > 0", chain.chain_id));
            }
            if chain.page_limit == 0 {
                return fatal(format!("{}: page_limit must be > 0", chain.chain_id));
            }
        }

        let s = &self.signing;
        if s.threshold == 0 {
            return fatal("signing.threshold must be > 0".into());
        }
        if s.threshold > s.participants {
            return fatal(format!(
                "signing.threshold {} exceeds participant count {}",
                s.threshold, s.participants
            ));
        }
        if s.signer_index == 0 || s.signer_index > s.participants {
            return fatal(format!(
                "signing.signer_index {} outside 1..={}",
                s.signer_index, s.participants
            ));
        }

        for phase in Phase::ALL {
            let cfg = self.phases.get(phase);
            if cfg.retry.max_attempts == 0 {
                return fatal(format!("{phase}: max_attempts must be > 0"));
            }
            if cfg.retry.multiplier < 1.0 {
                return fatal(format!("{phase}: backoff multiplier must be >= 1"));
            }
            if cfg.retry.max_backoff_ms < cfg.retry.initial_backoff_ms {
                return fatal(format!("{phase}: max_backoff_ms below initial_backoff_ms"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NodeConfig {
        NodeConfig {
            chains: vec![ChainPollConfig::new("ethereum")],
            signing: SigningConfig {
                threshold: 3,
                participants: 5,
                signer_index: 2,
                max_epoch_retries: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        valid().validate().unwrap();
    }

    #[test]
    fn threshold_above_participants_is_fatal() {
        let mut cfg = valid();
        cfg.signing.threshold = 6;
        assert!(cfg.validate().unwrap_err().is_fatal());
    }

    #[test]
    fn missing_chains_is_fatal() {
        let mut cfg = valid();
        cfg.chains.clear();
        assert!(matches!(cfg.validate(), Err(OracleError::FatalConfig(_))));
    }

    #[test]
    fn duplicate_chain_is_fatal() {
        let mut cfg = valid();
        cfg.chains.push(ChainPollConfig::new("ethereum"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn yaml_with_defaults() {
        let yaml = r#"
node_id: oracle-a
chains:
  - chain_id: ethereum
    page_limit: 50
  - chain_id: polygon
signing:
  threshold: 2
  participants: 3
  signer_index: 1
phases:
  transmit:
    timeout_ms: 5000
    retry:
      max_attempts: 3
      initial_backoff_ms: 1000
      multiplier: 1.5
"#;
        let cfg = NodeConfig::from_yaml_str(yaml).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.node_id, "oracle-a");
        assert_eq!(cfg.chain("ethereum").unwrap().page_limit, 50);
        assert_eq!(cfg.chain("polygon").unwrap().poll_interval_ms, 2_000);
        assert_eq!(cfg.phases.get(Phase::Transmit).retry.max_attempts, 3);
        assert_eq!(cfg.phases.get(Phase::Transmit).retry.max_backoff_ms, 60_000);
        assert_eq!(cfg.phases.get(Phase::ReportReceived).timeout_ms, 60_000);
        assert_eq!(cfg.signing.max_epoch_retries, 2);
        assert_eq!(cfg.signing.orphan_session_ttl_ms, 600_000);
        assert_eq!(cfg.checker_concurrency, 16);
    }

    #[test]
    fn zero_checker_concurrency_is_fatal() {
        let mut cfg = valid();
        cfg.checker_concurrency = 0;
        assert!(cfg.validate().unwrap_err().is_fatal());
    }
}
