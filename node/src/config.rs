//! Node configuration with TOML file support.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ballot_types::{NodeId, PeerAddress};

use crate::NodeError;

/// Configuration for a ballot node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Host other nodes should dial to reach this one. The listener binds it too.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port. `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Fixed node id; derived from the node key when absent.
    #[serde(default)]
    pub node_id: Option<NodeId>,

    /// Start as the network's first node: genesis chain, self-promoted lead.
    #[serde(default)]
    pub bootstrap: bool,

    /// Peer to join on startup, as `host:port`.
    #[serde(default)]
    pub initial_peer: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Below this many connections the node dials peers it learns about.
    /// Also the fan-out `k` of the TTL formula.
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,

    #[serde(default = "default_block_period_ms")]
    pub block_period_ms: u64,

    /// How long the head may stand still before validators elect a new lead.
    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,

    /// Fraction of validators a normal node waits for before loading a block.
    #[serde(default = "default_consensus_ratio")]
    pub consensus_ratio: f64,

    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,

    #[serde(default = "default_temp_connection_idle_ms")]
    pub temp_connection_idle_ms: u64,

    #[serde(default = "default_join_retry_delay_ms")]
    pub join_retry_delay_ms: u64,

    #[serde(default = "default_max_connection_tries")]
    pub max_connection_tries: u32,

    #[serde(default = "default_chain_sync_timeout_ms")]
    pub chain_sync_timeout_ms: u64,

    /// Hex X25519 secret shared by the permissioned network. Enables the
    /// sealed bootstrap join.
    #[serde(default)]
    pub network_key: Option<String>,

    /// Elector credentials file (`{public_key, private_key}`).
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    /// Electors batch file, loaded by the lead validator.
    #[serde(default)]
    pub electors_path: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_connections() -> usize {
    8
}

fn default_min_connections() -> usize {
    3
}

fn default_block_period_ms() -> u64 {
    2_000
}

fn default_block_timeout_ms() -> u64 {
    10_000
}

fn default_consensus_ratio() -> f64 {
    0.66
}

fn default_discovery_interval_ms() -> u64 {
    3_000
}

fn default_temp_connection_idle_ms() -> u64 {
    5_000
}

fn default_join_retry_delay_ms() -> u64 {
    2_000
}

fn default_max_connection_tries() -> u32 {
    5
}

fn default_chain_sync_timeout_ms() -> u64 {
    10_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.max_connections == 0 {
            return Err(NodeError::Config("max_connections must be at least 1".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(NodeError::Config(
                "min_connections cannot exceed max_connections".into(),
            ));
        }
        if !(self.consensus_ratio > 0.0 && self.consensus_ratio <= 1.0) {
            return Err(NodeError::Config("consensus_ratio must be in (0, 1]".into()));
        }
        if self.block_period_ms == 0 || self.block_timeout_ms == 0 {
            return Err(NodeError::Config("block timings must be positive".into()));
        }
        if self.discovery_interval_ms == 0 {
            return Err(NodeError::Config("discovery_interval_ms must be positive".into()));
        }
        if let Some(peer) = &self.initial_peer {
            PeerAddress::parse(peer)
                .ok_or_else(|| NodeError::Config(format!("initial_peer is not host:port: {peer}")))?;
        }
        if let Some(key) = &self.network_key {
            ballot_crypto::HandshakeKey::from_secret_hex(key)
                .map_err(|e| NodeError::Config(format!("network_key: {e}")))?;
        }
        Ok(())
    }

    pub fn block_period(&self) -> Duration {
        Duration::from_millis(self.block_period_ms)
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn temp_connection_idle(&self) -> Duration {
        Duration::from_millis(self.temp_connection_idle_ms)
    }

    pub fn join_retry_delay(&self) -> Duration {
        Duration::from_millis(self.join_retry_delay_ms)
    }

    pub fn chain_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.chain_sync_timeout_ms)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            node_id: None,
            bootstrap: false,
            initial_peer: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            block_period_ms: default_block_period_ms(),
            block_timeout_ms: default_block_timeout_ms(),
            consensus_ratio: default_consensus_ratio(),
            discovery_interval_ms: default_discovery_interval_ms(),
            temp_connection_idle_ms: default_temp_connection_idle_ms(),
            join_retry_delay_ms: default_join_retry_delay_ms(),
            max_connection_tries: default_max_connection_tries(),
            chain_sync_timeout_ms: default_chain_sync_timeout_ms(),
            network_key: None,
            credentials_path: None,
            electors_path: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.block_period_ms, config.block_period_ms);
        assert_eq!(parsed.max_connections, config.max_connections);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.min_connections, 3);
        assert_eq!(config.block_timeout(), Duration::from_secs(10));
        assert_eq!(config.consensus_ratio, 0.66);
        assert!(!config.bootstrap);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            port = 6001
            bootstrap = true
            node_id = "alpha"
            initial_peer = "127.0.0.1:6000"
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.port, 6001);
        assert!(config.bootstrap);
        assert_eq!(config.node_id, Some(NodeId::from("alpha")));
        assert_eq!(config.log_format, "human"); // default
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(NodeConfig::from_toml_str("max_connections = 0").is_err());
        assert!(NodeConfig::from_toml_str("min_connections = 9").is_err());
        assert!(NodeConfig::from_toml_str("consensus_ratio = 1.5").is_err());
        assert!(NodeConfig::from_toml_str("initial_peer = \"nowhere\"").is_err());
        assert!(NodeConfig::from_toml_str("network_key = \"zz\"").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "block_period_ms = 250").unwrap();
        let config = NodeConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.block_period(), Duration::from_millis(250));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/ballot.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
