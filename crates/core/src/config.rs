//! Configuration management for FieldMesh nodes.
//!
//! A node configuration file is TOML with a `[node]` section naming the
//! local identity and role, a `[mesh]` section tuning the radio mesh and an
//! optional `[logging]` section. Every mesh and logging field has a
//! default, so a file may override only what it needs.

use crate::error::{CoreError, CoreResult};
use crate::logging::LoggingSettings;
use crate::types::NodeType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest node identity that fits the 12-byte NUL-padded wire field.
pub const MAX_NODE_ID_LEN: usize = 11;

/// Complete node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local identity and role
    pub node: NodeSettings,
    /// Mesh layer tuning
    #[serde(default)]
    pub mesh: MeshSettings,
    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Local node identity and role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Human-readable node identity (at most 11 ASCII characters)
    pub node_id: String,
    /// Node role
    pub node_type: NodeType,
}

/// Mesh layer tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Radio channel (1-13)
    pub channel: u8,
    /// Interval between heartbeat broadcasts (milliseconds)
    pub heartbeat_interval_ms: u64,
    /// Interval between stale-peer eviction passes (milliseconds)
    pub eviction_interval_ms: u64,
    /// Maximum number of tracked neighbors
    pub max_peers: usize,
    /// Outbound queue depth
    pub queue_depth: usize,
    /// Retries after the first transmission attempt
    pub retry_count: u8,
    /// Delay before retrying a failed transmission (milliseconds)
    pub retry_delay_ms: u64,
    /// Time to wait for an acknowledgment (milliseconds)
    pub ack_timeout_ms: u64,
    /// Hop ceiling for relayed messages
    pub max_hops: u8,
    /// Capacity of the radio-to-loop inbound frame channel
    pub inbound_capacity: usize,
    /// Window during which a repeated (sender, sequence) is treated as a duplicate (milliseconds)
    pub dedup_window_ms: u64,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            channel: 1,
            heartbeat_interval_ms: 1_800_000,
            eviction_interval_ms: 300_000,
            max_peers: 20,
            queue_depth: 10,
            retry_count: 3,
            retry_delay_ms: 100,
            ack_timeout_ms: 1_000,
            max_hops: 5,
            inbound_capacity: 32,
            dedup_window_ms: 10_000,
        }
    }
}

impl MeshSettings {
    /// Age after which a silent peer is considered gone
    pub fn peer_timeout_ms(&self) -> u64 {
        self.heartbeat_interval_ms.saturating_mul(2)
    }

    /// Total transmissions allowed for a single message
    pub fn max_attempts(&self) -> u8 {
        self.retry_count.saturating_add(1)
    }

    /// Check ranges and non-zero requirements
    pub fn validate(&self) -> CoreResult<()> {
        if !(1..=13).contains(&self.channel) {
            return Err(CoreError::InvalidConfig(format!(
                "channel {} outside 1-13",
                self.channel
            )));
        }
        let non_zero = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("eviction_interval_ms", self.eviction_interval_ms),
            ("max_peers", self.max_peers as u64),
            ("queue_depth", self.queue_depth as u64),
            ("retry_delay_ms", self.retry_delay_ms),
            ("ack_timeout_ms", self.ack_timeout_ms),
            ("max_hops", u64::from(self.max_hops)),
            ("inbound_capacity", self.inbound_capacity as u64),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(CoreError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

impl NodeSettings {
    /// Check the identity fits the wire field and is not the broadcast wildcard
    pub fn validate(&self) -> CoreResult<()> {
        let id = self.node_id.as_str();
        if id.is_empty() || id.len() > MAX_NODE_ID_LEN {
            return Err(CoreError::InvalidConfig(format!(
                "node_id must be 1-{MAX_NODE_ID_LEN} bytes, got {}",
                id.len()
            )));
        }
        if !id.is_ascii() || id.contains('\0') || id == "*" {
            return Err(CoreError::InvalidConfig(format!(
                "node_id {id:?} is not a valid identity"
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load and validate a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML configuration text
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate both sections
    pub fn validate(&self) -> CoreResult<()> {
        self.node.validate()?;
        self.mesh.validate()?;
        self.logging.validate()
    }

    pub fn default_config() -> Self {
        Self {
            node: NodeSettings {
                node_id: "GW-001".to_string(),
                node_type: NodeType::Gateway,
            },
            mesh: MeshSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
