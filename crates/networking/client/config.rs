use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error deserializing config from env: {0}")]
    ConfigDeserializationError(#[from] envy::Error),
}

/// Connection tuning for one [`crate::NodeConnection`].
///
/// All timeouts are hard: an open or submission that overruns errors out, it
/// is never retried here.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeClientConfig {
    pub node_url: String,
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_idle_grace_ms")]
    pub idle_grace_ms: u64,
}

fn default_open_timeout_ms() -> u64 {
    5_000
}

fn default_submit_timeout_ms() -> u64 {
    5_000
}

fn default_keepalive_interval_ms() -> u64 {
    10_000
}

fn default_idle_grace_ms() -> u64 {
    5_000
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self::new("ws://127.0.0.1:8080/rpc")
    }
}

impl NodeClientConfig {
    pub fn new(node_url: impl Into<String>) -> Self {
        Self {
            node_url: node_url.into(),
            open_timeout_ms: default_open_timeout_ms(),
            submit_timeout_ms: default_submit_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            idle_grace_ms: default_idle_grace_ms(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        envy::prefixed("HADRON_NODE_")
            .from_env::<Self>()
            .map_err(ConfigError::from)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_millis(self.idle_grace_ms)
    }
}
