use serde::{Deserialize, Serialize};
use std::path::Path;
use vigil_common::duration::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// JSON file holding the rule definitions to schedule.
    #[serde(default = "default_rules_file")]
    pub rules_file: String,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Query-range endpoint of the telemetry store.
    #[serde(default = "default_query_endpoint")]
    pub endpoint: String,
    /// Per-fetch timeout; a fetch that takes longer fails the cycle.
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_query_endpoint(),
            timeout_secs: default_query_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Minimum gap between two notifications for the same firing alert.
    #[serde(default = "default_resend_delay")]
    pub resend_delay: Duration,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            resend_delay: default_resend_delay(),
        }
    }
}

/// A named notification channel. `config` is handed to the channel plugin
/// registered for `channel_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(default = "default_channel_config")]
    pub config: serde_json::Value,
}

fn default_rules_file() -> String {
    "config/rules.json".to_string()
}

fn default_query_endpoint() -> String {
    "http://localhost:8080/api/v4/query_range".to_string()
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_resend_delay() -> Duration {
    Duration::from_mins(1)
}

fn default_channel_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rules_file: default_rules_file(),
            query: QueryConfig::default(),
            alerting: AlertingConfig::default(),
            channels: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {e}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {e}", path.display()))?;
        Ok(config)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query.timeout_secs)
    }

    /// Resolves `rules_file` against the directory of the config file when
    /// it is relative.
    pub fn rules_path(&self, config_path: impl AsRef<Path>) -> std::path::PathBuf {
        let rules = Path::new(&self.rules_file);
        if rules.is_absolute() {
            return rules.to_path_buf();
        }
        match config_path.as_ref().parent() {
            Some(dir) => dir.join(rules),
            None => rules.to_path_buf(),
        }
    }
}
