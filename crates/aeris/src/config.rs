//! Node configuration file.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::aggregate::ForecastInterval;
use crate::error::{AerisError, Result};
use crate::params::Parameters;

/// Top-level YAML configuration.
///
/// ```yaml
/// node_name: aeris
/// short_poll_secs: 60
/// long_poll_secs: 3600
/// forecast_interval: daily
/// parameters:
///   ClientID: my-id
///   ClientSecret: my-secret
///   Location: "44.97,-93.26"
///   Units: metric
///   Forecast Days: 3
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_name: String,
    /// Host parameter mapping, values may be strings or numbers.
    pub parameters: BTreeMap<String, Value>,
    /// Interval between observation queries.
    pub short_poll_secs: u64,
    /// Interval between forecast queries.
    pub long_poll_secs: u64,
    pub forecast_interval: ForecastInterval,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "aeris".to_string(),
            parameters: BTreeMap::new(),
            short_poll_secs: 60,
            long_poll_secs: 3600,
            forecast_interval: ForecastInterval::Daily,
            base_url: "http://api.aerisapi.com".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl NodeConfig {
    pub fn params(&self) -> Parameters {
        Parameters::from_map(&self.parameters)
    }

    pub fn short_poll(&self) -> Duration {
        Duration::from_secs(self.short_poll_secs.max(1))
    }

    pub fn long_poll(&self) -> Duration {
        Duration::from_secs(self.long_poll_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load configuration from a YAML file.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AerisError::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;

    serde_yaml::from_str(&contents)
        .map_err(|e| AerisError::Parse(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load configuration from a file, or use default if the file doesn't exist.
pub fn load_config_or_default<T: DeserializeOwned + Default>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();

    if !path.exists() {
        log::info!("Config file not found, using defaults: {}", path.display());
        return Ok(T::default());
    }

    load_config(path)
}

/// Parse configuration from a YAML string.
pub fn parse_config<T: DeserializeOwned>(yaml: &str) -> Result<T> {
    Ok(serde_yaml::from_str(yaml)?)
}
