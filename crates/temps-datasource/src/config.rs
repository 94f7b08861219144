//! Manager settings and the declarative sources file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::data_source::{DataSource, DataSourceConfig};
use crate::error::{DataSourceError, Result};
use crate::freshness::DEFAULT_MAX_TIME_CHECK_INTERVAL;

/// Whether sources present in the cluster but not configured are picked up
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum SourceListScan {
    #[default]
    Auto,
    Disable,
}

impl FromStr for SourceListScan {
    type Err = DataSourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(SourceListScan::Auto),
            "disable" => Ok(SourceListScan::Disable),
            other => Err(DataSourceError::configuration(format!(
                "sourceListScan must be disabled or auto is ('{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for SourceListScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceListScan::Auto => write!(f, "auto"),
            SourceListScan::Disable => write!(f, "disable"),
        }
    }
}

impl Serialize for SourceListScan {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SourceListScan {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Settings of the data source manager
/// All fields have defaults so an empty document is valid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    pub source_list_scan: SourceListScan,
    /// Periodic cluster discovery; absent means discovery only runs on demand
    pub source_list_refresh_interval_ms: Option<u64>,
    /// Run a discovery pass on every listing call
    pub source_list_refresh_on_load: bool,
    pub max_time_check_interval_ms: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            source_list_scan: SourceListScan::Auto,
            source_list_refresh_interval_ms: None,
            source_list_refresh_on_load: false,
            max_time_check_interval_ms: DEFAULT_MAX_TIME_CHECK_INTERVAL.as_millis() as u64,
        }
    }
}

impl ManagerSettings {
    pub fn source_list_refresh_interval(&self) -> Option<Duration> {
        self.source_list_refresh_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn max_time_check_interval(&self) -> Duration {
        Duration::from_millis(self.max_time_check_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_time_check_interval_ms == 0 {
            return Err(DataSourceError::configuration(
                "max_time_check_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Declarative sources file: manager settings plus statically configured sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default, flatten)]
    pub settings: ManagerSettings,
    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,
}

impl SourcesConfig {
    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            DataSourceError::configuration(format!("could not read '{}': {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            _ => Err(DataSourceError::configuration(format!(
                "unsupported config format: '{}'",
                path.display()
            ))),
        }
    }

    /// Serialize configuration to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Build the configured data sources, failing on the first invalid one
    pub fn data_sources(&self) -> Result<Vec<DataSource>> {
        self.data_sources
            .iter()
            .cloned()
            .map(DataSource::from_config)
            .collect()
    }
}
