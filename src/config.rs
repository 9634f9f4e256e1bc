use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::RescueError;

pub const DEFAULT_CONFIG_FILE: &str = "ckan-rescue.json";
pub const DEFAULT_THREADS: usize = 5;
pub const DEFAULT_DCAT_DATASET_LIMIT: usize = 5;

/// On-disk shape of `ckan-rescue.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub threads: Option<usize>,
    /// `null` lifts the cap entirely; absent keeps the default.
    #[serde(default, deserialize_with = "explicit_null")]
    pub dcat_dataset_limit: Option<Option<usize>>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub output_dir: Utf8PathBuf,
    pub threads: usize,
    pub dcat_dataset_limit: Option<usize>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            output_dir: Utf8PathBuf::from("output"),
            threads: DEFAULT_THREADS,
            dcat_dataset_limit: Some(DEFAULT_DCAT_DATASET_LIMIT),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: default_user_agent(),
        }
    }
}

impl MirrorConfig {
    pub fn validate(self) -> Result<Self, RescueError> {
        if self.threads == 0 {
            return Err(RescueError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.dcat_dataset_limit == Some(0) {
            return Err(RescueError::InvalidConfig(
                "dcat_dataset_limit must be at least 1 (use null for no limit)".to_string(),
            ));
        }
        if self.output_dir.as_str().trim().is_empty() {
            return Err(RescueError::InvalidConfig(
                "output_dir must not be empty".to_string(),
            ));
        }
        Ok(self)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `ckan-rescue.json` from the working directory when it
    /// exists. Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<MirrorConfig, RescueError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RescueError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RescueError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<MirrorConfig, RescueError> {
        let defaults = MirrorConfig::default();
        MirrorConfig {
            output_dir: config
                .output_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.output_dir),
            threads: config.threads.unwrap_or(defaults.threads),
            dcat_dataset_limit: config
                .dcat_dataset_limit
                .unwrap_or(defaults.dcat_dataset_limit),
            connect_timeout: config
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            request_timeout: config
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            user_agent: config.user_agent.unwrap_or(defaults.user_agent),
        }
        .validate()
    }
}

pub fn default_user_agent() -> String {
    format!("ckan-rescue/{}", env!("CARGO_PKG_VERSION"))
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<usize>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<usize>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved, MirrorConfig::default());
        assert_eq!(resolved.threads, 5);
        assert_eq!(resolved.dcat_dataset_limit, Some(5));
    }

    #[test]
    fn null_dataset_limit_lifts_the_cap() {
        let config: Config = serde_json::from_str(r#"{"dcat_dataset_limit": null}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.dcat_dataset_limit, None);

        let config: Config = serde_json::from_str(r#"{"threads": 2}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.dcat_dataset_limit, Some(DEFAULT_DCAT_DATASET_LIMIT));
        assert_eq!(resolved.threads, 2);
    }
}
