//! Engine and storage configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::Refresh;
use crate::error::MappingError;
use crate::index::{DEFAULT_INDEX_PREFIX, FsMappingSource, MappingSet};
use crate::migration::RetryPolicy;

/// Authentication configuration for Elasticsearch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElasticsearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for the Elasticsearch-backed storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Elasticsearch node URLs (e.g., `["http://localhost:9200"]`).
    /// Currently uses the first node (single-node connection pool).
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    /// Index and alias name prefix (default: `"grafeas"`).
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,

    /// Refresh policy for document writes (default: `true`).
    #[serde(default)]
    pub refresh: Refresh,

    /// Keep-alive of point-in-time snapshots backing paginated lists (default: `"5m"`).
    #[serde(default = "default_pit_keep_alive")]
    pub pit_keep_alive: String,

    /// Largest page returned by a single list request (default: 1000).
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Directory with `projects.json`, `occurrences.json` and `notes.json`.
    /// The embedded mappings are used when unset.
    #[serde(default)]
    pub mappings_dir: Option<PathBuf>,

    /// Migration polling settings.
    #[serde(default)]
    pub migration: MigrationConfig,
}

fn default_nodes() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_index_prefix() -> String {
    DEFAULT_INDEX_PREFIX.to_string()
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_pit_keep_alive() -> String {
    "5m".to_string()
}

fn default_max_page_size() -> u32 {
    1000
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            index_prefix: default_index_prefix(),
            auth: None,
            request_timeout_ms: default_request_timeout_ms(),
            disable_certificate_validation: false,
            refresh: Refresh::default(),
            pit_keep_alive: default_pit_keep_alive(),
            max_page_size: default_max_page_size(),
            mappings_dir: None,
            migration: MigrationConfig::default(),
        }
    }
}

impl ElasticsearchConfig {
    /// Returns every configuration problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.nodes.is_empty() {
            errors.push("at least one node URL is required".to_string());
        }
        if self.index_prefix.is_empty() {
            errors.push("index_prefix must not be empty".to_string());
        } else if self.index_prefix.chars().any(char::is_uppercase) {
            errors.push(format!(
                "index_prefix must be lowercase, got '{}'",
                self.index_prefix
            ));
        }
        if self.request_timeout_ms == 0 {
            errors.push("request_timeout_ms must be greater than 0".to_string());
        }
        if let Err(e) = humantime::parse_duration(&self.pit_keep_alive) {
            errors.push(format!(
                "pit_keep_alive '{}' is not a duration: {}",
                self.pit_keep_alive, e
            ));
        }
        if self.max_page_size == 0 {
            errors.push("max_page_size must be greater than 0".to_string());
        }
        if self.migration.max_poll_attempts == 0 {
            errors.push("migration.max_poll_attempts must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Loads the mapping set from `mappings_dir`, or the embedded one.
    pub fn load_mappings(&self) -> Result<MappingSet, MappingError> {
        match &self.mappings_dir {
            Some(dir) => MappingSet::load(&FsMappingSource, dir),
            None => MappingSet::embedded(),
        }
    }
}

/// Polling settings for reindex tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Maximum number of task status polls (default: 10).
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Delay between polls (default: 10s).
    #[serde(with = "humantime_serde", default = "default_poll_delay")]
    pub poll_delay: Duration,
}

fn default_max_poll_attempts() -> u32 {
    10
}

fn default_poll_delay() -> Duration {
    Duration::from_secs(10)
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: default_max_poll_attempts(),
            poll_delay: default_poll_delay(),
        }
    }
}

impl MigrationConfig {
    /// Returns the retry policy for reindex polling.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_poll_attempts, self.poll_delay)
    }
}

/// Serde module for Duration with humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: ElasticsearchConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.nodes, vec!["http://localhost:9200".to_string()]);
        assert_eq!(config.index_prefix, "grafeas");
        assert_eq!(config.request_timeout_ms, 30000);
        assert_eq!(config.refresh, Refresh::True);
        assert_eq!(config.pit_keep_alive, "5m");
        assert_eq!(config.max_page_size, 1000);
        assert_eq!(config.migration.max_poll_attempts, 10);
        assert_eq!(config.migration.poll_delay, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_humantime_poll_delay() {
        let config: ElasticsearchConfig = serde_json::from_value(json!({
            "refresh": "wait_for",
            "migration": {"poll_delay": "250ms"},
            "auth": {"Bearer": {"token": "t"}}
        }))
        .unwrap();
        assert_eq!(config.refresh, Refresh::WaitFor);
        assert_eq!(config.migration.poll_delay, Duration::from_millis(250));
        assert_eq!(config.migration.max_poll_attempts, 10);
        assert_eq!(
            config.auth,
            Some(ElasticsearchAuth::Bearer {
                token: "t".to_string()
            })
        );

        let policy = config.migration.retry_policy();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = ElasticsearchConfig {
            nodes: Vec::new(),
            index_prefix: "Grafeas".to_string(),
            pit_keep_alive: "soon".to_string(),
            max_page_size: 0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("lowercase")));
        assert!(errors.iter().any(|e| e.contains("pit_keep_alive")));
    }

    #[test]
    fn test_load_embedded_mappings() {
        let config = ElasticsearchConfig::default();
        let mappings = config.load_mappings().unwrap();
        assert_eq!(mappings.version(crate::index::DocumentKind::Note), "v1");
    }
}
