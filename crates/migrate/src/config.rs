//! Command line configuration for the migration tool.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GRAFEAS_ES_NODES` | http://localhost:9200 | Comma-separated node URLs |
//! | `GRAFEAS_ES_INDEX_PREFIX` | grafeas | Index and alias prefix |
//! | `GRAFEAS_ES_USERNAME` | | Basic auth username |
//! | `GRAFEAS_ES_PASSWORD` | | Basic auth password |
//! | `GRAFEAS_ES_TOKEN` | | Bearer token |
//! | `GRAFEAS_ES_REQUEST_TIMEOUT_MS` | 30000 | Request timeout (milliseconds) |
//! | `GRAFEAS_ES_DISABLE_CERT_VALIDATION` | false | Skip TLS certificate checks |
//! | `GRAFEAS_ES_MAPPINGS_DIR` | | Mapping directory, embedded mappings when unset |
//! | `GRAFEAS_ES_MAX_POLL_ATTEMPTS` | 10 | Reindex status polls per index |
//! | `GRAFEAS_ES_POLL_DELAY` | 10s | Delay between polls |
//! | `GRAFEAS_LOG_LEVEL` | info | Log level |

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use grafeas_persistence::config::{ElasticsearchAuth, ElasticsearchConfig, MigrationConfig};

/// Migration tool configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "grafeas-migrate")]
#[command(about = "Migrates Grafeas Elasticsearch indices to the current mapping versions")]
pub struct MigrateConfig {
    /// Elasticsearch node URLs (comma-separated).
    #[arg(long, env = "GRAFEAS_ES_NODES", default_value = "http://localhost:9200")]
    pub nodes: String,

    /// Index and alias name prefix.
    #[arg(long, env = "GRAFEAS_ES_INDEX_PREFIX", default_value = "grafeas")]
    pub index_prefix: String,

    /// Username for basic authentication.
    #[arg(long, env = "GRAFEAS_ES_USERNAME")]
    pub username: Option<String>,

    /// Password for basic authentication.
    #[arg(long, env = "GRAFEAS_ES_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Bearer token.
    #[arg(long, env = "GRAFEAS_ES_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Request timeout in milliseconds.
    #[arg(long, env = "GRAFEAS_ES_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Skip TLS certificate validation.
    #[arg(long, env = "GRAFEAS_ES_DISABLE_CERT_VALIDATION", default_value = "false")]
    pub disable_certificate_validation: bool,

    /// Directory holding projects.json, occurrences.json and notes.json.
    #[arg(long, env = "GRAFEAS_ES_MAPPINGS_DIR")]
    pub mappings_dir: Option<PathBuf>,

    /// Reindex status polls per index before giving up.
    #[arg(long, env = "GRAFEAS_ES_MAX_POLL_ATTEMPTS", default_value = "10")]
    pub max_poll_attempts: u32,

    /// Delay between reindex status polls (e.g. `10s`, `1m`).
    #[arg(long, env = "GRAFEAS_ES_POLL_DELAY", default_value = "10s", value_parser = humantime::parse_duration)]
    pub poll_delay: Duration,

    /// Create the projects index and alias if they are missing.
    #[arg(long)]
    pub initialize: bool,

    /// List the indices that need migrating without touching them.
    #[arg(long)]
    pub dry_run: bool,

    /// Only migrate these indices (repeatable). All outdated indices by default.
    #[arg(long = "index")]
    pub indices: Vec<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "GRAFEAS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl MigrateConfig {
    /// Returns the node URLs, ignoring blanks.
    pub fn node_urls(&self) -> Vec<String> {
        self.nodes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn auth(&self) -> Option<ElasticsearchAuth> {
        if let Some(token) = &self.token {
            return Some(ElasticsearchAuth::Bearer {
                token: token.clone(),
            });
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(ElasticsearchAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Builds the engine configuration.
    pub fn to_es_config(&self) -> ElasticsearchConfig {
        ElasticsearchConfig {
            nodes: self.node_urls(),
            index_prefix: self.index_prefix.clone(),
            auth: self.auth(),
            request_timeout_ms: self.request_timeout_ms,
            disable_certificate_validation: self.disable_certificate_validation,
            mappings_dir: self.mappings_dir.clone(),
            migration: MigrationConfig {
                max_poll_attempts: self.max_poll_attempts,
                poll_delay: self.poll_delay,
            },
            ..Default::default()
        }
    }

    /// Validates the configuration, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.username.is_some() != self.password.is_some() {
            errors.push("Username and password must be given together".to_string());
        }
        if self.token.is_some() && self.username.is_some() {
            errors.push("Use either a bearer token or basic authentication, not both".to_string());
        }
        if self.dry_run && self.initialize {
            errors.push("--initialize cannot be combined with --dry-run".to_string());
        }
        if let Err(es_errors) = self.to_es_config().validate() {
            errors.extend(es_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
