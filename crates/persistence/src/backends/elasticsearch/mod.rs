//! Grafeas storage on a document-search engine.
//!
//! # Index Structure
//!
//! | Kind | Index | Alias |
//! |------|-------|-------|
//! | Project | `{prefix}-{version}-projects` | `{prefix}-projects` |
//! | Occurrence | `{prefix}-{version}-{project}-occurrences` | `{prefix}-{project}-occurrences` |
//! | Note | `{prefix}-{version}-{project}-notes` | `{prefix}-{project}-notes` |
//!
//! Storage only ever addresses aliases, so a migration moving an alias to a
//! new index version is invisible to callers.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use grafeas_persistence::backends::elasticsearch::ElasticsearchStorage;
//! use grafeas_persistence::config::ElasticsearchConfig;
//!
//! let config = ElasticsearchConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! };
//! let storage = ElasticsearchStorage::connect(&config, Arc::new(my_filterer))?;
//! storage.initialize().await?;
//! ```

mod backend;
mod storage;

pub use backend::ElasticsearchStorage;
