//! Grafeas Elasticsearch Persistence Layer
//!
//! This crate stores Grafeas projects, notes and occurrences in an
//! Elasticsearch-compatible search engine, and migrates their indices from
//! one mapping version to the next.
//!
//! # Features
//!
//! - **Alias-addressed indices**: one projects index, plus an occurrences and a
//!   notes index per project, each behind a stable alias
//! - **Versioned mappings**: index names embed the mapping version; aliases don't
//! - **Consistent pagination**: point-in-time snapshots with opaque page tokens
//! - **Batch ingestion**: bulk requests with per-item error reporting
//! - **Online migration**: block writes, reindex, swap the alias, drop the source
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! grafeas-persistence = { version = "0.1", features = ["elasticsearch"] }
//! ```
//!
//! - `elasticsearch` (default) - the official Elasticsearch client engine
//! - `es-integration` - live-engine tests (requires Docker)
//!
//! # Architecture
//!
//! - [`types`] - Projects, notes, occurrences, field masks and pagination
//! - [`error`] - Error types for all operations
//! - [`config`] - Engine connection and migration settings
//! - [`engine`] - The search engine seam and its implementations
//! - [`index`] - Index naming, mapping versions and index creation
//! - [`query`] - Query predicates and the filter compiler seam
//! - [`codec`] - Request bodies and response envelopes
//! - [`store`] - Generic document CRUD against one index or alias
//! - [`core`] - Storage traits
//! - [`backends`] - Storage trait implementations
//! - [`migration`] - Moving indices to the latest mapping version
//!
//! # Quick Start
//!
//! ```
//! use grafeas_persistence::index::{DocumentKind, IndexNaming};
//! use grafeas_persistence::types::{PageRequest, occurrence_name};
//!
//! let naming = IndexNaming::new("grafeas");
//! assert_eq!(
//!     naming.index_name(DocumentKind::Note, "v1", Some("acme")),
//!     "grafeas-v1-acme-notes"
//! );
//! assert_eq!(naming.alias_name(DocumentKind::Note, Some("acme")), "grafeas-acme-notes");
//!
//! assert_eq!(occurrence_name("acme", "1234"), "projects/acme/occurrences/1234");
//! assert!(PageRequest::first(20).is_paginated());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod codec;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod index;
pub mod migration;
pub mod query;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ErrorCode, StorageError, StorageResult};
pub use types::{Note, Occurrence, Page, PageRequest, Project};

// Re-export core traits
pub use core::{GrafeasStorage, NoteStorage, OccurrenceStorage, ProjectStorage};

pub use backends::elasticsearch::ElasticsearchStorage;
pub use config::ElasticsearchConfig;
pub use migration::{MigrationReport, Migrator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
