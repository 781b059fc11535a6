//! Storage backend implementations.
//!
//! This module contains implementations of the storage traits in
//! [`crate::core`].
//!
//! # Available Backends
//!
//! | Backend | Engine | Description |
//! |---------|--------|-------------|
//! | Elasticsearch | any [`SearchEngine`](crate::engine::SearchEngine) | Alias-addressed, versioned indices per project |
//!
//! The backend itself speaks only the engine seam, so it runs unchanged on
//! the live client (`elasticsearch` feature) and on the in-process
//! `InMemoryEngine` (`test-util` feature).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use grafeas_persistence::backends::elasticsearch::ElasticsearchStorage;
//! use grafeas_persistence::engine::{InMemoryEngine, SearchEngine};
//! use grafeas_persistence::index::{IndexRegistry, MappingSet};
//! use grafeas_persistence::query::{FilterError, Filterer, Query};
//! use grafeas_persistence::store::ClientSettings;
//!
//! struct NoFilters;
//!
//! impl Filterer for NoFilters {
//!     fn parse_expression(&self, _filter: &str) -> Result<Query, FilterError> {
//!         Err(FilterError::new("filters are not supported"))
//!     }
//! }
//!
//! let engine: Arc<dyn SearchEngine> = Arc::new(InMemoryEngine::new());
//! let registry = Arc::new(IndexRegistry::new(engine, "grafeas", MappingSet::embedded().unwrap()));
//! let storage = ElasticsearchStorage::new(registry, Arc::new(NoFilters), ClientSettings::default());
//! assert_eq!(storage.registry().projects_alias(), "grafeas-projects");
//! ```

pub mod elasticsearch;
