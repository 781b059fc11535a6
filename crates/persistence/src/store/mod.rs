//! Generic document CRUD against a single index or alias.
//!
//! [`DocumentClient`] knows nothing about projects, notes or occurrences. It
//! writes serializable documents, finds them with exact-match queries, lists
//! them through point-in-time snapshots and ingests batches with one bulk
//! request.

mod client;

pub use client::DocumentClient;

use crate::config::ElasticsearchConfig;
use crate::engine::Refresh;
use crate::error::StorageError;
use crate::query::{Query, SortOptions};
use crate::types::{Page, PageRequest};

/// Per-client knobs taken from the engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Refresh policy for writes.
    pub refresh: Refresh,
    /// Keep-alive sent with every point-in-time search.
    pub pit_keep_alive: String,
    /// Largest page size honored; also the cap of unpaginated lists.
    pub max_page_size: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&ElasticsearchConfig::default())
    }
}

impl ClientSettings {
    /// Extracts the client settings from an engine configuration.
    pub fn from_config(config: &ElasticsearchConfig) -> Self {
        Self {
            refresh: config.refresh,
            pit_keep_alive: config.pit_keep_alive.clone(),
            max_page_size: config.max_page_size,
        }
    }
}

/// A decoded document and the engine id it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<T> {
    /// Engine document id.
    pub id: String,
    /// The document.
    pub document: T,
}

/// Parameters of a list request.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// Index or alias to list.
    pub index: String,
    /// Caller filter expression, empty for none.
    pub filter: String,
    /// Base query ANDed with the compiled filter.
    pub query: Option<Query>,
    /// Sort order.
    pub sort: Option<SortOptions>,
    /// Page size and token.
    pub page: PageRequest,
}

impl ListRequest {
    /// Lists everything in `index`, unpaginated.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            ..Default::default()
        }
    }

    /// Sets the caller filter expression.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the base query.
    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets the sort order.
    pub fn sort(mut self, sort: SortOptions) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets pagination.
    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }
}

/// Result of a list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResponse<T> {
    /// Hits in engine order.
    pub hits: Vec<Hit<T>>,
    /// Total number of matching documents.
    pub total: u64,
    /// Cursor for the next page, `None` on the last page.
    pub next_page_token: Option<String>,
}

impl<T> ListResponse<T> {
    /// Drops the engine ids, keeping the documents and the next token.
    pub fn into_page(self) -> Page<T> {
        Page::new(
            self.hits.into_iter().map(|hit| hit.document).collect(),
            self.next_page_token,
        )
    }
}

/// Result of a batch create: the documents that were written and one error per failure.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Documents written, in input order.
    pub created: Vec<T>,
    /// Per-item failures, or a single batch-level failure.
    pub errors: Vec<StorageError>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    /// A batch that failed as a whole.
    pub fn failed(error: StorageError) -> Self {
        Self {
            created: Vec::new(),
            errors: vec![error],
        }
    }

    /// Returns true if every item was written.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds per-item errors produced before the bulk request.
    pub fn with_errors(mut self, mut errors: Vec<StorageError>) -> Self {
        errors.append(&mut self.errors);
        self.errors = errors;
        self
    }
}
