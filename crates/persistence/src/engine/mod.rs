//! The search engine seam.
//!
//! [`SearchEngine`] exposes one async method per engine primitive the storage
//! layer and the migrator need. Implementations return the raw status and JSON
//! body; interpreting them (which statuses are fine, which error types are
//! idempotent successes) is the caller's business.
//!
//! Two implementations are provided:
//!
//! - `ElasticsearchEngine` (feature `elasticsearch`): the official client
//! - `InMemoryEngine` (feature `test-util`): an in-process engine with the
//!   same observable behavior, used by the test-suite

use std::fmt::{self, Debug};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

#[cfg(feature = "elasticsearch")]
mod elasticsearch;
#[cfg(any(test, feature = "test-util"))]
mod memory;

#[cfg(feature = "elasticsearch")]
pub use elasticsearch::ElasticsearchEngine;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{InMemoryEngine, InjectedFailure};

/// Status and body of an engine response.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, `Null` when the body was empty.
    pub body: Value,
}

impl EngineResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for a 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns the engine error type (`error.type`), if the body carries one.
    pub fn error_type(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|e| e.get("type"))
            .and_then(|t| t.as_str())
    }

    /// Returns the engine error reason (`error.reason`), if the body carries one.
    pub fn error_reason(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|e| e.get("reason"))
            .and_then(|t| t.as_str())
    }

    /// Decodes the body into a typed response.
    pub fn decode<T: DeserializeOwned>(&self, operation: EngineOperation) -> Result<T, BackendError> {
        T::deserialize(&self.body).map_err(|e| BackendError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    /// Turns a non-success response into an error.
    pub fn into_error(self, operation: EngineOperation) -> BackendError {
        BackendError::UnexpectedResponse {
            operation: operation.to_string(),
            status: self.status,
            body: self.body.to_string(),
        }
    }

    /// Passes success responses through and turns everything else into an error.
    pub fn require_success(self, operation: EngineOperation) -> Result<Self, BackendError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error(operation))
        }
    }
}

/// Result of a single engine call.
pub type EngineResult = Result<EngineResponse, BackendError>;

/// Engine primitives, used for logging and failure injection.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOperation {
    IndexDocument,
    Search,
    DeleteByQuery,
    Bulk,
    OpenPointInTime,
    IndexExists,
    CreateIndex,
    DeleteIndices,
    GetIndices,
    GetSettings,
    AddWriteBlock,
    Reindex,
    GetTask,
    DeleteDocument,
    UpdateAliases,
}

impl EngineOperation {
    /// Returns the operation's name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineOperation::IndexDocument => "index document",
            EngineOperation::Search => "search",
            EngineOperation::DeleteByQuery => "delete by query",
            EngineOperation::Bulk => "bulk",
            EngineOperation::OpenPointInTime => "open point in time",
            EngineOperation::IndexExists => "index exists",
            EngineOperation::CreateIndex => "create index",
            EngineOperation::DeleteIndices => "delete indices",
            EngineOperation::GetIndices => "get indices",
            EngineOperation::GetSettings => "get settings",
            EngineOperation::AddWriteBlock => "add write block",
            EngineOperation::Reindex => "reindex",
            EngineOperation::GetTask => "get task",
            EngineOperation::DeleteDocument => "delete document",
            EngineOperation::UpdateAliases => "update aliases",
        }
    }
}

impl fmt::Display for EngineOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refresh policy applied to writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refresh {
    /// Refresh the affected shards before returning.
    #[default]
    True,
    /// Do not refresh.
    False,
    /// Wait for the next scheduled refresh.
    WaitFor,
}

impl Refresh {
    /// Returns the query-string value of this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Refresh::True => "true",
            Refresh::False => "false",
            Refresh::WaitFor => "wait_for",
        }
    }

    /// Collapses the policy to the boolean delete-by-query accepts.
    ///
    /// Delete-by-query has no `wait_for`; it refreshes immediately instead.
    pub fn as_bool(&self) -> bool {
        !matches!(self, Refresh::False)
    }
}

impl fmt::Display for Refresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine primitives used by storage and migrations.
#[async_trait]
pub trait SearchEngine: Send + Sync + Debug {
    /// Returns a short name for logs.
    fn name(&self) -> &'static str;

    /// Writes one document, letting the engine assign an id when `id` is `None`.
    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        document: Value,
        refresh: Refresh,
    ) -> EngineResult;

    /// Runs a search. `index` must be `None` when the body names a point in time.
    async fn search(
        &self,
        index: Option<&str>,
        body: Value,
        from: Option<u64>,
        size: Option<u64>,
    ) -> EngineResult;

    /// Deletes every document matching the body's query.
    async fn delete_by_query(&self, index: &str, body: Value, refresh: bool) -> EngineResult;

    /// Sends a bulk request; `lines` alternate action and document objects.
    async fn bulk(&self, lines: Vec<Value>, refresh: Refresh) -> EngineResult;

    /// Opens a point-in-time snapshot over an index.
    async fn open_point_in_time(&self, index: &str, keep_alive: &str) -> EngineResult;

    /// Checks whether an index or alias exists (200 or 404).
    async fn index_exists(&self, index: &str) -> EngineResult;

    /// Creates an index from a body holding `mappings` and optional `aliases`.
    async fn create_index(&self, index: &str, body: Value) -> EngineResult;

    /// Deletes concrete indices.
    async fn delete_indices(&self, indices: &[String]) -> EngineResult;

    /// Describes the indices matching a name, alias or pattern (`_all` for every index).
    async fn get_indices(&self, pattern: &str) -> EngineResult;

    /// Reads an index's settings.
    async fn get_settings(&self, index: &str) -> EngineResult;

    /// Adds a write block to an index.
    async fn add_write_block(&self, index: &str) -> EngineResult;

    /// Starts an asynchronous reindex and returns its task id.
    async fn reindex(&self, body: Value) -> EngineResult;

    /// Reads the status of a task.
    async fn get_task(&self, task_id: &str) -> EngineResult;

    /// Deletes one document by id.
    async fn delete_document(&self, index: &str, id: &str) -> EngineResult;

    /// Applies a list of alias actions atomically.
    async fn update_aliases(&self, body: Value) -> EngineResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_helpers() {
        let res = EngineResponse::new(
            400,
            json!({"error": {"type": "resource_already_exists_exception", "reason": "exists"}, "status": 400}),
        );
        assert!(!res.is_success());
        assert_eq!(res.error_type(), Some("resource_already_exists_exception"));
        assert_eq!(res.error_reason(), Some("exists"));

        let err = res.require_success(EngineOperation::CreateIndex).unwrap_err();
        assert!(err.to_string().contains("create index"));
        assert!(err.to_string().contains("400"));
    }

    #[test]
    fn test_decode_failure_names_operation() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Pit {
            id: String,
        }
        let res = EngineResponse::new(200, json!({"unexpected": true}));
        let err = res.decode::<Pit>(EngineOperation::OpenPointInTime).unwrap_err();
        assert!(matches!(err, BackendError::Decode { ref operation, .. } if operation == "open point in time"));
    }

    #[test]
    fn test_refresh_policy() {
        assert!(Refresh::WaitFor.as_bool());
        assert!(Refresh::True.as_bool());
        assert!(!Refresh::False.as_bool());
        assert_eq!(Refresh::default(), Refresh::True);
        let parsed: Refresh = serde_json::from_str("\"wait_for\"").unwrap();
        assert_eq!(parsed, Refresh::WaitFor);
    }
}
