//! Translation between documents and the engine's JSON wire format.
//!
//! Request bodies are built here and response bodies decoded here, so the
//! rest of the crate never handles raw engine JSON directly.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::StorageResult;
use crate::query::Query;

/// Serializes a document with every field emitted.
pub fn encode_document<T: Serialize>(document: &T) -> StorageResult<Value> {
    Ok(serde_json::to_value(document)?)
}

/// Deserializes a document from a hit's `_source`.
pub fn decode_document<T: DeserializeOwned>(source: &Value) -> StorageResult<T> {
    Ok(T::deserialize(source)?)
}

/// A point-in-time reference inside a search body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitReference {
    /// Snapshot id.
    pub id: String,
    /// How long to keep the snapshot alive after this request.
    pub keep_alive: String,
}

/// A `_search` request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchBody {
    /// Query predicate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,

    /// Sort clause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,

    /// Point-in-time snapshot to search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pit: Option<PitReference>,

    /// Count every hit instead of stopping at the engine's default limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<bool>,
}

impl SearchBody {
    /// A body holding only a query.
    pub fn with_query(query: Query) -> Self {
        Self {
            query: Some(query),
            ..Default::default()
        }
    }

    /// Renders the body.
    pub fn to_value(&self) -> StorageResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Total hit count of a search.
#[derive(Debug, Clone, Deserialize)]
pub struct TotalHits {
    /// Number of matching documents.
    pub value: u64,
}

/// A single search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    /// Engine document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// The stored document.
    #[serde(rename = "_source", default)]
    pub source: Value,
    /// Sort values of this hit.
    #[serde(default)]
    pub sort: Vec<Value>,
}

/// The `hits` object of a search response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHits {
    /// Total hit count, absent when tracking was disabled.
    #[serde(default)]
    pub total: Option<TotalHits>,
    /// The returned hits.
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// A `_search` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    /// Milliseconds the search took.
    #[serde(default)]
    pub took: u64,
    /// Hits.
    pub hits: SearchHits,
    /// Refreshed snapshot id when searching a point in time.
    #[serde(default)]
    pub pit_id: Option<String>,
}

impl SearchResponse {
    /// Returns the total hit count, falling back to the number of returned hits.
    pub fn total(&self) -> u64 {
        self.hits
            .total
            .as_ref()
            .map(|t| t.value)
            .unwrap_or(self.hits.hits.len() as u64)
    }
}

/// Response to writing a single document.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDocResponse {
    /// Engine document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// `created` or `updated`.
    #[serde(default)]
    pub result: Option<String>,
}

/// Response to `_delete_by_query`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteByQueryResponse {
    /// Number of deleted documents.
    pub deleted: u64,
}

/// Cause carried in an engine error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineErrorCause {
    /// Error type, e.g. `mapper_parsing_exception`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human readable reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Status of one item of a bulk request.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemStatus {
    /// Engine document id, when one was assigned.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    /// HTTP status of the item.
    pub status: u16,
    /// Failure cause.
    #[serde(default)]
    pub error: Option<EngineErrorCause>,
}

/// One item of a bulk response, keyed by its action.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResponseItem {
    /// Result of an `index` action.
    #[serde(default)]
    pub index: Option<BulkItemStatus>,
    /// Result of a `create` action.
    #[serde(default)]
    pub create: Option<BulkItemStatus>,
}

impl BulkResponseItem {
    /// Returns the status regardless of action type.
    pub fn status(&self) -> Option<&BulkItemStatus> {
        self.index.as_ref().or(self.create.as_ref())
    }
}

/// A `_bulk` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResponse {
    /// True if any item failed.
    #[serde(default)]
    pub errors: bool,
    /// Items in request order.
    #[serde(default)]
    pub items: Vec<BulkResponseItem>,
}

/// Response to opening a point in time.
#[derive(Debug, Clone, Deserialize)]
pub struct PointInTimeResponse {
    /// Snapshot id.
    pub id: String,
}

/// Response to adding an index block.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockResponse {
    /// The master acknowledged the block.
    #[serde(default)]
    pub acknowledged: bool,
    /// Every shard acknowledged the block.
    #[serde(default)]
    pub shards_acknowledged: bool,
}

/// Response to starting an asynchronous task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreationResponse {
    /// Task id, `node:number`.
    pub task: String,
}

/// Response to a task status request.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    /// Whether the task finished.
    #[serde(default)]
    pub completed: bool,
}

/// Returns true if `settings` (a get-settings response) shows a write block on `index`.
///
/// Setting values come back as strings, so only `"true"` counts.
pub fn write_block_enabled(settings: &Value, index: &str) -> bool {
    let entry = match settings.get(index) {
        Some(entry) => Some(entry),
        None => settings
            .as_object()
            .filter(|map| map.len() == 1)
            .and_then(|map| map.values().next()),
    };

    entry
        .and_then(|e| e.pointer("/settings/index/blocks/write"))
        .map(|v| v == "true" || v == &Value::Bool(true))
        .unwrap_or(false)
}

/// Builds the bulk lines indexing `documents` into `index`, in input order.
pub fn bulk_index_lines(index: &str, documents: Vec<Value>) -> Vec<Value> {
    let mut lines = Vec::with_capacity(documents.len() * 2);
    for document in documents {
        lines.push(json!({ "index": { "_index": index } }));
        lines.push(document);
    }
    lines
}

/// Builds the body of an index creation request.
pub fn create_index_body(mappings: &Value, alias: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert("mappings".to_string(), mappings.clone());
    if let Some(alias) = alias {
        body.insert("aliases".to_string(), json!({ alias: {} }));
    }
    Value::Object(body)
}

/// Builds a reindex body that only creates missing documents and skips conflicts.
pub fn reindex_body(source: &str, destination: &str) -> Value {
    json!({
        "conflicts": "proceed",
        "source": { "index": source },
        "dest": { "index": destination, "op_type": "create" }
    })
}

/// Builds an alias update moving `alias` from `source` to `target` in one step.
pub fn alias_swap_body(source: &str, target: &str, alias: &str) -> Value {
    json!({
        "actions": [
            { "remove": { "index": source, "alias": alias } },
            { "add": { "index": target, "alias": alias } }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Note, NoteKind};

    #[test]
    fn test_search_body_skips_empty_fields() {
        let body = SearchBody::with_query(Query::term("name", "n")).to_value().unwrap();
        assert_eq!(body, json!({"query": {"term": {"name": "n"}}}));
    }

    #[test]
    fn test_search_body_with_pit() {
        let body = SearchBody {
            pit: Some(PitReference {
                id: "abc".to_string(),
                keep_alive: "5m".to_string(),
            }),
            track_total_hits: Some(true),
            ..Default::default()
        };
        assert_eq!(
            body.to_value().unwrap(),
            json!({"pit": {"id": "abc", "keep_alive": "5m"}, "track_total_hits": true})
        );
    }

    #[test]
    fn test_decode_search_response() {
        let body = json!({
            "took": 3,
            "hits": {
                "total": {"value": 12, "relation": "eq"},
                "hits": [{"_index": "i", "_id": "doc-1", "_source": {"name": "projects/p/notes/n"}}]
            }
        });
        let res: SearchResponse = serde_json::from_value(body).unwrap();
        assert_eq!(res.total(), 12);
        assert_eq!(res.hits.hits[0].id, "doc-1");
        let note: Note = decode_document(&res.hits.hits[0].source).unwrap();
        assert_eq!(note.name, "projects/p/notes/n");
        assert_eq!(note.kind, NoteKind::Unspecified);
    }

    #[test]
    fn test_decode_bulk_response() {
        let body = json!({
            "took": 5,
            "errors": true,
            "items": [
                {"index": {"_index": "i", "_id": "a", "status": 201, "result": "created"}},
                {"index": {"_index": "i", "status": 400, "error": {"type": "mapper_parsing_exception", "reason": "bad"}}}
            ]
        });
        let res: BulkResponse = serde_json::from_value(body).unwrap();
        assert!(res.errors);
        assert_eq!(res.items[0].status().unwrap().status, 201);
        let failed = res.items[1].status().unwrap();
        assert_eq!(failed.error.as_ref().unwrap().error_type, "mapper_parsing_exception");
        assert!(failed.id.is_none());
    }

    #[test]
    fn test_bulk_payload() {
        let lines = bulk_index_lines("grafeas-p1-notes", vec![json!({"name": "a"}), json!({"name": "b"})]);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], json!({"index": {"_index": "grafeas-p1-notes"}}));
        assert_eq!(lines[1], json!({"name": "a"}));
        assert_eq!(lines[3], json!({"name": "b"}));
    }

    #[test]
    fn test_write_block_enabled() {
        let blocked = json!({"grafeas-v1-projects": {"settings": {"index": {"blocks": {"write": "true"}}}}});
        assert!(write_block_enabled(&blocked, "grafeas-v1-projects"));

        let open = json!({"grafeas-v1-projects": {"settings": {"index": {"number_of_shards": "1"}}}});
        assert!(!write_block_enabled(&open, "grafeas-v1-projects"));

        let explicit_false = json!({"x": {"settings": {"index": {"blocks": {"write": "false"}}}}});
        assert!(!write_block_enabled(&explicit_false, "x"));
    }

    #[test]
    fn test_create_index_body() {
        let mappings = json!({"properties": {}});
        assert_eq!(
            create_index_body(&mappings, Some("grafeas-projects")),
            json!({"mappings": {"properties": {}}, "aliases": {"grafeas-projects": {}}})
        );
        assert_eq!(
            create_index_body(&mappings, None),
            json!({"mappings": {"properties": {}}})
        );
    }

    #[test]
    fn test_migration_bodies() {
        let reindex = reindex_body("old", "new");
        assert_eq!(reindex["conflicts"], "proceed");
        assert_eq!(reindex["dest"]["op_type"], "create");

        let swap = alias_swap_body("old", "new", "alias");
        assert_eq!(swap["actions"][0]["remove"]["index"], "old");
        assert_eq!(swap["actions"][1]["add"]["index"], "new");
    }
}
