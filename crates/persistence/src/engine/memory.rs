//! An in-process search engine.
//!
//! [`InMemoryEngine`] answers every [`SearchEngine`] call with the statuses,
//! error types and body shapes a real cluster produces for the subset of the
//! query DSL this crate emits (`term`, `terms`, `prefix`, `exists`,
//! `match_all` and `bool`). Writes are visible immediately, whatever the
//! refresh policy.
//!
//! Tests can inject failures per operation, withhold write-block
//! acknowledgements, delay reindex completion and expire point-in-time
//! snapshots.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tracing::trace;

use crate::error::BackendError;

use super::{EngineOperation, EngineResponse, EngineResult, Refresh, SearchEngine};

const DEFAULT_SEARCH_SIZE: u64 = 10;
const NODE_NAME: &str = "memory-node";
const TASKS_INDEX: &str = ".tasks";

/// A failure returned instead of running the next call of an operation.
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    /// Answer with this status and body.
    Status {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: Value,
    },
    /// Fail before a response is received.
    Transport(String),
}

impl InjectedFailure {
    /// A response with the given status and body.
    pub fn status(status: u16, body: Value) -> Self {
        InjectedFailure::Status { status, body }
    }

    /// A transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        InjectedFailure::Transport(message.into())
    }

    fn into_result(self, operation: EngineOperation) -> EngineResult {
        match self {
            InjectedFailure::Status { status, body } => Ok(EngineResponse::new(status, body)),
            InjectedFailure::Transport(message) => Err(BackendError::Transport {
                operation: operation.to_string(),
                message,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct StoredIndex {
    mappings: Value,
    documents: Vec<(String, Value)>,
    write_blocked: bool,
}

impl StoredIndex {
    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|(doc_id, _)| doc_id == id)
    }
}

#[derive(Debug)]
struct TaskState {
    pending_polls: u32,
    created: u64,
    version_conflicts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpType {
    Index,
    Create,
}

struct WriteOutcome {
    index: String,
    id: String,
    status: u16,
    result: &'static str,
}

#[derive(Debug)]
struct State {
    indices: BTreeMap<String, StoredIndex>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    snapshots: HashMap<String, Vec<(String, String, Value)>>,
    tasks: HashMap<String, TaskState>,
    task_documents: BTreeSet<String>,
    failures: HashMap<EngineOperation, VecDeque<InjectedFailure>>,
    calls: Vec<EngineOperation>,
    sequence: u64,
    acknowledge_write_blocks: bool,
    reindex_pending_polls: u32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            indices: BTreeMap::new(),
            aliases: BTreeMap::new(),
            snapshots: HashMap::new(),
            tasks: HashMap::new(),
            task_documents: BTreeSet::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            sequence: 0,
            acknowledge_write_blocks: true,
            reindex_pending_polls: 0,
        }
    }
}

/// An in-process engine with cluster-like semantics.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: Mutex<State>,
}

impl InMemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `operation` return `failure`. Failures queue up.
    pub fn fail_next(&self, operation: EngineOperation, failure: InjectedFailure) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    /// Controls whether write blocks are acknowledged (default true).
    pub fn acknowledge_write_blocks(&self, acknowledge: bool) {
        self.state.lock().acknowledge_write_blocks = acknowledge;
    }

    /// Makes new reindex tasks report incomplete for the first `polls` status requests.
    pub fn complete_reindex_after(&self, polls: u32) {
        self.state.lock().reindex_pending_polls = polls;
    }

    /// Drops every open point-in-time snapshot, as if their keep-alive elapsed.
    pub fn expire_point_in_times(&self) {
        self.state.lock().snapshots.clear();
    }

    /// Returns every operation called so far, in order.
    pub fn calls(&self) -> Vec<EngineOperation> {
        self.state.lock().calls.clone()
    }

    /// Returns how many times `operation` was called.
    pub fn call_count(&self, operation: EngineOperation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    /// Returns the names of all concrete indices.
    pub fn index_names(&self) -> Vec<String> {
        self.state.lock().indices.keys().cloned().collect()
    }

    /// Returns the indices an alias points to.
    pub fn indices_for_alias(&self, alias: &str) -> Vec<String> {
        self.state
            .lock()
            .aliases
            .get(alias)
            .map(|indices| indices.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the aliases bound to an index.
    pub fn aliases_for_index(&self, index: &str) -> Vec<String> {
        self.state.lock().aliases_of(index)
    }

    /// Returns the documents stored behind an index or alias, in insertion order.
    pub fn documents(&self, index: &str) -> Vec<Value> {
        let state = self.state.lock();
        state
            .resolve_read(index)
            .unwrap_or_default()
            .iter()
            .filter_map(|name| state.indices.get(name))
            .flat_map(|idx| idx.documents.iter().map(|(_, doc)| doc.clone()))
            .collect()
    }

    /// Returns the number of documents stored behind an index or alias.
    pub fn document_count(&self, index: &str) -> usize {
        self.documents(index).len()
    }

    /// Returns the mapping an index was created with.
    pub fn mappings(&self, index: &str) -> Option<Value> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|idx| idx.mappings.clone())
    }

    /// Returns true if the index carries a write block.
    pub fn is_write_blocked(&self, index: &str) -> bool {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|idx| idx.write_blocked)
            .unwrap_or(false)
    }

    /// Returns the ids of task results stored in `.tasks`.
    pub fn task_documents(&self) -> Vec<String> {
        self.state.lock().task_documents.iter().cloned().collect()
    }

    fn begin(&self, operation: EngineOperation) -> Option<EngineResult> {
        let mut state = self.state.lock();
        state.calls.push(operation);
        let failure = state
            .failures
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front());
        failure.map(|f| {
            trace!(operation = %operation, "Returning injected failure");
            f.into_result(operation)
        })
    }

    fn run<F>(&self, operation: EngineOperation, f: F) -> EngineResult
    where
        F: FnOnce(&mut State) -> EngineResponse,
    {
        if let Some(result) = self.begin(operation) {
            return result;
        }
        let mut state = self.state.lock();
        Ok(f(&mut state))
    }
}

fn error_response(status: u16, error_type: &str, reason: impl Into<String>) -> EngineResponse {
    let reason = reason.into();
    EngineResponse::new(
        status,
        json!({
            "error": {
                "root_cause": [{"type": error_type, "reason": reason}],
                "type": error_type,
                "reason": reason
            },
            "status": status
        }),
    )
}

fn index_not_found(index: &str) -> EngineResponse {
    error_response(
        404,
        "index_not_found_exception",
        format!("no such index [{index}]"),
    )
}

fn invalid_index_name(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("must not be empty")
    } else if name.chars().any(char::is_uppercase) {
        Some("must be lowercase")
    } else if name.starts_with(['_', '-', '+']) {
        Some("must not start with '_', '-', or '+'")
    } else if name.chars().any(|c| {
        matches!(
            c,
            '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' | ',' | '#' | ':'
        )
    }) {
        Some("must not contain the following characters [\\, /, *, ?, \", <, >, |, ' ', ',', #, :]")
    } else {
        None
    }
}

impl State {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn generate_id(&mut self) -> String {
        let sequence = self.next_sequence();
        format!("{:020x}", sequence.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }

    fn aliases_of(&self, index: &str) -> Vec<String> {
        self.aliases
            .iter()
            .filter(|(_, indices)| indices.contains(index))
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Expands a name, alias, `_all`/`*` or trailing-wildcard pattern to concrete indices.
    fn resolve_read(&self, name: &str) -> Option<Vec<String>> {
        if name == "_all" || name == "*" {
            return Some(self.indices.keys().cloned().collect());
        }
        if let Some(prefix) = name.strip_suffix('*') {
            let mut matched: BTreeSet<String> = self
                .indices
                .keys()
                .filter(|index| index.starts_with(prefix))
                .cloned()
                .collect();
            for (alias, indices) in &self.aliases {
                if alias.starts_with(prefix) {
                    matched.extend(indices.iter().cloned());
                }
            }
            return Some(matched.into_iter().collect());
        }
        if self.indices.contains_key(name) {
            return Some(vec![name.to_string()]);
        }
        self.aliases
            .get(name)
            .map(|indices| indices.iter().cloned().collect())
    }

    /// Resolves the single index a write to `name` lands in, creating it if needed.
    fn resolve_write(&mut self, name: &str) -> Result<String, EngineResponse> {
        if self.indices.contains_key(name) {
            return Ok(name.to_string());
        }
        if let Some(indices) = self.aliases.get(name) {
            let mut iter = indices.iter();
            return match (iter.next(), iter.next()) {
                (Some(index), None) => Ok(index.clone()),
                _ => Err(error_response(
                    400,
                    "illegal_argument_exception",
                    format!(
                        "no write index is defined for alias [{name}]. The write index may be explicitly disabled using is_write_index=false or the alias points to multiple indices without one being designated as a write index"
                    ),
                )),
            };
        }
        if let Some(problem) = invalid_index_name(name) {
            return Err(error_response(
                400,
                "invalid_index_name_exception",
                format!("Invalid index name [{name}], {problem}"),
            ));
        }
        self.indices.insert(name.to_string(), StoredIndex::default());
        Ok(name.to_string())
    }

    fn write_document(
        &mut self,
        target: &str,
        id: Option<String>,
        document: Value,
        op_type: OpType,
    ) -> Result<WriteOutcome, EngineResponse> {
        let index_name = self.resolve_write(target)?;
        let id = match id {
            Some(id) => id,
            None => self.generate_id(),
        };

        let index = self
            .indices
            .get_mut(&index_name)
            .ok_or_else(|| index_not_found(&index_name))?;

        if index.write_blocked {
            return Err(error_response(
                403,
                "cluster_block_exception",
                format!("index [{index_name}] blocked by: [FORBIDDEN/8/index write (api)];"),
            ));
        }
        if let Err(reason) = validate_document(&index.mappings, &document) {
            return Err(error_response(
                400,
                "mapper_parsing_exception",
                format!("{reason} in document with id '{id}'"),
            ));
        }

        match index.position(&id) {
            Some(_) if op_type == OpType::Create => Err(error_response(
                409,
                "version_conflict_engine_exception",
                format!("[{id}]: version conflict, document already exists"),
            )),
            Some(position) => {
                index.documents[position].1 = document;
                Ok(WriteOutcome {
                    index: index_name,
                    id,
                    status: 200,
                    result: "updated",
                })
            }
            None => {
                index.documents.push((id.clone(), document));
                Ok(WriteOutcome {
                    index: index_name,
                    id,
                    status: 201,
                    result: "created",
                })
            }
        }
    }

    fn settings_for(&self, name: &str, index: &StoredIndex) -> Value {
        let mut settings = json!({
            "number_of_shards": "1",
            "number_of_replicas": "1",
            "provided_name": name,
        });
        if index.write_blocked {
            settings["blocks"] = json!({ "write": "true" });
        }
        json!({ "index": settings })
    }

    fn index_document(
        &mut self,
        index: &str,
        id: Option<&str>,
        document: Value,
    ) -> EngineResponse {
        match self.write_document(index, id.map(str::to_string), document, OpType::Index) {
            Ok(outcome) => EngineResponse::new(
                outcome.status,
                json!({
                    "_index": outcome.index,
                    "_id": outcome.id,
                    "_version": 1,
                    "result": outcome.result,
                    "_shards": {"total": 1, "successful": 1, "failed": 0}
                }),
            ),
            Err(response) => response,
        }
    }

    fn search(
        &self,
        index: Option<&str>,
        body: &Value,
        from: Option<u64>,
        size: Option<u64>,
    ) -> EngineResponse {
        if let Some(Err(reason)) = body.get("query").map(validate_query) {
            return error_response(400, "parsing_exception", reason);
        }

        let mut candidates: Vec<(String, String, Value)> = match body.get("pit") {
            Some(pit) => {
                if index.is_some() {
                    return error_response(
                        400,
                        "illegal_argument_exception",
                        "[indices] cannot be used with point in time. Do not specify any index with point in time.",
                    );
                }
                let pit_id = pit.get("id").and_then(Value::as_str).unwrap_or_default();
                match self.snapshots.get(pit_id) {
                    Some(snapshot) => snapshot.clone(),
                    None => {
                        return error_response(
                            404,
                            "search_context_missing_exception",
                            format!("No search context found for id [{pit_id}]"),
                        );
                    }
                }
            }
            None => {
                let targets = match index {
                    Some(name) => match self.resolve_read(name) {
                        Some(targets) => targets,
                        None => return index_not_found(name),
                    },
                    None => self.indices.keys().cloned().collect(),
                };
                self.collect(&targets)
            }
        };

        if let Some(query) = body.get("query") {
            let mut matched = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                match matches(query, &candidate.2) {
                    Ok(true) => matched.push(candidate),
                    Ok(false) => {}
                    Err(reason) => return error_response(400, "parsing_exception", reason),
                }
            }
            candidates = matched;
        }

        if let Some(sort) = body.get("sort") {
            if let Err(reason) = sort_documents(&mut candidates, sort) {
                return error_response(400, "parsing_exception", reason);
            }
        }

        let total = candidates.len();
        let from = from
            .or_else(|| body.get("from").and_then(Value::as_u64))
            .unwrap_or(0) as usize;
        let size = size
            .or_else(|| body.get("size").and_then(Value::as_u64))
            .unwrap_or(DEFAULT_SEARCH_SIZE) as usize;

        let hits: Vec<Value> = candidates
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(index, id, source)| {
                json!({"_index": index, "_id": id, "_score": 1.0, "_source": source})
            })
            .collect();

        let mut response = json!({
            "took": 1,
            "timed_out": false,
            "hits": {
                "total": {"value": total, "relation": "eq"},
                "max_score": 1.0,
                "hits": hits
            }
        });
        if let Some(pit_id) = body.pointer("/pit/id") {
            response["pit_id"] = pit_id.clone();
        }
        EngineResponse::new(200, response)
    }

    fn collect(&self, targets: &[String]) -> Vec<(String, String, Value)> {
        targets
            .iter()
            .filter_map(|name| self.indices.get(name).map(|idx| (name, idx)))
            .flat_map(|(name, idx)| {
                idx.documents
                    .iter()
                    .map(move |(id, doc)| (name.clone(), id.clone(), doc.clone()))
            })
            .collect()
    }

    fn delete_by_query(&mut self, index: &str, body: &Value) -> EngineResponse {
        let Some(targets) = self.resolve_read(index) else {
            return index_not_found(index);
        };
        let Some(query) = body.get("query") else {
            return error_response(
                400,
                "action_request_validation_exception",
                "Validation Failed: 1: query is missing;",
            );
        };
        if let Err(reason) = validate_query(query) {
            return error_response(400, "parsing_exception", reason);
        }

        let mut deleted = 0u64;
        for name in &targets {
            let Some(idx) = self.indices.get_mut(name) else {
                continue;
            };
            let mut kept = Vec::with_capacity(idx.documents.len());
            let mut removed = 0u64;
            for (id, doc) in &idx.documents {
                match matches(query, doc) {
                    Ok(true) => removed += 1,
                    Ok(false) => kept.push((id.clone(), doc.clone())),
                    Err(reason) => {
                        return error_response(400, "parsing_exception", reason);
                    }
                }
            }
            if removed > 0 && idx.write_blocked {
                return error_response(
                    403,
                    "cluster_block_exception",
                    format!("index [{name}] blocked by: [FORBIDDEN/8/index write (api)];"),
                );
            }
            idx.documents = kept;
            deleted += removed;
        }

        EngineResponse::new(
            200,
            json!({
                "took": 1,
                "timed_out": false,
                "total": deleted,
                "deleted": deleted,
                "batches": 1,
                "version_conflicts": 0,
                "failures": []
            }),
        )
    }

    fn bulk(&mut self, lines: Vec<Value>) -> EngineResponse {
        if lines.len() % 2 != 0 {
            return error_response(
                400,
                "illegal_argument_exception",
                "The bulk request must be terminated by a newline [\\n]",
            );
        }

        let mut actions = Vec::with_capacity(lines.len() / 2);
        let mut iter = lines.into_iter();
        while let (Some(action), Some(document)) = (iter.next(), iter.next()) {
            let parsed = action.as_object().filter(|map| map.len() == 1).and_then(|map| {
                let (name, meta) = map.iter().next()?;
                let op_type = match name.as_str() {
                    "index" => OpType::Index,
                    "create" => OpType::Create,
                    _ => return None,
                };
                let index = meta.get("_index")?.as_str()?.to_string();
                let id = meta.get("_id").and_then(Value::as_str).map(str::to_string);
                Some((name.clone(), op_type, index, id))
            });
            match parsed {
                Some((name, op_type, index, id)) => actions.push((name, op_type, index, id, document)),
                None => {
                    return error_response(
                        400,
                        "illegal_argument_exception",
                        format!("Malformed action/metadata line [{action}]"),
                    );
                }
            }
        }

        let mut errors = false;
        let mut items = Vec::with_capacity(actions.len());
        for (name, op_type, index, id, document) in actions {
            match self.write_document(&index, id.clone(), document, op_type) {
                Ok(outcome) => items.push(json!({
                    name: {
                        "_index": outcome.index,
                        "_id": outcome.id,
                        "_version": 1,
                        "result": outcome.result,
                        "status": outcome.status
                    }
                })),
                Err(failure) => {
                    errors = true;
                    let mut item = json!({
                        "_index": index,
                        "status": failure.status,
                        "error": failure.body.get("error").cloned().unwrap_or(Value::Null)
                    });
                    if let Some(id) = id {
                        item["_id"] = Value::String(id);
                    }
                    items.push(json!({ name: item }));
                }
            }
        }

        EngineResponse::new(200, json!({"took": 1, "errors": errors, "items": items}))
    }

    fn open_point_in_time(&mut self, index: &str) -> EngineResponse {
        let Some(targets) = self.resolve_read(index) else {
            return index_not_found(index);
        };
        let snapshot = self.collect(&targets);
        let id = format!("pit-{:08}", self.next_sequence());
        self.snapshots.insert(id.clone(), snapshot);
        EngineResponse::new(200, json!({ "id": id }))
    }

    fn index_exists(&self, index: &str) -> EngineResponse {
        if self.indices.contains_key(index) || self.aliases.contains_key(index) {
            EngineResponse::new(200, Value::Null)
        } else {
            EngineResponse::new(404, Value::Null)
        }
    }

    fn create_index(&mut self, index: &str, body: &Value) -> EngineResponse {
        if let Some(problem) = invalid_index_name(index) {
            return error_response(
                400,
                "invalid_index_name_exception",
                format!("Invalid index name [{index}], {problem}"),
            );
        }
        if self.indices.contains_key(index) {
            return error_response(
                400,
                "resource_already_exists_exception",
                format!("index [{index}/memory] already exists"),
            );
        }
        if self.aliases.contains_key(index) {
            return error_response(
                400,
                "invalid_index_name_exception",
                format!("Invalid index name [{index}], already exists as alias"),
            );
        }

        let aliases: Vec<String> = body
            .get("aliases")
            .and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        if let Some(alias) = aliases.iter().find(|alias| self.indices.contains_key(*alias)) {
            return error_response(
                400,
                "invalid_alias_name_exception",
                format!("Invalid alias name [{alias}]: an index or data stream exists with the same name as the alias"),
            );
        }

        self.indices.insert(
            index.to_string(),
            StoredIndex {
                mappings: body.get("mappings").cloned().unwrap_or_else(|| json!({})),
                ..Default::default()
            },
        );
        for alias in aliases {
            self.aliases.entry(alias).or_default().insert(index.to_string());
        }

        EngineResponse::new(
            200,
            json!({"acknowledged": true, "shards_acknowledged": true, "index": index}),
        )
    }

    fn delete_indices(&mut self, indices: &[String]) -> EngineResponse {
        for name in indices {
            if !self.indices.contains_key(name) {
                if self.aliases.contains_key(name) {
                    return error_response(
                        400,
                        "illegal_argument_exception",
                        format!("The provided expression [{name}] matches an alias, specify the corresponding concrete indices instead."),
                    );
                }
                return index_not_found(name);
            }
        }
        for name in indices {
            self.indices.remove(name);
            for members in self.aliases.values_mut() {
                members.remove(name);
            }
        }
        self.aliases.retain(|_, members| !members.is_empty());
        EngineResponse::new(200, json!({"acknowledged": true}))
    }

    fn get_indices(&self, pattern: &str) -> EngineResponse {
        let Some(targets) = self.resolve_read(pattern) else {
            return index_not_found(pattern);
        };
        let mut described = Map::new();
        for name in targets {
            let Some(index) = self.indices.get(&name) else {
                continue;
            };
            let aliases: Map<String, Value> = self
                .aliases_of(&name)
                .into_iter()
                .map(|alias| (alias, json!({})))
                .collect();
            described.insert(
                name.clone(),
                json!({
                    "aliases": aliases,
                    "mappings": index.mappings,
                    "settings": self.settings_for(&name, index)
                }),
            );
        }
        EngineResponse::new(200, Value::Object(described))
    }

    fn get_settings(&self, index: &str) -> EngineResponse {
        let Some(targets) = self.resolve_read(index) else {
            return index_not_found(index);
        };
        let mut described = Map::new();
        for name in targets {
            if let Some(stored) = self.indices.get(&name) {
                described.insert(
                    name.clone(),
                    json!({ "settings": self.settings_for(&name, stored) }),
                );
            }
        }
        EngineResponse::new(200, Value::Object(described))
    }

    fn add_write_block(&mut self, index: &str) -> EngineResponse {
        let Some(targets) = self.resolve_read(index) else {
            return index_not_found(index);
        };
        let acknowledged = self.acknowledge_write_blocks;
        let mut blocked = Vec::new();
        for name in targets {
            if let Some(stored) = self.indices.get_mut(&name) {
                if acknowledged {
                    stored.write_blocked = true;
                }
                blocked.push(json!({"name": name, "blocked": acknowledged}));
            }
        }
        EngineResponse::new(
            200,
            json!({
                "acknowledged": acknowledged,
                "shards_acknowledged": acknowledged,
                "indices": blocked
            }),
        )
    }

    fn reindex(&mut self, body: &Value) -> EngineResponse {
        let source = body.pointer("/source/index").and_then(Value::as_str);
        let destination = body.pointer("/dest/index").and_then(Value::as_str);
        let (Some(source), Some(destination)) = (source, destination) else {
            return error_response(
                400,
                "action_request_validation_exception",
                "Validation Failed: 1: use _all if you really want to copy from all existing indexes;2: index must be specified;",
            );
        };
        let op_type = match body.pointer("/dest/op_type").and_then(Value::as_str) {
            Some("create") => OpType::Create,
            _ => OpType::Index,
        };

        let Some(targets) = self.resolve_read(source) else {
            return index_not_found(source);
        };
        let documents = self.collect(&targets);
        if let Err(response) = self.resolve_write(destination) {
            return response;
        }

        let mut created = 0u64;
        let mut version_conflicts = 0u64;
        for (_, id, document) in documents {
            match self.write_document(destination, Some(id), document, op_type) {
                Ok(_) => created += 1,
                Err(response) if response.status == 409 => version_conflicts += 1,
                Err(_) => {}
            }
        }

        let task_id = format!("{NODE_NAME}:{}", self.next_sequence());
        self.tasks.insert(
            task_id.clone(),
            TaskState {
                pending_polls: self.reindex_pending_polls,
                created,
                version_conflicts,
            },
        );
        self.task_documents.insert(task_id.clone());
        EngineResponse::new(200, json!({ "task": task_id }))
    }

    fn get_task(&mut self, task_id: &str) -> EngineResponse {
        let Some(task) = self.tasks.get_mut(task_id) else {
            return error_response(
                404,
                "resource_not_found_exception",
                format!("task [{task_id}] isn't running and hasn't stored its results"),
            );
        };
        let description = json!({
            "node": NODE_NAME,
            "action": "indices:data/write/reindex",
            "cancellable": true
        });
        if task.pending_polls > 0 {
            task.pending_polls -= 1;
            return EngineResponse::new(200, json!({"completed": false, "task": description}));
        }
        EngineResponse::new(
            200,
            json!({
                "completed": true,
                "task": description,
                "response": {
                    "created": task.created,
                    "version_conflicts": task.version_conflicts,
                    "failures": []
                }
            }),
        )
    }

    fn delete_document(&mut self, index: &str, id: &str) -> EngineResponse {
        if index == TASKS_INDEX {
            let found = self.task_documents.remove(id);
            return deleted_response(index, id, found);
        }
        let Some(targets) = self.resolve_read(index) else {
            return index_not_found(index);
        };
        for name in targets {
            if let Some(stored) = self.indices.get_mut(&name) {
                if let Some(position) = stored.position(id) {
                    if stored.write_blocked {
                        return error_response(
                            403,
                            "cluster_block_exception",
                            format!("index [{name}] blocked by: [FORBIDDEN/8/index write (api)];"),
                        );
                    }
                    stored.documents.remove(position);
                    return deleted_response(&name, id, true);
                }
            }
        }
        deleted_response(index, id, false)
    }

    fn update_aliases(&mut self, body: &Value) -> EngineResponse {
        let Some(actions) = body.get("actions").and_then(Value::as_array) else {
            return error_response(
                400,
                "action_request_validation_exception",
                "Validation Failed: 1: no actions specified;",
            );
        };

        let mut aliases = self.aliases.clone();
        for action in actions {
            let Some((verb, spec)) = action
                .as_object()
                .filter(|map| map.len() == 1)
                .and_then(|map| map.iter().next())
            else {
                return error_response(400, "parsing_exception", format!("malformed alias action [{action}]"));
            };
            let index = spec.get("index").and_then(Value::as_str);
            let alias = spec.get("alias").and_then(Value::as_str);
            let (Some(index), Some(alias)) = (index, alias) else {
                return error_response(
                    400,
                    "action_request_validation_exception",
                    "Validation Failed: 1: index and alias are required;",
                );
            };
            if !self.indices.contains_key(index) {
                return index_not_found(index);
            }

            match verb.as_str() {
                "add" => {
                    if self.indices.contains_key(alias) {
                        return error_response(
                            400,
                            "invalid_alias_name_exception",
                            format!("Invalid alias name [{alias}]: an index or data stream exists with the same name as the alias"),
                        );
                    }
                    aliases.entry(alias.to_string()).or_default().insert(index.to_string());
                }
                "remove" => {
                    let removed = aliases
                        .get_mut(alias)
                        .map(|members| members.remove(index))
                        .unwrap_or(false);
                    if !removed {
                        return error_response(
                            404,
                            "aliases_not_found_exception",
                            format!("aliases [{alias}] missing"),
                        );
                    }
                }
                other => {
                    return error_response(
                        400,
                        "parsing_exception",
                        format!("Unknown alias action [{other}]"),
                    );
                }
            }
        }

        aliases.retain(|_, members| !members.is_empty());
        self.aliases = aliases;
        EngineResponse::new(200, json!({"acknowledged": true}))
    }
}

fn deleted_response(index: &str, id: &str, found: bool) -> EngineResponse {
    let (status, result) = if found {
        (200, "deleted")
    } else {
        (404, "not_found")
    };
    EngineResponse::new(
        status,
        json!({"_index": index, "_id": id, "_version": 1, "result": result}),
    )
}

/// Checks the shape of a query DSL object before any document is read.
fn validate_query(query: &Value) -> Result<(), String> {
    let (kind, clause) = single_entry(query)
        .ok_or_else(|| format!("query malformed, expected a single query type: {query}"))?;

    match kind {
        "match_all" | "match_none" => Ok(()),
        "term" | "terms" | "prefix" => {
            let (field, expected) = single_entry(clause)
                .ok_or_else(|| format!("[{kind}] query requires exactly one field"))?;
            match kind {
                "terms" if !expected.is_array() => Err(format!(
                    "[terms] query on [{field}] requires an array of values"
                )),
                "prefix" if !unwrap_value(expected).is_string() => {
                    Err(format!("[prefix] query on [{field}] requires a string"))
                }
                _ => Ok(()),
            }
        }
        "exists" => clause
            .get("field")
            .and_then(Value::as_str)
            .map(|_| ())
            .ok_or_else(|| "[exists] query requires a field".to_string()),
        "bool" => {
            for key in ["must", "filter", "must_not", "should"] {
                match clause.get(key) {
                    Some(Value::Array(items)) => items.iter().try_for_each(validate_query)?,
                    Some(item) => validate_query(item)?,
                    None => {}
                }
            }
            Ok(())
        }
        other => Err(format!("unknown query [{other}]")),
    }
}

/// Evaluates a query DSL object against a document.
fn matches(query: &Value, document: &Value) -> Result<bool, String> {
    let (kind, clause) = single_entry(query)
        .ok_or_else(|| format!("query malformed, expected a single query type: {query}"))?;

    match kind {
        "match_all" => Ok(true),
        "match_none" => Ok(false),
        "term" => {
            let (field, expected) = single_entry(clause)
                .ok_or_else(|| "[term] query requires exactly one field".to_string())?;
            let expected = unwrap_value(expected);
            Ok(field_values(document, field)
                .iter()
                .any(|actual| values_equal(actual, expected)))
        }
        "terms" => {
            let (field, expected) = single_entry(clause)
                .ok_or_else(|| "[terms] query requires exactly one field".to_string())?;
            let expected = expected
                .as_array()
                .ok_or_else(|| format!("[terms] query on [{field}] requires an array of values"))?;
            Ok(field_values(document, field)
                .iter()
                .any(|actual| expected.iter().any(|e| values_equal(actual, e))))
        }
        "prefix" => {
            let (field, expected) = single_entry(clause)
                .ok_or_else(|| "[prefix] query requires exactly one field".to_string())?;
            let prefix = unwrap_value(expected)
                .as_str()
                .ok_or_else(|| format!("[prefix] query on [{field}] requires a string"))?;
            Ok(field_values(document, field)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|v| v.starts_with(prefix)))
        }
        "exists" => {
            let field = clause
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| "[exists] query requires a field".to_string())?;
            Ok(!field_values(document, field).is_empty())
        }
        "bool" => {
            let clauses = |key: &str| -> Vec<&Value> {
                match clause.get(key) {
                    Some(Value::Array(items)) => items.iter().collect(),
                    Some(item) => vec![item],
                    None => Vec::new(),
                }
            };
            let must = clauses("must");
            let filter = clauses("filter");
            for q in must.iter().chain(filter.iter()) {
                if !matches(q, document)? {
                    return Ok(false);
                }
            }
            for q in clauses("must_not") {
                if matches(q, document)? {
                    return Ok(false);
                }
            }
            let should = clauses("should");
            if !should.is_empty() && must.is_empty() && filter.is_empty() {
                for q in should {
                    if matches(q, document)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            Ok(true)
        }
        other => Err(format!("unknown query [{other}]")),
    }
}

fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    value
        .as_object()
        .filter(|map| map.len() == 1)
        .and_then(|map| map.iter().next())
        .map(|(key, value)| (key.as_str(), value))
}

/// `{"field": {"value": x}}` and `{"field": x}` are equivalent.
fn unwrap_value(value: &Value) -> &Value {
    match value {
        Value::Object(map) => map.get("value").unwrap_or(value),
        other => other,
    }
}

/// Collects the non-null values at a dotted path, flattening arrays.
fn field_values<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![document];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            if let Some(child) = value.get(segment) {
                flatten_into(child, &mut next);
            }
        }
        current = next;
    }
    current.into_iter().filter(|v| !v.is_null()).collect()
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_into(item, out)),
        other => out.push(other),
    }
}

/// Keyword fields compare by string form, so `"1"` matches `1`.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            *s == n.to_string()
        }
        (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s)) => {
            *s == b.to_string()
        }
        _ => false,
    }
}

fn sort_documents(documents: &mut [(String, String, Value)], sort: &Value) -> Result<(), String> {
    let mut keys: Vec<(String, bool)> = Vec::new();
    let clauses: Vec<&Value> = match sort {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for clause in clauses {
        match clause {
            Value::String(field) => keys.push((field.clone(), false)),
            Value::Object(map) => {
                for (field, spec) in map {
                    let order = match spec {
                        Value::String(order) => order.as_str(),
                        Value::Object(options) => options
                            .get("order")
                            .and_then(Value::as_str)
                            .unwrap_or("asc"),
                        _ => return Err(format!("malformed sort for field [{field}]")),
                    };
                    keys.push((field.clone(), order == "desc"));
                }
            }
            other => return Err(format!("malformed sort clause [{other}]")),
        }
    }
    keys.retain(|(field, _)| !field.starts_with('_'));

    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let left = field_values(&a.2, field).into_iter().next();
            let right = field_values(&b.2, field).into_iter().next();
            let ordering = match (left, right) {
                (None, None) => Ordering::Equal,
                // missing values sort last in either direction
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
                (Some(l), Some(r)) => compare_values(l, r),
            };
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (l, r) => l.to_string().cmp(&r.to_string()),
    }
}

/// Checks a document against the explicitly mapped field types.
fn validate_document(mappings: &Value, document: &Value) -> Result<(), String> {
    let (Some(properties), Some(fields)) = (
        mappings.get("properties").and_then(Value::as_object),
        document.as_object(),
    ) else {
        return Ok(());
    };
    let strict = mappings.get("dynamic").and_then(Value::as_str) == Some("strict");
    validate_object(properties, strict, fields, "")
}

fn validate_object(
    properties: &Map<String, Value>,
    strict: bool,
    fields: &Map<String, Value>,
    prefix: &str,
) -> Result<(), String> {
    for (name, value) in fields {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        let Some(definition) = properties.get(name) else {
            if strict {
                return Err(format!(
                    "mapping set to strict, dynamic introduction of [{name}] within [{}] is not allowed",
                    if prefix.is_empty() { "_doc" } else { prefix }
                ));
            }
            continue;
        };
        let mut values = Vec::new();
        flatten_into(value, &mut values);
        for value in values.into_iter().filter(|v| !v.is_null()) {
            validate_value(definition, value, &path)?;
        }
    }
    Ok(())
}

fn validate_value(definition: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(nested) = definition.get("properties").and_then(Value::as_object) {
        let Some(fields) = value.as_object() else {
            return Err(format!(
                "object mapping for [{path}] tried to parse field [{path}] as object, but found a concrete value"
            ));
        };
        let strict = definition.get("dynamic").and_then(Value::as_str) == Some("strict");
        return validate_object(nested, strict, fields, path);
    }

    let field_type = definition
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("object");
    let valid = match field_type {
        "long" | "integer" | "short" | "byte" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.parse::<i64>().is_ok(),
            _ => false,
        },
        "double" | "float" | "half_float" | "scaled_float" => match value {
            Value::Number(_) => true,
            Value::String(s) => s.parse::<f64>().is_ok(),
            _ => false,
        },
        "boolean" => match value {
            Value::Bool(_) => true,
            Value::String(s) => s == "true" || s == "false" || s.is_empty(),
            _ => false,
        },
        "date" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => {
                DateTime::parse_from_rfc3339(s).is_ok()
                    || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }
            _ => false,
        },
        "keyword" | "text" => !value.is_object(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(format!(
            "failed to parse field [{path}] of type [{field_type}]"
        ))
    }
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        document: Value,
        _refresh: Refresh,
    ) -> EngineResult {
        self.run(EngineOperation::IndexDocument, |state| {
            state.index_document(index, id, document)
        })
    }

    async fn search(
        &self,
        index: Option<&str>,
        body: Value,
        from: Option<u64>,
        size: Option<u64>,
    ) -> EngineResult {
        self.run(EngineOperation::Search, |state| {
            state.search(index, &body, from, size)
        })
    }

    async fn delete_by_query(&self, index: &str, body: Value, _refresh: bool) -> EngineResult {
        self.run(EngineOperation::DeleteByQuery, |state| {
            state.delete_by_query(index, &body)
        })
    }

    async fn bulk(&self, lines: Vec<Value>, _refresh: Refresh) -> EngineResult {
        self.run(EngineOperation::Bulk, |state| state.bulk(lines))
    }

    async fn open_point_in_time(&self, index: &str, _keep_alive: &str) -> EngineResult {
        self.run(EngineOperation::OpenPointInTime, |state| {
            state.open_point_in_time(index)
        })
    }

    async fn index_exists(&self, index: &str) -> EngineResult {
        self.run(EngineOperation::IndexExists, |state| state.index_exists(index))
    }

    async fn create_index(&self, index: &str, body: Value) -> EngineResult {
        self.run(EngineOperation::CreateIndex, |state| {
            state.create_index(index, &body)
        })
    }

    async fn delete_indices(&self, indices: &[String]) -> EngineResult {
        self.run(EngineOperation::DeleteIndices, |state| {
            state.delete_indices(indices)
        })
    }

    async fn get_indices(&self, pattern: &str) -> EngineResult {
        self.run(EngineOperation::GetIndices, |state| state.get_indices(pattern))
    }

    async fn get_settings(&self, index: &str) -> EngineResult {
        self.run(EngineOperation::GetSettings, |state| state.get_settings(index))
    }

    async fn add_write_block(&self, index: &str) -> EngineResult {
        self.run(EngineOperation::AddWriteBlock, |state| {
            state.add_write_block(index)
        })
    }

    async fn reindex(&self, body: Value) -> EngineResult {
        self.run(EngineOperation::Reindex, |state| state.reindex(&body))
    }

    async fn get_task(&self, task_id: &str) -> EngineResult {
        self.run(EngineOperation::GetTask, |state| state.get_task(task_id))
    }

    async fn delete_document(&self, index: &str, id: &str) -> EngineResult {
        self.run(EngineOperation::DeleteDocument, |state| {
            state.delete_document(index, id)
        })
    }

    async fn update_aliases(&self, body: Value) -> EngineResult {
        self.run(EngineOperation::UpdateAliases, |state| {
            state.update_aliases(&body)
        })
    }
}
