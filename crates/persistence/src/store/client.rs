//! The document client.

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use crate::codec::{
    self, BulkResponse, DeleteByQueryResponse, IndexDocResponse, PitReference,
    PointInTimeResponse, SearchBody, SearchHit, SearchResponse,
};
use crate::engine::{EngineOperation, EngineResponse, SearchEngine};
use crate::error::{BackendError, ResourceError, SearchError, StorageResult};
use crate::query::{Filterer, Query};
use crate::types::PageCursor;

use super::{BatchOutcome, ClientSettings, Hit, ListRequest, ListResponse};

/// CRUD, listing and bulk ingestion against one index or alias at a time.
#[derive(Clone)]
pub struct DocumentClient {
    engine: Arc<dyn SearchEngine>,
    filterer: Arc<dyn Filterer>,
    settings: ClientSettings,
}

impl Debug for DocumentClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentClient")
            .field("engine", &self.engine.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn is_missing_index(res: &EngineResponse) -> bool {
    res.is_not_found() && res.error_type() == Some("index_not_found_exception")
}

fn decode_hits<T: DeserializeOwned>(hits: Vec<SearchHit>) -> StorageResult<Vec<Hit<T>>> {
    hits.into_iter()
        .map(|hit| {
            Ok(Hit {
                document: codec::decode_document(&hit.source)?,
                id: hit.id,
            })
        })
        .collect()
}

impl DocumentClient {
    /// Creates a client.
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        filterer: Arc<dyn Filterer>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            engine,
            filterer,
            settings,
        }
    }

    /// Returns the client settings.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Writes a new document and returns the engine-assigned id.
    #[instrument(skip(self, document), fields(index = %index))]
    pub async fn create<T: Serialize>(&self, index: &str, document: &T) -> StorageResult<String> {
        let body = codec::encode_document(document)?;
        let res = self
            .engine
            .index_document(index, None, body, self.settings.refresh)
            .await?;

        if !res.is_success() {
            error!(status = res.status, body = %res.body, "Failed to create document");
            return Err(res.into_error(EngineOperation::IndexDocument).into());
        }

        let created: IndexDocResponse = res.decode(EngineOperation::IndexDocument)?;
        debug!(id = %created.id, "Created document");
        Ok(created.id)
    }

    /// Returns the first document matching `query`.
    ///
    /// A missing index is treated like an empty one.
    #[instrument(skip(self, query), fields(index = %index))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        index: &str,
        query: Query,
    ) -> StorageResult<Option<Hit<T>>> {
        let body = SearchBody::with_query(query).to_value()?;
        let res = self.engine.search(Some(index), body, None, Some(1)).await?;

        if is_missing_index(&res) {
            debug!("Index does not exist");
            return Ok(None);
        }
        let res = res.require_success(EngineOperation::Search)?;
        let found: SearchResponse = res.decode(EngineOperation::Search)?;

        match found.hits.hits.into_iter().next() {
            Some(hit) => Ok(Some(Hit {
                document: codec::decode_document(&hit.source)?,
                id: hit.id,
            })),
            None => Ok(None),
        }
    }

    /// Lists documents, optionally one page at a time.
    ///
    /// Paginated requests search a point-in-time snapshot: the first page
    /// opens one, later pages reuse the snapshot id carried by the token. A
    /// token issued for another index or alias is rejected.
    #[instrument(skip(self, request), fields(index = %request.index, filter = %request.filter))]
    pub async fn list<T: DeserializeOwned>(
        &self,
        request: ListRequest,
    ) -> StorageResult<ListResponse<T>> {
        let mut queries = Vec::new();
        if let Some(query) = request.query {
            queries.push(query);
        }
        if !request.filter.is_empty() {
            let compiled = self
                .filterer
                .parse_expression(&request.filter)
                .map_err(|e| SearchError::InvalidFilter {
                    filter: request.filter.clone(),
                    message: e.message,
                })?;
            queries.push(compiled);
        }

        let mut body = SearchBody {
            query: (!queries.is_empty()).then(|| Query::all_of(queries)),
            sort: request.sort.as_ref().map(|sort| sort.to_value()),
            ..Default::default()
        };

        if !request.page.is_paginated() {
            let res = self
                .engine
                .search(
                    Some(&request.index),
                    body.to_value()?,
                    None,
                    Some(u64::from(self.settings.max_page_size)),
                )
                .await?
                .require_success(EngineOperation::Search)?;
            let found: SearchResponse = res.decode(EngineOperation::Search)?;
            let total = found.total();
            if total > u64::from(self.settings.max_page_size) {
                warn!(total, cap = self.settings.max_page_size, "Unpaginated list truncated");
            }
            return Ok(ListResponse {
                hits: decode_hits(found.hits.hits)?,
                total,
                next_page_token: None,
            });
        }

        let page_size = u64::from(request.page.page_size.min(self.settings.max_page_size).max(1));
        let (snapshot_id, offset) = if request.page.page_token.is_empty() {
            (self.open_snapshot(&request.index).await?, 0)
        } else {
            let cursor = PageCursor::decode_for(&request.page.page_token, &request.index)?;
            (cursor.snapshot_id().to_string(), cursor.offset())
        };

        body.pit = Some(PitReference {
            id: snapshot_id.clone(),
            keep_alive: self.settings.pit_keep_alive.clone(),
        });
        body.track_total_hits = Some(true);

        let res = self
            .engine
            .search(None, body.to_value()?, Some(offset), Some(page_size))
            .await?;
        if !res.is_success() {
            error!(status = res.status, body = %res.body, "Point-in-time search failed");
            return Err(res.into_error(EngineOperation::Search).into());
        }
        let found: SearchResponse = res.decode(EngineOperation::Search)?;
        let total = found.total();

        // the engine may hand back a refreshed snapshot id
        let snapshot_id = found.pit_id.clone().unwrap_or(snapshot_id);
        let next_offset = offset + page_size;
        let next_page_token = (next_offset < total)
            .then(|| PageCursor::new(snapshot_id, request.index.as_str(), next_offset).encode());

        debug!(offset, page_size, total, has_next = next_page_token.is_some(), "Listed page");
        Ok(ListResponse {
            hits: decode_hits(found.hits.hits)?,
            total,
            next_page_token,
        })
    }

    async fn open_snapshot(&self, index: &str) -> StorageResult<String> {
        let res = self
            .engine
            .open_point_in_time(index, &self.settings.pit_keep_alive)
            .await?
            .require_success(EngineOperation::OpenPointInTime)?;
        let pit: PointInTimeResponse = res.decode(EngineOperation::OpenPointInTime)?;
        debug!(index = %index, "Opened point in time");
        Ok(pit.id)
    }

    /// Replaces the document stored under `id`.
    #[instrument(skip(self, document), fields(index = %index, id = %id))]
    pub async fn update<T: Serialize>(&self, index: &str, id: &str, document: &T) -> StorageResult<()> {
        let body = codec::encode_document(document)?;
        let res = self
            .engine
            .index_document(index, Some(id), body, self.settings.refresh)
            .await?;

        if !res.is_success() {
            error!(status = res.status, body = %res.body, "Failed to update document");
            return Err(res.into_error(EngineOperation::IndexDocument).into());
        }
        debug!("Updated document");
        Ok(())
    }

    /// Deletes every document matching `query` and returns how many were deleted.
    ///
    /// Deleting nothing, including from a missing index, is a not-found error.
    #[instrument(skip(self, query), fields(index = %index))]
    pub async fn delete(&self, index: &str, query: Query) -> StorageResult<u64> {
        let body = SearchBody::with_query(query).to_value()?;
        let res = self
            .engine
            .delete_by_query(index, body, self.settings.refresh.as_bool())
            .await?;

        if is_missing_index(&res) {
            return Err(ResourceError::NothingDeleted {
                index: index.to_string(),
            }
            .into());
        }
        let res = res.require_success(EngineOperation::DeleteByQuery)?;
        let outcome: DeleteByQueryResponse = res.decode(EngineOperation::DeleteByQuery)?;

        if outcome.deleted == 0 {
            return Err(ResourceError::NothingDeleted {
                index: index.to_string(),
            }
            .into());
        }
        debug!(deleted = outcome.deleted, "Deleted documents");
        Ok(outcome.deleted)
    }

    /// Writes `documents` with a single bulk request.
    ///
    /// Items are matched back to their documents by position. A failure of
    /// the request as a whole yields no created documents and one error.
    #[instrument(skip(self, documents), fields(index = %index, count = documents.len()))]
    pub async fn bulk_create<T: Serialize>(&self, index: &str, documents: Vec<T>) -> BatchOutcome<T> {
        if documents.is_empty() {
            return BatchOutcome::default();
        }
        match self.try_bulk_create(index, documents).await {
            Ok(outcome) => {
                debug!(
                    created = outcome.created.len(),
                    failed = outcome.errors.len(),
                    "Bulk create finished"
                );
                outcome
            }
            Err(e) => {
                error!(error = %e, "Bulk create failed");
                BatchOutcome::failed(e)
            }
        }
    }

    async fn try_bulk_create<T: Serialize>(
        &self,
        index: &str,
        documents: Vec<T>,
    ) -> StorageResult<BatchOutcome<T>> {
        let encoded = documents
            .iter()
            .map(codec::encode_document)
            .collect::<StorageResult<Vec<_>>>()?;
        let lines = codec::bulk_index_lines(index, encoded);

        let res = self
            .engine
            .bulk(lines, self.settings.refresh)
            .await?
            .require_success(EngineOperation::Bulk)?;
        let response: BulkResponse = res.decode(EngineOperation::Bulk)?;

        if response.items.len() != documents.len() {
            return Err(BackendError::Decode {
                operation: EngineOperation::Bulk.to_string(),
                message: format!(
                    "expected {} items, got {}",
                    documents.len(),
                    response.items.len()
                ),
            }
            .into());
        }

        let mut outcome = BatchOutcome::default();
        for (position, (document, item)) in documents.into_iter().zip(response.items).enumerate() {
            match item.status() {
                Some(status) if (200..300).contains(&status.status) => {
                    outcome.created.push(document);
                }
                Some(status) => {
                    let (error_type, reason) = status
                        .error
                        .clone()
                        .map(|cause| (cause.error_type, cause.reason.unwrap_or_default()))
                        .unwrap_or_default();
                    warn!(position, status = status.status, error_type = %error_type, "Bulk item failed");
                    outcome.errors.push(
                        BackendError::BulkItem {
                            position,
                            status: status.status,
                            error_type,
                            reason,
                        }
                        .into(),
                    );
                }
                None => outcome.errors.push(
                    BackendError::Decode {
                        operation: EngineOperation::Bulk.to_string(),
                        message: format!("item {} carries no index or create result", position),
                    }
                    .into(),
                ),
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InMemoryEngine, InjectedFailure, Refresh};
    use crate::query::FilterError;
    use crate::types::PageRequest;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        rank: i64,
    }

    fn doc(name: &str, rank: i64) -> Doc {
        Doc {
            name: name.to_string(),
            rank,
        }
    }

    struct TermFilterer;

    impl Filterer for TermFilterer {
        fn parse_expression(&self, filter: &str) -> Result<Query, FilterError> {
            let (field, value) = filter
                .split_once("==")
                .ok_or_else(|| FilterError::new("expected field == value"))?;
            Ok(Query::term(field.trim(), value.trim().trim_matches('"')))
        }
    }

    fn client(engine: Arc<InMemoryEngine>, max_page_size: u32) -> DocumentClient {
        DocumentClient::new(
            engine,
            Arc::new(TermFilterer),
            ClientSettings {
                refresh: Refresh::True,
                pit_keep_alive: "1m".to_string(),
                max_page_size,
            },
        )
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let engine = Arc::new(InMemoryEngine::new());
        let client = client(engine, 100);

        let id = client.create("docs", &doc("a", 1)).await.unwrap();
        let hit: Hit<Doc> = client
            .get("docs", Query::term("name", "a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, id);
        assert_eq!(hit.document, doc("a", 1));

        let missing: Option<Hit<Doc>> = client.get("docs", Query::term("name", "b")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_from_missing_index() {
        let client = client(Arc::new(InMemoryEngine::new()), 100);
        let missing: Option<Hit<Doc>> = client.get("nope", Query::match_all()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_document() {
        let engine = Arc::new(InMemoryEngine::new());
        let client = client(engine.clone(), 100);
        let id = client.create("docs", &doc("a", 1)).await.unwrap();

        client.update("docs", &id, &doc("a", 2)).await.unwrap();

        assert_eq!(engine.documents("docs"), vec![json!({"name": "a", "rank": 2})]);
    }

    #[tokio::test]
    async fn test_delete_nothing_is_not_found() {
        let engine = Arc::new(InMemoryEngine::new());
        let client = client(engine, 100);
        client.create("docs", &doc("a", 1)).await.unwrap();

        let err = client.delete("docs", Query::term("name", "b")).await.unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(client.delete("docs", Query::term("name", "a")).await.unwrap(), 1);
        let gone: Option<Hit<Doc>> = client.get("docs", Query::term("name", "a")).await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_paginated_list_walks_every_document() {
        let engine = Arc::new(InMemoryEngine::new());
        let client = client(engine, 100);
        for i in 0..7 {
            client.create("docs", &doc(&format!("d{i}"), i)).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut page = PageRequest::first(3);
        let mut pages = 0;
        loop {
            let res: ListResponse<Doc> = client
                .list(ListRequest::new("docs").page(page.clone()))
                .await
                .unwrap();
            assert_eq!(res.total, 7);
            pages += 1;
            seen.extend(res.hits.into_iter().map(|h| h.document.name));
            match res.next_page_token {
                Some(token) => page = PageRequest::next(3, token),
                None => break,
            }
        }
        assert_eq!(pages, 3);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7);
    }

    #[tokio::test]
    async fn test_last_full_page_has_no_token() {
        let engine = Arc::new(InMemoryEngine::new());
        let client = client(engine, 100);
        for i in 0..4 {
            client.create("docs", &doc(&format!("d{i}"), i)).await.unwrap();
        }
        let first: ListResponse<Doc> = client
            .list(ListRequest::new("docs").page(PageRequest::first(2)))
            .await
            .unwrap();
        let token = first.next_page_token.unwrap();
        let second: ListResponse<Doc> = client
            .list(ListRequest::new("docs").page(PageRequest::next(2, token)))
            .await
            .unwrap();
        assert_eq!(second.hits.len(), 2);
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_filter_and_base_query_are_combined() {
        let engine = Arc::new(InMemoryEngine::new());
        let client = client(engine.clone(), 100);
        client.create("docs", &doc("a", 1)).await.unwrap();
        client.create("docs", &doc("b", 1)).await.unwrap();
        client.create("docs", &doc("a", 2)).await.unwrap();

        let res: ListResponse<Doc> = client
            .list(
                ListRequest::new("docs")
                    .query(Query::term("rank", 1))
                    .filter("name == \"a\""),
            )
            .await
            .unwrap();
        assert_eq!(res.hits.len(), 1);
        assert_eq!(res.hits[0].document, doc("a", 1));
        assert!(res.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_invalid_filter_and_token() {
        let client = client(Arc::new(InMemoryEngine::new()), 100);
        let err = client
            .list::<Doc>(ListRequest::new("docs").filter("garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::StorageError::Search(SearchError::InvalidFilter { .. })));

        let err = client
            .list::<Doc>(ListRequest::new("docs").page(PageRequest::next(5, "%%%")))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::StorageError::Search(SearchError::InvalidPageToken { .. })));
    }

    #[tokio::test]
    async fn test_page_size_is_capped() {
        let engine = Arc::new(InMemoryEngine::new());
        let client = client(engine, 2);
        for i in 0..5 {
            client.create("docs", &doc(&format!("d{i}"), i)).await.unwrap();
        }
        let res: ListResponse<Doc> = client
            .list(ListRequest::new("docs").page(PageRequest::first(50)))
            .await
            .unwrap();
        assert_eq!(res.hits.len(), 2);
        assert!(res.next_page_token.is_some());

        let unpaginated: ListResponse<Doc> = client.list(ListRequest::new("docs")).await.unwrap();
        assert_eq!(unpaginated.hits.len(), 2);
        assert_eq!(unpaginated.total, 5);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_internal() {
        let engine = Arc::new(InMemoryEngine::new());
        let client = client(engine.clone(), 100);
        for i in 0..3 {
            client.create("docs", &doc(&format!("d{i}"), i)).await.unwrap();
        }
        let first: ListResponse<Doc> = client
            .list(ListRequest::new("docs").page(PageRequest::first(1)))
            .await
            .unwrap();
        engine.expire_point_in_times();

        let err = client
            .list::<Doc>(ListRequest::new("docs").page(PageRequest::next(1, first.next_page_token.unwrap())))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Internal);
    }

    #[tokio::test]
    async fn test_bulk_create_partial_failure() {
        let engine = Arc::new(InMemoryEngine::new());
        engine
            .create_index(
                "docs",
                json!({"mappings": {"properties": {"rank": {"type": "long"}}}}),
            )
            .await
            .unwrap();
        let client = client(engine.clone(), 100);

        let documents = vec![
            json!({"name": "a", "rank": 1}),
            json!({"name": "b", "rank": "high"}),
            json!({"name": "c", "rank": 3}),
        ];
        let outcome = client.bulk_create("docs", documents).await;
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0],
            crate::error::StorageError::Backend(BackendError::BulkItem { position: 1, status: 400, .. })
        ));
        assert_eq!(engine.document_count("docs"), 2);
    }

    #[tokio::test]
    async fn test_bulk_create_request_failure() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.fail_next(EngineOperation::Bulk, InjectedFailure::transport("connection refused"));
        let client = client(engine.clone(), 100);

        let outcome = client.bulk_create("docs", vec![doc("a", 1), doc("b", 2)]).await;
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.errors.len(), 1);

        let empty = client.bulk_create::<Doc>("docs", Vec::new()).await;
        assert!(empty.is_complete());
        assert_eq!(engine.call_count(EngineOperation::Bulk), 1);
    }
}
