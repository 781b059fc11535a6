//! Elasticsearch engine backed by the official client.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{
    IndicesAddBlockParts, IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts,
    IndicesGetParts, IndicesGetSettingsParts,
};
use elasticsearch::params;
use elasticsearch::tasks::TasksGetParts;
use elasticsearch::{
    BulkParts, DeleteByQueryParts, DeleteParts, Elasticsearch, IndexParts, OpenPointInTimeParts,
    SearchParts,
};
use serde_json::Value;
use tracing::trace;

use crate::config::{ElasticsearchAuth, ElasticsearchConfig};
use crate::error::{BackendError, StorageResult};

use super::{EngineOperation, EngineResponse, EngineResult, Refresh, SearchEngine};

const BACKEND_NAME: &str = "elasticsearch";

/// A [`SearchEngine`] talking to an Elasticsearch cluster.
pub struct ElasticsearchEngine {
    client: Elasticsearch,
    node: String,
}

impl Debug for ElasticsearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchEngine")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchEngine {
    /// Connects to the first configured node.
    pub fn new(config: &ElasticsearchConfig) -> StorageResult<Self> {
        let node = config
            .nodes
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string());
        let client = Self::build_client(&node, config)?;
        Ok(Self { client, node })
    }

    /// Wraps an already configured client.
    pub fn from_client(client: Elasticsearch) -> Self {
        Self {
            client,
            node: "custom".to_string(),
        }
    }

    fn build_client(node: &str, config: &ElasticsearchConfig) -> StorageResult<Elasticsearch> {
        let parsed_url: elasticsearch::http::Url = node.parse().map_err(|e| {
            BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Invalid URL: {}", e),
            }
        })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);

        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                ElasticsearchAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                ElasticsearchAuth::Bearer { token } => {
                    builder.auth(Credentials::Bearer(token.clone()))
                }
            };
        }

        let transport = builder.build().map_err(|e| BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("Failed to build transport: {}", e),
        })?;

        Ok(Elasticsearch::new(transport))
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &Elasticsearch {
        &self.client
    }
}

fn transport_error(operation: EngineOperation, e: elasticsearch::Error) -> BackendError {
    BackendError::Transport {
        operation: operation.to_string(),
        message: e.to_string(),
    }
}

fn es_refresh(refresh: Refresh) -> params::Refresh {
    match refresh {
        Refresh::True => params::Refresh::True,
        Refresh::False => params::Refresh::False,
        Refresh::WaitFor => params::Refresh::WaitFor,
    }
}

/// Reads status and body. An empty body (HEAD requests) becomes `Null`.
async fn read_response(
    operation: EngineOperation,
    sent: Result<Response, elasticsearch::Error>,
) -> EngineResult {
    let response = sent.map_err(|e| transport_error(operation, e))?;
    let status = response.status_code().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(operation, e))?;

    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|e| BackendError::Decode {
            operation: operation.to_string(),
            message: format!("{} (status {}): {}", e, status, text),
        })?
    };

    trace!(operation = %operation, status, "Engine call completed");
    Ok(EngineResponse::new(status, body))
}

#[async_trait]
impl SearchEngine for ElasticsearchEngine {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        document: Value,
        refresh: Refresh,
    ) -> EngineResult {
        let parts = match id {
            Some(id) => IndexParts::IndexId(index, id),
            None => IndexParts::Index(index),
        };
        let sent = self
            .client
            .index(parts)
            .refresh(es_refresh(refresh))
            .body(document)
            .send()
            .await;
        read_response(EngineOperation::IndexDocument, sent).await
    }

    async fn search(
        &self,
        index: Option<&str>,
        body: Value,
        from: Option<u64>,
        size: Option<u64>,
    ) -> EngineResult {
        let indices: Vec<&str> = index.into_iter().collect();
        let parts = if indices.is_empty() {
            SearchParts::None
        } else {
            SearchParts::Index(&indices)
        };
        let mut request = self.client.search(parts).body(body);
        if let Some(from) = from {
            request = request.from(from as i64);
        }
        if let Some(size) = size {
            request = request.size(size as i64);
        }
        let sent = request.send().await;
        read_response(EngineOperation::Search, sent).await
    }

    async fn delete_by_query(&self, index: &str, body: Value, refresh: bool) -> EngineResult {
        let sent = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .refresh(refresh)
            .body(body)
            .send()
            .await;
        read_response(EngineOperation::DeleteByQuery, sent).await
    }

    async fn bulk(&self, lines: Vec<Value>, refresh: Refresh) -> EngineResult {
        let body: Vec<JsonBody<Value>> = lines.into_iter().map(JsonBody::new).collect();
        let sent = self
            .client
            .bulk(BulkParts::None)
            .refresh(es_refresh(refresh))
            .body(body)
            .send()
            .await;
        read_response(EngineOperation::Bulk, sent).await
    }

    async fn open_point_in_time(&self, index: &str, keep_alive: &str) -> EngineResult {
        let sent = self
            .client
            .open_point_in_time(OpenPointInTimeParts::Index(&[index]))
            .keep_alive(keep_alive)
            .send()
            .await;
        read_response(EngineOperation::OpenPointInTime, sent).await
    }

    async fn index_exists(&self, index: &str) -> EngineResult {
        let sent = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await;
        read_response(EngineOperation::IndexExists, sent).await
    }

    async fn create_index(&self, index: &str, body: Value) -> EngineResult {
        let sent = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body)
            .send()
            .await;
        read_response(EngineOperation::CreateIndex, sent).await
    }

    async fn delete_indices(&self, indices: &[String]) -> EngineResult {
        let names: Vec<&str> = indices.iter().map(String::as_str).collect();
        let sent = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&names))
            .send()
            .await;
        read_response(EngineOperation::DeleteIndices, sent).await
    }

    async fn get_indices(&self, pattern: &str) -> EngineResult {
        let sent = self
            .client
            .indices()
            .get(IndicesGetParts::Index(&[pattern]))
            .send()
            .await;
        read_response(EngineOperation::GetIndices, sent).await
    }

    async fn get_settings(&self, index: &str) -> EngineResult {
        let sent = self
            .client
            .indices()
            .get_settings(IndicesGetSettingsParts::Index(&[index]))
            .send()
            .await;
        read_response(EngineOperation::GetSettings, sent).await
    }

    async fn add_write_block(&self, index: &str) -> EngineResult {
        let sent = self
            .client
            .indices()
            .add_block(IndicesAddBlockParts::IndexBlock(&[index], "write"))
            .send()
            .await;
        read_response(EngineOperation::AddWriteBlock, sent).await
    }

    async fn reindex(&self, body: Value) -> EngineResult {
        let sent = self
            .client
            .reindex()
            .wait_for_completion(false)
            .body(body)
            .send()
            .await;
        read_response(EngineOperation::Reindex, sent).await
    }

    async fn get_task(&self, task_id: &str) -> EngineResult {
        let sent = self
            .client
            .tasks()
            .get(TasksGetParts::TaskId(task_id))
            .send()
            .await;
        read_response(EngineOperation::GetTask, sent).await
    }

    async fn delete_document(&self, index: &str, id: &str) -> EngineResult {
        let sent = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await;
        read_response(EngineOperation::DeleteDocument, sent).await
    }

    async fn update_aliases(&self, body: Value) -> EngineResult {
        let sent = self
            .client
            .indices()
            .update_aliases()
            .body(body)
            .send()
            .await;
        read_response(EngineOperation::UpdateAliases, sent).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_node_url() {
        let config = ElasticsearchConfig {
            nodes: vec!["not a url".to_string()],
            ..Default::default()
        };
        let err = ElasticsearchEngine::new(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_builds_with_auth() {
        let config = ElasticsearchConfig {
            auth: Some(ElasticsearchAuth::Basic {
                username: "elastic".to_string(),
                password: "changeme".to_string(),
            }),
            disable_certificate_validation: true,
            ..Default::default()
        };
        let engine = ElasticsearchEngine::new(&config).unwrap();
        assert_eq!(engine.name(), "elasticsearch");
        assert!(format!("{engine:?}").contains("localhost:9200"));
    }
}
