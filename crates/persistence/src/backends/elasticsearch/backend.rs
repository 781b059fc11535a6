//! The storage struct and the document helpers shared by all kinds.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::codec;
use crate::engine::EngineOperation;
use crate::error::{ResourceError, SearchError, StorageResult};
use crate::index::{DocumentKind, IndexRegistry};
use crate::query::{Filterer, Query};
use crate::store::{ClientSettings, DocumentClient, Hit, ListRequest};
use crate::types::{Document, FieldMask, Page, PageRequest, Timestamped};

#[cfg(feature = "elasticsearch")]
use crate::config::ElasticsearchConfig;
#[cfg(feature = "elasticsearch")]
use crate::engine::{ElasticsearchEngine, SearchEngine};

/// Grafeas storage on an Elasticsearch-style engine.
///
/// Projects live in one shared index; each project gets its own occurrences
/// and notes indices. All reads and writes go through aliases.
#[derive(Debug, Clone)]
pub struct ElasticsearchStorage {
    registry: Arc<IndexRegistry>,
    client: DocumentClient,
}

/// Rejects ids that cannot form the last segment of a resource name.
pub(crate) fn validate_child_id(what: &'static str, id: &str) -> Result<(), SearchError> {
    if id.is_empty() || id.contains('/') {
        return Err(SearchError::InvalidIdentifier {
            what,
            value: id.to_string(),
            message: "must be non-empty and must not contain '/'".to_string(),
        });
    }
    Ok(())
}

impl ElasticsearchStorage {
    /// Creates storage on top of a registry; the registry's engine is shared.
    pub fn new(
        registry: Arc<IndexRegistry>,
        filterer: Arc<dyn Filterer>,
        settings: ClientSettings,
    ) -> Self {
        let client = DocumentClient::new(registry.engine().clone(), filterer, settings);
        Self { registry, client }
    }

    /// Connects to the configured cluster and loads the configured mappings.
    #[cfg(feature = "elasticsearch")]
    pub fn connect(config: &ElasticsearchConfig, filterer: Arc<dyn Filterer>) -> StorageResult<Self> {
        let engine: Arc<dyn SearchEngine> = Arc::new(ElasticsearchEngine::new(config)?);
        let mappings = config.load_mappings()?;
        let registry = Arc::new(IndexRegistry::new(
            engine,
            config.index_prefix.clone(),
            mappings,
        ));
        Ok(Self::new(registry, filterer, ClientSettings::from_config(config)))
    }

    /// Returns the index registry.
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Returns the document client.
    pub fn client(&self) -> &DocumentClient {
        &self.client
    }

    /// Creates the projects index and alias if they do not exist.
    ///
    /// Must run before the first project is created.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> StorageResult<()> {
        let info = self.registry.index_info(DocumentKind::Project, None);
        self.registry.create_index(&info, true).await?;
        info!(alias = ?info.alias, "Storage initialized");
        Ok(())
    }

    pub(crate) async fn find<T: Document>(
        &self,
        alias: &str,
        name: &str,
    ) -> StorageResult<Option<Hit<T>>> {
        self.client.get(alias, Query::term("name", name)).await
    }

    pub(crate) async fn require<T: Document>(&self, alias: &str, name: &str) -> StorageResult<Hit<T>> {
        self.find(alias, name).await?.ok_or_else(|| {
            ResourceError::NotFound {
                kind: T::KIND,
                name: name.to_string(),
            }
            .into()
        })
    }

    pub(crate) async fn ensure_absent<T: Document>(&self, alias: &str, name: &str) -> StorageResult<()> {
        if self.find::<T>(alias, name).await?.is_some() {
            return Err(ResourceError::AlreadyExists {
                kind: T::KIND,
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Returns which of `names` are already stored under `alias`.
    ///
    /// Names are looked up in chunks no larger than the engine's page cap so
    /// every candidate is checked.
    pub(crate) async fn existing_names<T: Document>(
        &self,
        alias: &str,
        names: &[String],
    ) -> StorageResult<HashSet<String>> {
        let chunk_size = self.client.settings().max_page_size.max(1) as usize;
        let mut taken = HashSet::new();
        for chunk in names.chunks(chunk_size) {
            let found = self
                .client
                .list::<T>(ListRequest::new(alias).query(Query::terms("name", chunk.iter().map(String::as_str))))
                .await?;
            taken.extend(found.hits.into_iter().map(|hit| hit.document.name().to_string()));
        }
        debug!(
            alias = %alias,
            checked = names.len(),
            taken = taken.len(),
            "Checked for existing names"
        );
        Ok(taken)
    }

    pub(crate) async fn list_documents<T: Document>(
        &self,
        alias: &str,
        filter: &str,
        page: &PageRequest,
        base: Option<Query>,
    ) -> StorageResult<Page<T>> {
        let mut request = ListRequest::new(alias).filter(filter).page(page.clone());
        if let Some(base) = base {
            request = request.query(base);
        }
        Ok(self.client.list::<T>(request).await?.into_page())
    }

    /// Fetches the stored document, merges `update` into it and writes it back.
    pub(crate) async fn update_document<T: Document + Timestamped>(
        &self,
        alias: &str,
        name: &str,
        update: T,
        mask: &FieldMask,
    ) -> StorageResult<T> {
        let existing: Hit<T> = self.require(alias, name).await?;

        let mut merged = if mask.is_empty() {
            update
        } else {
            let mut target = codec::encode_document(&existing.document)?;
            mask.apply(&mut target, &codec::encode_document(&update)?);
            codec::decode_document::<T>(&target).map_err(|e| SearchError::InvalidFieldMask {
                paths: mask.paths.join(","),
                message: e.to_string(),
            })?
        };
        merged.set_name(existing.document.name().to_string());
        merged.set_create_time(existing.document.create_time());
        merged.set_update_time(Some(Utc::now()));

        self.client.update(alias, &existing.id, &merged).await?;
        debug!(name = %name, paths = ?mask.paths, "Updated document");
        Ok(merged)
    }

    pub(crate) async fn delete_document(&self, alias: &str, name: &str) -> StorageResult<()> {
        self.client.delete(alias, Query::term("name", name)).await?;
        Ok(())
    }

    /// Deletes the concrete indices behind a project's aliases.
    pub(crate) async fn delete_project_indices(&self, project_id: &str) -> StorageResult<()> {
        let mut indices = Vec::new();
        for alias in [
            self.registry.occurrences_alias(project_id),
            self.registry.notes_alias(project_id),
        ] {
            indices.extend(self.registry.resolve_alias(&alias).await?);
        }
        if indices.is_empty() {
            debug!(project_id = %project_id, "Project has no indices");
            return Ok(());
        }

        let res = self.registry.engine().delete_indices(&indices).await?;
        if !res.is_not_found() {
            res.require_success(EngineOperation::DeleteIndices)?;
        }
        info!(project_id = %project_id, indices = ?indices, "Deleted project indices");
        Ok(())
    }
}
