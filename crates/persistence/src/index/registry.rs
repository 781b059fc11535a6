//! Index registry: current index names and idempotent index creation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};

use crate::codec;
use crate::engine::{EngineOperation, SearchEngine};
use crate::error::StorageResult;

use super::naming::{IndexNameParts, IndexNaming};
use super::{DocumentKind, MappingSet};

/// A concrete index, the alias it is served under and its document kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Concrete, versioned index name.
    pub index: String,
    /// Alias bound to the index, if any.
    pub alias: Option<String>,
    /// Kind of document stored in the index.
    pub kind: DocumentKind,
}

impl IndexInfo {
    /// Creates index info.
    pub fn new(index: impl Into<String>, alias: Option<String>, kind: DocumentKind) -> Self {
        Self {
            index: index.into(),
            alias,
            kind,
        }
    }
}

/// Resolves names against the loaded mappings and creates indices.
#[derive(Debug)]
pub struct IndexRegistry {
    engine: Arc<dyn SearchEngine>,
    naming: IndexNaming,
    mappings: MappingSet,
}

impl IndexRegistry {
    /// Creates a registry for indices under `prefix`.
    pub fn new(engine: Arc<dyn SearchEngine>, prefix: impl Into<String>, mappings: MappingSet) -> Self {
        Self {
            engine,
            naming: IndexNaming::new(prefix),
            mappings,
        }
    }

    /// Returns the engine the registry creates indices with.
    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    /// Returns the deployment prefix.
    pub fn prefix(&self) -> &str {
        self.naming.prefix()
    }

    /// Returns the loaded mappings.
    pub fn mappings(&self) -> &MappingSet {
        &self.mappings
    }

    /// Returns the current mapping version for a kind.
    pub fn latest_version(&self, kind: DocumentKind) -> &str {
        self.mappings.version(kind)
    }

    /// Returns the current concrete index name for a kind.
    pub fn index_name(&self, kind: DocumentKind, project_id: Option<&str>) -> String {
        self.naming
            .index_name(kind, self.latest_version(kind), project_id)
    }

    /// Returns the alias name for a kind.
    pub fn alias_name(&self, kind: DocumentKind, project_id: Option<&str>) -> String {
        self.naming.alias_name(kind, project_id)
    }

    /// Returns the current index and its alias for a kind.
    pub fn index_info(&self, kind: DocumentKind, project_id: Option<&str>) -> IndexInfo {
        IndexInfo::new(
            self.index_name(kind, project_id),
            Some(self.alias_name(kind, project_id)),
            kind,
        )
    }

    /// `{prefix}-{version}-projects`
    pub fn projects_index(&self) -> String {
        self.index_name(DocumentKind::Project, None)
    }

    /// `{prefix}-projects`
    pub fn projects_alias(&self) -> String {
        self.alias_name(DocumentKind::Project, None)
    }

    /// `{prefix}-{version}-{project_id}-occurrences`
    pub fn occurrences_index(&self, project_id: &str) -> String {
        self.index_name(DocumentKind::Occurrence, Some(project_id))
    }

    /// `{prefix}-{project_id}-occurrences`
    pub fn occurrences_alias(&self, project_id: &str) -> String {
        self.alias_name(DocumentKind::Occurrence, Some(project_id))
    }

    /// `{prefix}-{version}-{project_id}-notes`
    pub fn notes_index(&self, project_id: &str) -> String {
        self.index_name(DocumentKind::Note, Some(project_id))
    }

    /// `{prefix}-{project_id}-notes`
    pub fn notes_alias(&self, project_id: &str) -> String {
        self.alias_name(DocumentKind::Note, Some(project_id))
    }

    /// Parses a concrete index name under this registry's prefix.
    pub fn parse_index_name(&self, index_name: &str) -> Option<IndexNameParts> {
        self.naming.parse(index_name)
    }

    /// Returns the name `index_name` should have at its kind's current version.
    ///
    /// Names that do not parse to a known kind are returned unchanged.
    pub fn increment_index_version(&self, index_name: &str) -> String {
        match self.parse_index_name(index_name) {
            Some(parts) => self.index_name(parts.kind, parts.project_id.as_deref()),
            None => index_name.to_string(),
        }
    }

    /// Returns the alias an index is served under, if its name parses.
    pub fn alias_for_index(&self, index_name: &str) -> Option<String> {
        self.parse_index_name(index_name)
            .map(|parts| self.alias_name(parts.kind, parts.project_id.as_deref()))
    }

    /// Creates an index with its kind's current mapping, binding the alias if one is given.
    ///
    /// With `check_exists` an existing index short-circuits creation. An
    /// index created concurrently (`resource_already_exists_exception`) also
    /// counts as success.
    #[instrument(skip(self), fields(index = %info.index, kind = %info.kind))]
    pub async fn create_index(&self, info: &IndexInfo, check_exists: bool) -> StorageResult<()> {
        if check_exists {
            let res = self.engine.index_exists(&info.index).await?;
            match res.status {
                200 => {
                    debug!("Index already exists");
                    return Ok(());
                }
                404 => {}
                status => {
                    error!(status, "Unexpected status checking if index exists");
                    return Err(res.into_error(EngineOperation::IndexExists).into());
                }
            }
        }

        let mapping = self.mappings.get(info.kind);
        let body = codec::create_index_body(&mapping.mappings, info.alias.as_deref());
        let res = self.engine.create_index(&info.index, body).await?;

        if res.is_success() {
            info!(version = %mapping.version, alias = ?info.alias, "Created index");
            return Ok(());
        }
        if res.status == 400 && res.error_type() == Some("resource_already_exists_exception") {
            info!("Index already exists");
            return Ok(());
        }

        error!(status = res.status, body = %res.body, "Failed to create index");
        Err(res.into_error(EngineOperation::CreateIndex).into())
    }

    /// Returns the concrete indices an alias points to, empty if the alias does not exist.
    pub async fn resolve_alias(&self, alias: &str) -> StorageResult<Vec<String>> {
        let res = self.engine.get_indices(alias).await?;
        if res.is_not_found() {
            return Ok(Vec::new());
        }
        let res = res.require_success(EngineOperation::GetIndices)?;
        let indices: Map<String, Value> = res.decode(EngineOperation::GetIndices)?;
        Ok(indices.into_iter().map(|(name, _)| name).collect())
    }

    /// Returns every concrete index name known to the engine.
    pub async fn list_indices(&self) -> StorageResult<Vec<String>> {
        let res = self
            .engine
            .get_indices("_all")
            .await?
            .require_success(EngineOperation::GetIndices)?;
        let indices: Map<String, Value> = res.decode(EngineOperation::GetIndices)?;
        let mut names: Vec<String> = indices.into_iter().map(|(name, _)| name).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InMemoryEngine, InjectedFailure};
    use crate::index::VersionedMapping;
    use serde_json::json;

    fn mappings(version: &str) -> MappingSet {
        let mapping = || {
            VersionedMapping::new(
                version,
                json!({"properties": {"name": {"type": "keyword"}}}),
            )
        };
        MappingSet::new(mapping(), mapping(), mapping())
    }

    fn registry(engine: Arc<InMemoryEngine>) -> IndexRegistry {
        IndexRegistry::new(engine, "grafeas", mappings("v2"))
    }

    #[test]
    fn test_current_names() {
        let registry = registry(Arc::new(InMemoryEngine::new()));
        assert_eq!(registry.projects_index(), "grafeas-v2-projects");
        assert_eq!(registry.projects_alias(), "grafeas-projects");
        assert_eq!(registry.occurrences_index("p1"), "grafeas-v2-p1-occurrences");
        assert_eq!(registry.occurrences_alias("p1"), "grafeas-p1-occurrences");
        assert_eq!(registry.notes_index("p1"), "grafeas-v2-p1-notes");
        assert_eq!(registry.notes_alias("p1"), "grafeas-p1-notes");
        assert_eq!(registry.latest_version(DocumentKind::Note), "v2");
    }

    #[test]
    fn test_increment_index_version() {
        let registry = registry(Arc::new(InMemoryEngine::new()));
        assert_eq!(
            registry.increment_index_version("grafeas-v1-projects"),
            "grafeas-v2-projects"
        );
        assert_eq!(
            registry.increment_index_version("grafeas-v1-team-a-occurrences"),
            "grafeas-v2-team-a-occurrences"
        );
        assert_eq!(
            registry.increment_index_version("grafeas-v1-p1-widgets"),
            "grafeas-v1-p1-widgets"
        );
    }

    #[test]
    fn test_alias_for_index() {
        let registry = registry(Arc::new(InMemoryEngine::new()));
        assert_eq!(
            registry.alias_for_index("grafeas-v1-p1-notes").as_deref(),
            Some("grafeas-p1-notes")
        );
        assert_eq!(registry.alias_for_index("unrelated"), None);
    }

    #[tokio::test]
    async fn test_create_index_binds_alias() {
        let engine = Arc::new(InMemoryEngine::new());
        let registry = registry(engine.clone());
        let info = registry.index_info(DocumentKind::Note, Some("p1"));

        registry.create_index(&info, true).await.unwrap();

        assert!(engine.index_names().contains(&"grafeas-v2-p1-notes".to_string()));
        assert_eq!(
            engine.indices_for_alias("grafeas-p1-notes"),
            vec!["grafeas-v2-p1-notes".to_string()]
        );
        assert_eq!(
            registry.resolve_alias("grafeas-p1-notes").await.unwrap(),
            vec!["grafeas-v2-p1-notes".to_string()]
        );
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let engine = Arc::new(InMemoryEngine::new());
        let registry = registry(engine.clone());
        let info = registry.index_info(DocumentKind::Project, None);

        registry.create_index(&info, true).await.unwrap();
        registry.create_index(&info, true).await.unwrap();
        // without the existence check the engine's already-exists error is tolerated
        registry.create_index(&info, false).await.unwrap();
        assert_eq!(engine.index_names(), vec!["grafeas-v2-projects".to_string()]);
    }

    #[tokio::test]
    async fn test_create_index_unexpected_exists_status() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.fail_next(
            EngineOperation::IndexExists,
            InjectedFailure::status(500, json!({"error": {"type": "internal"}})),
        );
        let registry = registry(engine.clone());
        let info = registry.index_info(DocumentKind::Project, None);

        assert!(registry.create_index(&info, true).await.is_err());
        assert!(engine.index_names().is_empty());
    }

    #[tokio::test]
    async fn test_create_index_failure() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.fail_next(
            EngineOperation::CreateIndex,
            InjectedFailure::status(
                400,
                json!({"error": {"type": "illegal_argument_exception", "reason": "bad mapping"}}),
            ),
        );
        let registry = registry(engine);
        let info = registry.index_info(DocumentKind::Project, None);
        assert!(registry.create_index(&info, false).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_missing_alias() {
        let registry = registry(Arc::new(InMemoryEngine::new()));
        assert!(registry.resolve_alias("grafeas-nope-notes").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_indices_sorted() {
        let engine = Arc::new(InMemoryEngine::new());
        let registry = registry(engine);
        for project_id in ["zeta", "alpha"] {
            let info = registry.index_info(DocumentKind::Note, Some(project_id));
            registry.create_index(&info, true).await.unwrap();
        }

        assert_eq!(
            registry.list_indices().await.unwrap(),
            vec!["grafeas-v2-alpha-notes", "grafeas-v2-zeta-notes"]
        );
    }
}
