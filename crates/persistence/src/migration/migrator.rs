use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::codec::{self, BlockResponse, TaskCreationResponse, TaskStatusResponse};
use crate::engine::{EngineOperation, SearchEngine};
use crate::error::{MigrationError, SearchError, StorageError, StorageResult};
use crate::index::{IndexInfo, IndexRegistry};

use super::{MigrationReport, MigrationStep, RetryPolicy, Sleeper, TokioSleeper};

const TASKS_INDEX: &str = ".tasks";

/// Moves outdated indices to their kind's current mapping version.
#[derive(Debug, Clone)]
pub struct Migrator {
    registry: Arc<IndexRegistry>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

fn step_failed(index: &str, step: MigrationStep) -> impl FnOnce(StorageError) -> StorageError {
    let index = index.to_string();
    move |source| {
        MigrationError::StepFailed {
            index,
            step,
            source: Box::new(source),
        }
        .into()
    }
}

impl Migrator {
    /// Creates a migrator.
    pub fn new(registry: Arc<IndexRegistry>, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            registry,
            policy,
            sleeper,
        }
    }

    /// Creates a migrator with the default polling policy on the tokio timer.
    pub fn with_defaults(registry: Arc<IndexRegistry>) -> Self {
        Self::new(registry, RetryPolicy::default(), Arc::new(TokioSleeper))
    }

    fn engine(&self) -> &Arc<dyn SearchEngine> {
        self.registry.engine()
    }

    /// Lists the indices under this deployment's prefix whose mapping version is outdated.
    ///
    /// Indices are returned sorted by name, each with the alias it is served under.
    #[instrument(skip(self), fields(prefix = %self.registry.prefix()))]
    pub async fn get_migrations(&self) -> StorageResult<Vec<IndexInfo>> {
        let mut pending = Vec::new();
        for name in self.registry.list_indices().await? {
            let Some(parts) = self.registry.parse_index_name(&name) else {
                continue;
            };
            if parts.version == self.registry.latest_version(parts.kind) {
                continue;
            }
            let alias = self
                .registry
                .alias_name(parts.kind, parts.project_id.as_deref());
            debug!(index = %name, version = %parts.version, "Index needs migration");
            pending.push(IndexInfo::new(name, Some(alias), parts.kind));
        }
        info!(count = pending.len(), "Discovered indices to migrate");
        Ok(pending)
    }

    /// Migrates one index to its kind's current mapping version.
    ///
    /// An index already at the current version is left alone.
    #[instrument(skip(self, info), fields(index = %info.index, kind = %info.kind))]
    pub async fn migrate(&self, info: &IndexInfo) -> StorageResult<()> {
        let source = info.index.as_str();
        let target = self.registry.increment_index_version(source);
        if target == source {
            info!("Index is already at the latest version");
            return Ok(());
        }

        let alias = info
            .alias
            .clone()
            .or_else(|| self.registry.alias_for_index(source))
            .ok_or_else(|| {
                step_failed(source, MigrationStep::SwapAlias)(
                    SearchError::InvalidIdentifier {
                        what: "index name",
                        value: source.to_string(),
                        message: "no alias can be derived".to_string(),
                    }
                    .into(),
                )
            })?;

        info!(target = %target, alias = %alias, "Starting migration");

        self.block_writes(source)
            .await
            .map_err(step_failed(source, MigrationStep::BlockWrites))?;

        let target_info = IndexInfo::new(target.clone(), None, info.kind);
        self.registry
            .create_index(&target_info, true)
            .await
            .map_err(step_failed(source, MigrationStep::CreateTarget))?;

        let task_id = self
            .start_reindex(source, &target)
            .await
            .map_err(step_failed(source, MigrationStep::Reindex))?;

        self.wait_for_task(source, &task_id)
            .await
            .map_err(step_failed(source, MigrationStep::PollTask))?;
        self.delete_task_document(&task_id).await;

        self.swap_alias(source, &target, &alias)
            .await
            .map_err(step_failed(source, MigrationStep::SwapAlias))?;

        self.delete_source(source)
            .await
            .map_err(step_failed(source, MigrationStep::DeleteSource))?;

        info!(target = %target, "Migration complete");
        Ok(())
    }

    /// Migrates every outdated index, one after another.
    ///
    /// A failed index is recorded in the report and does not stop the rest.
    pub async fn migrate_all(&self) -> StorageResult<MigrationReport> {
        let pending = self.get_migrations().await?;
        Ok(self.migrate_indices(&pending).await)
    }

    /// Migrates the given indices in order, recording each outcome.
    pub async fn migrate_indices(&self, indices: &[IndexInfo]) -> MigrationReport {
        let mut report = MigrationReport::default();
        for info in indices {
            match self.migrate(info).await {
                Ok(()) => report.migrated.push(info.index.clone()),
                Err(e) => {
                    error!(index = %info.index, error = %e, "Migration failed");
                    report.failed.push((info.index.clone(), e));
                }
            }
        }
        info!(
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            "Migrations finished"
        );
        report
    }

    async fn block_writes(&self, index: &str) -> StorageResult<()> {
        let settings = self
            .engine()
            .get_settings(index)
            .await?
            .require_success(EngineOperation::GetSettings)?;
        if codec::write_block_enabled(&settings.body, index) {
            debug!("Writes already blocked");
            return Ok(());
        }

        let res = self
            .engine()
            .add_write_block(index)
            .await?
            .require_success(EngineOperation::AddWriteBlock)?;
        let block: BlockResponse = res.decode(EngineOperation::AddWriteBlock)?;
        if !(block.acknowledged && block.shards_acknowledged) {
            return Err(MigrationError::WriteBlockNotAcknowledged {
                index: index.to_string(),
            }
            .into());
        }
        info!("Blocked writes");
        Ok(())
    }

    async fn start_reindex(&self, source: &str, target: &str) -> StorageResult<String> {
        let res = self
            .engine()
            .reindex(codec::reindex_body(source, target))
            .await?
            .require_success(EngineOperation::Reindex)?;
        let created: TaskCreationResponse = res.decode(EngineOperation::Reindex)?;
        info!(task_id = %created.task, "Started reindex");
        Ok(created.task)
    }

    async fn wait_for_task(&self, index: &str, task_id: &str) -> StorageResult<()> {
        let max_attempts = self.policy.max_attempts;
        for attempt in 1..=max_attempts {
            match self.task_completed(task_id).await {
                Ok(true) => {
                    info!(task_id = %task_id, attempt, "Reindex complete");
                    return Ok(());
                }
                Ok(false) => debug!(task_id = %task_id, attempt, "Reindex still running"),
                Err(e) => warn!(task_id = %task_id, attempt, error = %e, "Failed to poll reindex task"),
            }
            if attempt < max_attempts {
                self.sleeper.sleep(self.policy.delay).await;
            }
        }
        Err(MigrationError::ReindexIncomplete {
            index: index.to_string(),
            task_id: task_id.to_string(),
            attempts: max_attempts,
        }
        .into())
    }

    async fn task_completed(&self, task_id: &str) -> StorageResult<bool> {
        let res = self
            .engine()
            .get_task(task_id)
            .await?
            .require_success(EngineOperation::GetTask)?;
        let status: TaskStatusResponse = res.decode(EngineOperation::GetTask)?;
        Ok(status.completed)
    }

    async fn delete_task_document(&self, task_id: &str) {
        match self.engine().delete_document(TASKS_INDEX, task_id).await {
            Ok(res) if res.is_success() => debug!(task_id = %task_id, "Deleted task document"),
            Ok(res) => {
                warn!(task_id = %task_id, status = res.status, "Failed to delete task document")
            }
            Err(e) => warn!(task_id = %task_id, error = %e, "Failed to delete task document"),
        }
    }

    async fn swap_alias(&self, source: &str, target: &str, alias: &str) -> StorageResult<()> {
        self.engine()
            .update_aliases(codec::alias_swap_body(source, target, alias))
            .await?
            .require_success(EngineOperation::UpdateAliases)?;
        info!(alias = %alias, target = %target, "Moved alias");
        Ok(())
    }

    async fn delete_source(&self, index: &str) -> StorageResult<()> {
        let res = self.engine().delete_indices(&[index.to_string()]).await?;
        if res.is_not_found() {
            debug!("Source index already deleted");
            return Ok(());
        }
        res.require_success(EngineOperation::DeleteIndices)?;
        info!("Deleted source index");
        Ok(())
    }
}
