//! Zero-downtime index migrations.
//!
//! When a kind's mapping version changes, every index of that kind created
//! under an older version is moved to a fresh index built from the current
//! mapping:
//!
//! 1. block writes on the source index
//! 2. create the target index at the current version, without the alias
//! 3. reindex asynchronously into the target, creating only missing documents
//! 4. poll the reindex task until it completes
//! 5. atomically move the alias from source to target
//! 6. delete the source index
//!
//! Steps run strictly in order and nothing is rolled back on failure; every
//! step is safe to re-run, so a failed migration is retried by running it
//! again.

mod migrator;
mod retry;

use std::fmt;

use crate::error::StorageError;

pub use migrator::Migrator;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

/// One step of a single-index migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationStep {
    /// Put a write block on the source index.
    BlockWrites,
    /// Create the target index.
    CreateTarget,
    /// Start the reindex task.
    Reindex,
    /// Wait for the reindex task.
    PollTask,
    /// Move the alias to the target.
    SwapAlias,
    /// Delete the source index.
    DeleteSource,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStep::BlockWrites => "block writes",
            MigrationStep::CreateTarget => "create target index",
            MigrationStep::Reindex => "reindex",
            MigrationStep::PollTask => "poll reindex task",
            MigrationStep::SwapAlias => "swap alias",
            MigrationStep::DeleteSource => "delete source index",
        };
        f.write_str(name)
    }
}

/// Outcome of migrating every outdated index.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Source indices migrated successfully.
    pub migrated: Vec<String>,
    /// Source indices whose migration failed, with the error.
    pub failed: Vec<(String, StorageError)>,
}

impl MigrationReport {
    /// Returns true if no migration failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
