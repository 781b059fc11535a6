//! Grafeas index migration tool.
//!
//! Moves every Grafeas index whose mapping version is outdated to the current
//! version, one index at a time, while readers keep using the aliases.

mod config;

use std::sync::Arc;

use clap::Parser;
use grafeas_persistence::engine::{ElasticsearchEngine, SearchEngine};
use grafeas_persistence::index::{DocumentKind, IndexInfo, IndexRegistry};
use grafeas_persistence::migration::{Migrator, TokioSleeper};
use tracing::{info, warn};

use crate::config::MigrateConfig;

/// Initializes the tracing subscriber for logging.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "grafeas_migrate={level},grafeas_persistence={level}"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Keeps the discovered migrations named on the command line.
fn select(pending: Vec<IndexInfo>, requested: &[String]) -> Vec<IndexInfo> {
    if requested.is_empty() {
        return pending;
    }
    for name in requested {
        if !pending.iter().any(|info| &info.index == name) {
            warn!(index = %name, "Requested index does not need migrating");
        }
    }
    pending
        .into_iter()
        .filter(|info| requested.contains(&info.index))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MigrateConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let es_config = config.to_es_config();
    info!(
        nodes = ?es_config.nodes,
        index_prefix = %es_config.index_prefix,
        dry_run = config.dry_run,
        "Starting Grafeas index migration"
    );

    let engine: Arc<dyn SearchEngine> = Arc::new(ElasticsearchEngine::new(&es_config)?);
    let mappings = es_config.load_mappings()?;
    let registry = Arc::new(IndexRegistry::new(
        engine,
        es_config.index_prefix.clone(),
        mappings,
    ));

    if config.initialize {
        let info = registry.index_info(DocumentKind::Project, None);
        registry.create_index(&info, true).await?;
    }

    let migrator = Migrator::new(
        registry,
        es_config.migration.retry_policy(),
        Arc::new(TokioSleeper),
    );

    let selected = select(migrator.get_migrations().await?, &config.indices);
    if config.dry_run {
        for info in &selected {
            println!(
                "{} -> {} ({})",
                info.index,
                info.alias.as_deref().unwrap_or("-"),
                info.kind
            );
        }
        info!(count = selected.len(), "Dry run complete");
        return Ok(());
    }

    let report = migrator.migrate_indices(&selected).await;
    if !report.is_success() {
        for (index, e) in &report.failed {
            eprintln!("{index}: {e}");
        }
        anyhow::bail!(
            "{} of {} migrations failed",
            report.failed.len(),
            selected.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(index: &str) -> IndexInfo {
        IndexInfo::new(index, None, DocumentKind::Note)
    }

    #[test]
    fn test_select_all_by_default() {
        let pending = vec![info("grafeas-v0-a-notes"), info("grafeas-v0-b-notes")];
        assert_eq!(select(pending.clone(), &[]), pending);
    }

    #[test]
    fn test_select_requested() {
        let pending = vec![info("grafeas-v0-a-notes"), info("grafeas-v0-b-notes")];
        let selected = select(
            pending,
            &["grafeas-v0-b-notes".to_string(), "grafeas-v0-c-notes".to_string()],
        );
        assert_eq!(selected, vec![info("grafeas-v0-b-notes")]);
    }
}
