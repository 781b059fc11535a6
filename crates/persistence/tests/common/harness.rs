//! Test harness: storage wired to an in-memory engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use grafeas_persistence::backends::elasticsearch::ElasticsearchStorage;
use grafeas_persistence::engine::{InMemoryEngine, SearchEngine};
use grafeas_persistence::index::{IndexRegistry, MappingSet};
use grafeas_persistence::migration::{Migrator, RetryPolicy, Sleeper};
use grafeas_persistence::query::{FilterError, Filterer, Query};
use grafeas_persistence::store::{ClientSettings, DocumentClient};

/// Compiles `field == "value"` clauses joined by ` AND ` into term queries.
#[derive(Debug, Default)]
pub struct TermFilterer;

impl Filterer for TermFilterer {
    fn parse_expression(&self, filter: &str) -> Result<Query, FilterError> {
        let clauses = filter
            .split(" AND ")
            .map(|clause| {
                let (field, value) = clause
                    .split_once("==")
                    .ok_or_else(|| FilterError::new(format!("expected '==' in '{clause}'")))?;
                let field = field.trim();
                if field.is_empty() {
                    return Err(FilterError::new("missing field name"));
                }
                Ok(Query::term(field, value.trim().trim_matches('"')))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Query::all_of(clauses))
    }
}

/// Records requested sleeps instead of waiting.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Returns every requested sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

/// Storage, registry and engine sharing one in-memory cluster.
pub struct TestContext {
    /// The engine, for inspection and failure injection.
    pub engine: Arc<InMemoryEngine>,
    /// Registry under the default `grafeas` prefix.
    pub registry: Arc<IndexRegistry>,
    /// Storage with the projects index initialized.
    pub storage: ElasticsearchStorage,
}

impl TestContext {
    /// Creates an initialized context with default client settings.
    pub async fn new() -> Self {
        Self::with_settings(ClientSettings::default()).await
    }

    /// Creates an initialized context with custom client settings.
    pub async fn with_settings(settings: ClientSettings) -> Self {
        let context = Self::uninitialized(settings);
        context
            .storage
            .initialize()
            .await
            .expect("initialize storage");
        context
    }

    /// Creates a context without the projects index.
    pub fn uninitialized(settings: ClientSettings) -> Self {
        let engine = Arc::new(InMemoryEngine::new());
        let shared: Arc<dyn SearchEngine> = engine.clone();
        let mappings = MappingSet::embedded().expect("embedded mappings");
        let registry = Arc::new(IndexRegistry::new(shared, "grafeas", mappings));
        let storage = ElasticsearchStorage::new(registry.clone(), Arc::new(TermFilterer), settings);
        Self {
            engine,
            registry,
            storage,
        }
    }

    /// A document client on the same engine.
    pub fn client(&self) -> DocumentClient {
        self.storage.client().clone()
    }

    /// A migrator that records sleeps instead of waiting.
    pub fn migrator(&self, max_attempts: u32) -> (Migrator, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let migrator = Migrator::new(
            self.registry.clone(),
            RetryPolicy::new(max_attempts, Duration::from_secs(10)),
            sleeper.clone(),
        );
        (migrator, sleeper)
    }
}
