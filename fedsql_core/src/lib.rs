// src/lib.rs
pub mod analytics;
pub mod config;
pub mod error;
pub mod executor;
pub mod federated;
pub mod optimizer;

pub use analytics::{AnalyticsSink, FileAnalytics, MemoryAnalytics, PopularQueries, SearchEvent};
pub use config::{ConfigStore, EngineConfig};
pub use error::{
    AnalyticsError, CacheError, ConfigError, ExecutionError, OptimizationError, SearchError,
};
pub use executor::{
    CompositePerformance, DatabaseExecutor, DatabaseInfo, ExecutionRequest, ExecutorRegistry,
    PerformanceSource, SqliteExecutor,
};
pub use federated::{
    MemoryCache, SearchCache, SearchMode, SearchOptions, SearchOrchestrator, SearchResponse,
    SearchResult, Suggestion,
};
pub use optimizer::{HttpQueryOptimizer, OptimizedQuery, QueryOptimizer};

use std::sync::Arc;

/// Wire an orchestrator from configuration.
///
/// Connects every configured database, uses an in-memory cache, records
/// analytics to the configured file (or memory when none) and enables the
/// HTTP optimizer when one is configured.
pub async fn build_orchestrator(config: EngineConfig) -> Result<SearchOrchestrator, SearchError> {
    let mut builder = SearchOrchestrator::builder();
    let mut performance = CompositePerformance::default();

    for db in &config.databases {
        let executor = Arc::new(
            SqliteExecutor::connect(db)
                .await
                .map_err(|e| SearchError::Internal(format!("database '{}': {}", db.id, e)))?,
        );
        performance.push(executor.clone());
        builder = builder.executor(db.id.clone(), executor);
    }

    if config.cache.enabled {
        builder = builder.cache(Arc::new(MemoryCache::new(config.cache.max_entries)));
    }

    match config.analytics.path {
        Some(ref path) => {
            let store = Arc::new(
                FileAnalytics::new(path).map_err(|e| SearchError::Internal(e.to_string()))?,
            );
            builder = builder.analytics(store.clone()).popular(store);
        }
        None => {
            let store = Arc::new(MemoryAnalytics::with_capacity(config.analytics.memory_events));
            builder = builder.analytics(store.clone()).popular(store);
        }
    }

    if let Some(ref optimizer) = config.optimizer {
        let optimizer = HttpQueryOptimizer::from_config(optimizer)
            .map_err(|e| SearchError::Internal(e.to_string()))?;
        builder = builder.optimizer(Arc::new(optimizer));
    }

    Ok(builder
        .performance(Arc::new(performance))
        .config(config)
        .build())
}
