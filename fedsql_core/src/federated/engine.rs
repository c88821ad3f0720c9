//! Federated search orchestration.
//!
//! Coordinates cache lookups, optional query optimization, parallel
//! per-database execution and result merging for a single request.

use super::cache::{fingerprint, SearchCache};
use super::merge::{collect_categories, paginate, DatabaseRows, ResultMerger};
use super::suggestions::SuggestionEngine;
use super::{
    DatabaseFailure, NormalizedRequest, PerformanceSample, QueryOptimization, SearchMode,
    SearchOptions, SearchResponse, SearchTrends, Suggestion,
};
use crate::analytics::{compute_trends, AnalyticsSink, PopularQueries, SearchEvent};
use crate::config::EngineConfig;
use crate::error::SearchError;
use crate::executor::{
    DatabaseExecutor, DatabaseInfo, ExecutionRequest, ExecutorRegistry, PerformanceSource,
};
use crate::optimizer::{OptimizedQuery, QueryOptimizer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Merges with more rows than this run on the rayon pool.
pub const CPU_MERGE_THRESHOLD: usize = 2_000;

pub const NO_DATABASES_NOTICE: &str =
    "No databases selected. Provide at least one database to search.";

/// Entry point for federated searches.
///
/// Holds no per-request state; one instance serves concurrent calls.
pub struct SearchOrchestrator {
    registry: ExecutorRegistry,
    cache: Option<Arc<dyn SearchCache>>,
    optimizer: Option<Arc<dyn QueryOptimizer>>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    performance: Option<Arc<dyn PerformanceSource>>,
    suggestions: SuggestionEngine,
    config: EngineConfig,
}

#[derive(Default)]
pub struct SearchOrchestratorBuilder {
    registry: ExecutorRegistry,
    cache: Option<Arc<dyn SearchCache>>,
    optimizer: Option<Arc<dyn QueryOptimizer>>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    popular: Option<Arc<dyn PopularQueries>>,
    performance: Option<Arc<dyn PerformanceSource>>,
    config: EngineConfig,
}

impl SearchOrchestratorBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn executor(mut self, id: impl Into<String>, executor: Arc<dyn DatabaseExecutor>) -> Self {
        self.registry.register(id, executor);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn SearchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn optimizer(mut self, optimizer: Arc<dyn QueryOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn popular(mut self, popular: Arc<dyn PopularQueries>) -> Self {
        self.popular = Some(popular);
        self
    }

    pub fn performance(mut self, performance: Arc<dyn PerformanceSource>) -> Self {
        self.performance = Some(performance);
        self
    }

    pub fn build(self) -> SearchOrchestrator {
        let mut suggestions = SuggestionEngine::new(self.config.suggestions.clone());
        if let Some(ref popular) = self.popular {
            suggestions = suggestions.with_popular(Arc::clone(popular));
        }
        if let Some(ref optimizer) = self.optimizer {
            suggestions = suggestions.with_optimizer(Arc::clone(optimizer));
        }

        let cache = if self.config.cache.enabled {
            self.cache
        } else {
            None
        };

        SearchOrchestrator {
            registry: self.registry,
            cache,
            optimizer: self.optimizer,
            analytics: self.analytics,
            performance: self.performance,
            suggestions,
            config: self.config,
        }
    }
}

impl SearchOrchestrator {
    pub fn builder() -> SearchOrchestratorBuilder {
        SearchOrchestratorBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn databases(&self) -> Vec<DatabaseInfo> {
        self.registry.list()
    }

    /// Search every requested database and return one ranked page.
    ///
    /// Fails only when every requested database fails.
    pub async fn perform_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        let request = NormalizedRequest::new(query, options, &self.config.defaults);

        if request.query.is_empty() {
            return Ok(SearchResponse::empty(""));
        }

        if request.databases.is_empty() {
            let mut response =
                SearchResponse::empty(request.query.clone()).with_notice(NO_DATABASES_NOTICE);
            response.execution_time_ms = elapsed_ms(start);
            return Ok(response);
        }

        let key = fingerprint(&request);
        if let Some(mut cached) = self.cache_get(&key).await {
            debug!(target: "fedsql.cache", key = %key, "cache hit");
            self.emit(&request, &cached, elapsed_ms(start), true).await;
            if request.include_analytics {
                cached.trends = self.trends().await;
            }
            return Ok(cached);
        }

        let mut optimization = None;
        let executed_query = match self.optimize(&request).await {
            Some(optimized) => {
                let query = optimized.optimized_query.clone();
                optimization = Some(QueryOptimization {
                    notices: Vec::new(),
                    original_query: Some(request.query.clone()),
                    optimized_query: Some(optimized.optimized_query),
                    context: optimized.context,
                });
                query
            }
            None => request.query.clone(),
        };

        let (sets, failures) = self.fan_out(&request, &executed_query).await;

        if sets.is_empty() {
            let databases: Vec<String> = failures.into_iter().map(|f| f.database).collect();
            warn!(
                target: "fedsql.search",
                query = %executed_query,
                failed = databases.len(),
                "all databases failed"
            );
            return Err(SearchError::AllDatabasesFailed {
                count: databases.len(),
                databases,
            });
        }

        let merger = ResultMerger::new(
            &executed_query,
            request.columns.clone(),
            self.config.snippet_length,
        );
        let row_count: usize = sets.iter().map(|s| s.rows.len()).sum();
        let merged = if row_count > CPU_MERGE_THRESHOLD {
            merger.merge_offloaded(sets).await?
        } else {
            merger.merge(&sets)
        };

        let total_count = merged.len();
        let categories = collect_categories(&merged);
        let results = paginate(merged, request.offset, request.limit);

        let mut response = SearchResponse {
            results,
            total_count,
            execution_time_ms: 0,
            query: executed_query,
            categories,
            suggestions: None,
            query_optimization: optimization,
            trends: None,
            failed_databases: failures,
        };

        if response.results.is_empty() {
            let suggestions = self
                .suggestions
                .suggest(&request.query, request.user_id.as_deref())
                .await;
            if !suggestions.is_empty() {
                response.suggestions = Some(suggestions);
            }
        }

        response.execution_time_ms = elapsed_ms(start);

        // Partial responses are not cached so recovered databases show up
        // on the next call.
        if !response.is_partial() {
            self.cache_set(&key, &response).await;
        }

        self.emit(&request, &response, response.execution_time_ms, false)
            .await;
        if request.include_analytics {
            response.trends = self.trends().await;
        }

        info!(
            target: "fedsql.search",
            query = %response.query,
            databases = request.databases.len(),
            failed = response.failed_databases.len(),
            total = response.total_count,
            elapsed_ms = response.execution_time_ms,
            "search completed"
        );

        Ok(response)
    }

    /// Completions for a partial query.
    pub async fn get_suggestions(&self, partial: &str, user_id: Option<&str>) -> Vec<Suggestion> {
        self.suggestions.suggest(partial, user_id).await
    }

    /// Performance metrics from the configured source; empty without one.
    pub async fn analyze_performance(&self) -> Result<Vec<PerformanceSample>, SearchError> {
        match self.performance {
            Some(ref source) => Ok(source.samples().await?),
            None => Ok(Vec::new()),
        }
    }

    async fn optimize(&self, request: &NormalizedRequest) -> Option<OptimizedQuery> {
        if request.mode != SearchMode::Semantic {
            return None;
        }
        let optimizer = self.optimizer.as_ref().filter(|o| o.is_available())?;

        match optimizer.optimize(&request.query).await {
            Ok(optimized) => {
                debug!(
                    target: "fedsql.search",
                    original = %request.query,
                    optimized = %optimized.optimized_query,
                    "query optimized"
                );
                Some(optimized)
            }
            Err(err) => {
                warn!(target: "fedsql.search", error = %err, "query optimization failed, using original query");
                None
            }
        }
    }

    /// Run the query against every requested database concurrently.
    ///
    /// Row sets come back in request order regardless of completion order.
    async fn fan_out(
        &self,
        request: &NormalizedRequest,
        query: &str,
    ) -> (Vec<DatabaseRows>, Vec<DatabaseFailure>) {
        let futures: Vec<_> = request
            .databases
            .iter()
            .map(|database| {
                let exec = ExecutionRequest {
                    database: database.clone(),
                    query: query.to_string(),
                    tables: request.tables.clone(),
                    columns: request.columns.clone(),
                    limit: request.per_database_limit(),
                    offset: 0,
                    mode: request.mode,
                };
                let registry = &self.registry;

                async move {
                    let started = Instant::now();
                    let outcome = registry.execute(&exec).await;
                    (exec.database, started.elapsed(), outcome)
                }
            })
            .collect();

        let outcomes = futures::future::join_all(futures).await;

        let mut sets = Vec::new();
        let mut failures = Vec::new();
        for (database, elapsed, outcome) in outcomes {
            match outcome {
                Ok(rows) => {
                    debug!(
                        target: "fedsql.search",
                        database = %database,
                        rows = rows.len(),
                        elapsed_ms = duration_ms(elapsed),
                        "database answered"
                    );
                    sets.push(DatabaseRows::new(database, rows));
                }
                Err(err) => {
                    warn!(
                        target: "fedsql.search",
                        database = %database,
                        error = %err,
                        elapsed_ms = duration_ms(elapsed),
                        "database search failed"
                    );
                    failures.push(DatabaseFailure {
                        database,
                        is_timeout: err.is_timeout(),
                        error: err.to_string(),
                    });
                }
            }
        }
        (sets, failures)
    }

    async fn cache_get(&self, key: &str) -> Option<SearchResponse> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(target: "fedsql.cache", error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, response: &SearchResponse) {
        let Some(ref cache) = self.cache else {
            return;
        };
        let ttl = Duration::from_secs(self.config.cache.ttl_secs);
        if let Err(err) = cache.set(key, response, ttl).await {
            warn!(target: "fedsql.cache", error = %err, "cache write failed");
        }
    }

    async fn emit(
        &self,
        request: &NormalizedRequest,
        response: &SearchResponse,
        execution_time_ms: u64,
        cache_hit: bool,
    ) {
        let Some(ref sink) = self.analytics else {
            return;
        };

        let mut event = SearchEvent::new(request.query.clone(), request.mode);
        event.user_id = request.user_id.clone();
        event.executed_query = response.query.clone();
        event.databases = request.databases.clone();
        event.result_count = response.results.len();
        event.total_count = response.total_count;
        event.execution_time_ms = execution_time_ms;
        event.cache_hit = cache_hit;
        event.failed_databases = response
            .failed_databases
            .iter()
            .map(|f| f.database.clone())
            .collect();

        if let Err(err) = sink.record(&event).await {
            warn!(target: "fedsql.search", error = %err, "analytics emit failed");
        }
    }

    async fn trends(&self) -> Option<SearchTrends> {
        let sink = self.analytics.as_ref()?;
        match sink.recent(self.config.trends.window).await {
            Ok(events) => Some(compute_trends(&events, self.config.trends.top_queries)),
            Err(err) => {
                warn!(target: "fedsql.search", error = %err, "trend aggregation failed");
                None
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    duration_ms(start.elapsed())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
