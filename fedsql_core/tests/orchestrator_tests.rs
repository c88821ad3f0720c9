use async_trait::async_trait;
use fedsql_core::analytics::{AnalyticsSink, MemoryAnalytics, PopularQueries};
use fedsql_core::config::EngineConfig;
use fedsql_core::error::{
    AnalyticsError, CacheError, ExecutionError, OptimizationError, SearchError,
};
use fedsql_core::executor::{DatabaseExecutor, ExecutionRequest, PerformanceSource};
use fedsql_core::federated::{
    MemoryCache, PerformanceSample, SearchCache, SearchMode, SearchOptions, SearchOrchestrator,
    SearchResponse, SuggestionType, NO_DATABASES_NOTICE,
};
use fedsql_core::optimizer::{OptimizedQuery, QueryOptimizer};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mocks
// ============================================================================

struct MockExecutor {
    rows: Vec<Value>,
    error: Option<ExecutionError>,
    delay: Duration,
    calls: AtomicUsize,
    queries: Mutex<Vec<ExecutionRequest>>,
}

impl MockExecutor {
    fn rows(rows: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            error: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn slow(rows: Vec<Value>, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            rows,
            error: None,
            delay: Duration::from_millis(delay_ms),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: ExecutionError) -> Arc<Self> {
        Arc::new(Self {
            rows: Vec::new(),
            error: Some(error),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> ExecutionRequest {
        self.queries.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl DatabaseExecutor for MockExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<Value>, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.error {
            Some(ExecutionError::Timeout(ref m)) => Err(ExecutionError::Timeout(m.clone())),
            Some(ref other) => Err(ExecutionError::Connection(other.to_string())),
            None => Ok(self
                .rows
                .iter()
                .take(request.limit as usize)
                .cloned()
                .collect()),
        }
    }
}

struct MockOptimizer {
    available: bool,
    rewrite: Option<&'static str>,
    calls: AtomicUsize,
}

impl MockOptimizer {
    fn new(available: bool, rewrite: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            available,
            rewrite,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl QueryOptimizer for MockOptimizer {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn optimize(&self, _query: &str) -> Result<OptimizedQuery, OptimizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.rewrite {
            Some(q) => Ok(OptimizedQuery {
                optimized_query: q.to_string(),
                context: Some(json!({"intent": "lookup"})),
            }),
            None => Err(OptimizationError::InvalidResponse("boom".into())),
        }
    }
}

struct BrokenCache;

#[async_trait]
impl SearchCache for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<SearchResponse>, CacheError> {
        Err(CacheError::Unavailable("redis down".into()))
    }

    async fn set(
        &self,
        _key: &str,
        _value: &SearchResponse,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("redis down".into()))
    }
}

struct FixedPopular(Vec<&'static str>);

#[async_trait]
impl PopularQueries for FixedPopular {
    async fn popular(&self, _prefix: &str, limit: usize) -> Result<Vec<String>, AnalyticsError> {
        Ok(self.0.iter().take(limit).map(|s| s.to_string()).collect())
    }
}

struct FixedPerformance;

#[async_trait]
impl PerformanceSource for FixedPerformance {
    async fn samples(&self) -> Result<Vec<PerformanceSample>, ExecutionError> {
        Ok(vec![
            PerformanceSample::new("wiki.page_count", 12.0),
            PerformanceSample::new("wiki.rows.articles", 3.0),
        ])
    }
}

fn scored(id: u32, score: f64) -> Value {
    json!({"_table": "docs", "id": id, "_score": score, "body": format!("document {}", id)})
}

// ============================================================================
// Validation notices
// ============================================================================

#[tokio::test]
async fn empty_query_returns_empty_without_calls() {
    let db = MockExecutor::rows(vec![scored(1, 1.0)]);
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", db.clone())
        .cache(Arc::new(MemoryCache::default()))
        .build();

    for query in ["", "   ", "\t\n"] {
        let response = orchestrator
            .perform_search(query, &SearchOptions::new(["a"]))
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.total_count, 0);
    }
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn empty_database_list_returns_notice() {
    let db = MockExecutor::rows(vec![scored(1, 1.0)]);
    let orchestrator = SearchOrchestrator::builder().executor("a", db.clone()).build();

    let response = orchestrator
        .perform_search("anything", &SearchOptions::new(Vec::<String>::new()))
        .await
        .unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.total_count, 0);
    let notices = response.query_optimization.unwrap().notices;
    assert_eq!(notices, vec![NO_DATABASES_NOTICE.to_string()]);
    assert_eq!(db.calls(), 0);
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test]
async fn warm_cache_skips_databases() {
    let a = MockExecutor::rows(vec![scored(1, 0.7)]);
    let b = MockExecutor::rows(vec![scored(2, 0.3)]);
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a.clone())
        .executor("b", b.clone())
        .cache(Arc::new(MemoryCache::default()))
        .build();
    let options = SearchOptions::new(["a", "b"]);

    let first = orchestrator.perform_search("document", &options).await.unwrap();
    let second = orchestrator.perform_search("document", &options).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
}

#[tokio::test]
async fn huge_cache_ttl_still_caches() {
    let a = MockExecutor::rows(vec![scored(1, 0.7)]);
    let mut config = EngineConfig::default();
    config.cache.ttl_secs = u64::MAX;
    let orchestrator = SearchOrchestrator::builder()
        .config(config)
        .executor("a", a.clone())
        .cache(Arc::new(MemoryCache::default()))
        .build();
    let options = SearchOptions::new(["a"]);

    let first = orchestrator.perform_search("doc", &options).await.unwrap();
    let second = orchestrator.perform_search("doc", &options).await.unwrap();

    assert_eq!(first.total_count, 1);
    assert_eq!(first, second);
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn cache_key_ignores_database_order_and_mode_case() {
    let a = MockExecutor::rows(vec![scored(1, 0.7)]);
    let b = MockExecutor::rows(vec![scored(2, 0.3)]);
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a.clone())
        .executor("b", b.clone())
        .cache(Arc::new(MemoryCache::default()))
        .build();

    orchestrator
        .perform_search("document", &SearchOptions::new(["a", "b"]).with_mode("boolean"))
        .await
        .unwrap();
    orchestrator
        .perform_search(
            "  document ",
            &SearchOptions::new(["b", "a"]).with_mode("BOOLEAN"),
        )
        .await
        .unwrap();

    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
}

#[tokio::test]
async fn disabled_cache_is_ignored() {
    let a = MockExecutor::rows(vec![scored(1, 0.7)]);
    let mut config = EngineConfig::default();
    config.cache.enabled = false;
    let orchestrator = SearchOrchestrator::builder()
        .config(config)
        .executor("a", a.clone())
        .cache(Arc::new(MemoryCache::default()))
        .build();

    for _ in 0..2 {
        orchestrator
            .perform_search("document", &SearchOptions::new(["a"]))
            .await
            .unwrap();
    }
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn cache_failures_are_invisible() {
    let a = MockExecutor::rows(vec![scored(1, 0.7)]);
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a.clone())
        .cache(Arc::new(BrokenCache))
        .build();

    let response = orchestrator
        .perform_search("document", &SearchOptions::new(["a"]))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(a.calls(), 1);
}

// ============================================================================
// Fan-out failures
// ============================================================================

#[tokio::test]
async fn partial_failure_is_tolerated() {
    let good = MockExecutor::rows(vec![scored(1, 0.9), scored(2, 0.4)]);
    let bad = MockExecutor::failing(ExecutionError::Connection("refused".into()));
    let cache = Arc::new(MemoryCache::default());
    let orchestrator = SearchOrchestrator::builder()
        .executor("good", good.clone())
        .executor("bad", bad.clone())
        .cache(cache.clone())
        .build();

    let response = orchestrator
        .perform_search("document", &SearchOptions::new(["good", "bad"]))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
    assert!(response.results.iter().all(|r| r.database == "good"));
    assert_eq!(response.failed_databases.len(), 1);
    assert_eq!(response.failed_databases[0].database, "bad");
    assert!(response.is_partial());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn unknown_database_counts_as_failure() {
    let good = MockExecutor::rows(vec![scored(1, 0.9)]);
    let orchestrator = SearchOrchestrator::builder().executor("good", good).build();

    let response = orchestrator
        .perform_search("document", &SearchOptions::new(["good", "ghost"]))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.failed_databases[0].database, "ghost");
    assert!(response.failed_databases[0].error.contains("not registered"));
}

#[tokio::test]
async fn total_failure_names_every_database() {
    let slow = MockExecutor::failing(ExecutionError::Timeout("10000ms".into()));
    let down = MockExecutor::failing(ExecutionError::Connection("refused".into()));
    let orchestrator = SearchOrchestrator::builder()
        .executor("orders", slow)
        .executor("crm", down)
        .build();

    let err = orchestrator
        .perform_search("document", &SearchOptions::new(["orders", "crm"]))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("failed to respond"));
    assert!(message.contains("orders"));
    assert!(message.contains("crm"));
    match err {
        SearchError::AllDatabasesFailed { count, databases } => {
            assert_eq!(count, 2);
            assert_eq!(databases, vec!["orders", "crm"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Ranking and pagination
// ============================================================================

#[tokio::test]
async fn results_ranked_across_databases() {
    let a = MockExecutor::rows(vec![scored(1, 0.9), scored(2, 0.5)]);
    let b = MockExecutor::rows(vec![scored(3, 0.95), scored(4, 0.1)]);
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a)
        .executor("b", b)
        .build();

    let response = orchestrator
        .perform_search("document", &SearchOptions::new(["a", "b"]))
        .await
        .unwrap();

    let scores: Vec<f64> = response.results.iter().map(|r| r.relevance_score).collect();
    assert_eq!(scores, vec![0.95, 0.9, 0.5, 0.1]);
    assert_eq!(response.total_count, 4);
    assert_eq!(response.categories, vec!["docs"]);
}

#[tokio::test]
async fn order_is_independent_of_arrival() {
    let slow = MockExecutor::slow(vec![json!({"id": "s"})], 50);
    let fast = MockExecutor::rows(vec![json!({"id": "f"})]);
    let orchestrator = SearchOrchestrator::builder()
        .executor("slow", slow)
        .executor("fast", fast)
        .build();

    let response = orchestrator
        .perform_search("document", &SearchOptions::new(["slow", "fast"]))
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["slow:_:s", "fast:_:f"]);
}

#[tokio::test]
async fn pagination_applies_to_merged_results() {
    let a = MockExecutor::rows((0..5).map(|i| scored(i, 10.0 - i as f64 * 2.0)).collect());
    let b = MockExecutor::rows((5..10).map(|i| scored(i, 9.0 - (i - 5) as f64 * 2.0)).collect());
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a.clone())
        .executor("b", b)
        .build();

    let options = SearchOptions::new(["a", "b"]).with_limit(3).with_offset(2);
    let response = orchestrator.perform_search("document", &options).await.unwrap();

    let scores: Vec<f64> = response.results.iter().map(|r| r.relevance_score).collect();
    assert_eq!(scores, vec![8.0, 7.0, 6.0]);
    assert_eq!(response.total_count, 10);

    let sent = a.last_request();
    assert_eq!(sent.limit, 5);
    assert_eq!(sent.offset, 0);
}

#[tokio::test]
async fn large_merges_keep_order() {
    let rows: Vec<Value> = (0..1_500).map(|i| scored(i, f64::from(i))).collect();
    let more: Vec<Value> = (1_500..3_000).map(|i| scored(i, f64::from(i))).collect();
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", MockExecutor::rows(rows))
        .executor("b", MockExecutor::rows(more))
        .build();

    let options = SearchOptions::new(["a", "b"]).with_limit(3_000);
    let response = orchestrator.perform_search("document", &options).await.unwrap();

    assert_eq!(response.total_count, 3_000);
    let top: Vec<f64> = response.results.iter().take(3).map(|r| r.relevance_score).collect();
    assert_eq!(top, vec![2999.0, 2998.0, 2997.0]);
    assert_eq!(response.results.last().map(|r| r.relevance_score), Some(0.0));
}

// ============================================================================
// Optimizer
// ============================================================================

#[tokio::test]
async fn semantic_mode_executes_optimized_query() {
    let a = MockExecutor::rows(vec![scored(1, 0.9)]);
    let optimizer = MockOptimizer::new(true, Some("refund policy"));
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a.clone())
        .optimizer(optimizer.clone())
        .build();

    let options = SearchOptions::new(["a"]).with_mode(SearchMode::Semantic);
    let response = orchestrator
        .perform_search("how do I get my money back", &options)
        .await
        .unwrap();

    assert_eq!(a.last_request().query, "refund policy");
    assert_eq!(response.query, "refund policy");
    let details = response.query_optimization.unwrap();
    assert_eq!(details.original_query.as_deref(), Some("how do I get my money back"));
    assert_eq!(details.context, Some(json!({"intent": "lookup"})));
    assert_eq!(optimizer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn optimizer_failure_falls_back_to_original() {
    let a = MockExecutor::rows(vec![scored(1, 0.9)]);
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a.clone())
        .optimizer(MockOptimizer::new(true, None))
        .build();

    let options = SearchOptions::new(["a"]).with_mode("semantic");
    let response = orchestrator.perform_search("refunds", &options).await.unwrap();

    assert_eq!(a.last_request().query, "refunds");
    assert_eq!(response.query, "refunds");
    assert!(response.query_optimization.is_none());
}

#[tokio::test]
async fn optimizer_only_consulted_for_available_semantic() {
    let a = MockExecutor::rows(vec![scored(1, 0.9)]);
    let available = MockOptimizer::new(true, Some("rewritten"));
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a.clone())
        .optimizer(available.clone())
        .build();
    orchestrator
        .perform_search("refunds", &SearchOptions::new(["a"]))
        .await
        .unwrap();
    assert_eq!(available.calls.load(Ordering::SeqCst), 0);
    assert_eq!(a.last_request().query, "refunds");

    let unavailable = MockOptimizer::new(false, Some("rewritten"));
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", a.clone())
        .optimizer(unavailable.clone())
        .build();
    orchestrator
        .perform_search("refunds", &SearchOptions::new(["a"]).with_mode("semantic"))
        .await
        .unwrap();
    assert_eq!(unavailable.calls.load(Ordering::SeqCst), 0);
    assert_eq!(a.last_request().query, "refunds");
}

// ============================================================================
// Suggestions, analytics and performance
// ============================================================================

#[tokio::test]
async fn popular_suggestions() {
    let orchestrator = SearchOrchestrator::builder()
        .popular(Arc::new(FixedPopular(vec!["database", "data backup"])))
        .build();

    let suggestions = orchestrator.get_suggestions("datab", None).await;
    let texts: Vec<&str> = suggestions.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["database", "data backup"]);
    assert!(suggestions.iter().all(|s| s.kind == SuggestionType::Popular));

    assert!(orchestrator.get_suggestions("", None).await.is_empty());
}

#[tokio::test]
async fn empty_results_carry_suggestions() {
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", MockExecutor::rows(Vec::new()))
        .popular(Arc::new(FixedPopular(vec!["database"])))
        .build();

    let response = orchestrator
        .perform_search("databse", &SearchOptions::new(["a"]))
        .await
        .unwrap();
    assert!(response.results.is_empty());
    let suggestions = response.suggestions.unwrap();
    assert_eq!(suggestions[0].text, "database");
}

#[tokio::test]
async fn analytics_records_searches_and_cache_hits() {
    let analytics = Arc::new(MemoryAnalytics::new());
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", MockExecutor::rows(vec![scored(1, 0.9)]))
        .cache(Arc::new(MemoryCache::default()))
        .analytics(analytics.clone())
        .build();

    let options = SearchOptions::new(["a"]).with_user("u1");
    orchestrator.perform_search("document", &options).await.unwrap();
    let cached = orchestrator
        .perform_search("document", &options.clone().with_analytics(true))
        .await
        .unwrap();

    let events = analytics.load_all().unwrap();
    assert_eq!(events.len(), 2);
    assert!(!events[0].cache_hit);
    assert!(events[1].cache_hit);
    assert_eq!(events[0].user_id.as_deref(), Some("u1"));
    assert_eq!(events[0].result_count, 1);

    let trends = cached.trends.unwrap();
    assert_eq!(trends.total_searches, 2);
    assert_eq!(trends.cache_hit_rate, 0.5);
    assert_eq!(trends.top_queries[0].query, "document");
    assert_eq!(trends.top_queries[0].count, 2);
}

#[tokio::test]
async fn trends_only_when_requested() {
    let analytics = Arc::new(MemoryAnalytics::new());
    let orchestrator = SearchOrchestrator::builder()
        .executor("a", MockExecutor::rows(vec![scored(1, 0.9)]))
        .analytics(analytics.clone())
        .build();

    let plain = orchestrator
        .perform_search("document", &SearchOptions::new(["a"]))
        .await
        .unwrap();
    assert!(plain.trends.is_none());

    let with = orchestrator
        .perform_search("document", &SearchOptions::new(["a"]).with_analytics(true))
        .await
        .unwrap();
    assert_eq!(with.trends.unwrap().total_searches, 2);
    assert_eq!(analytics.recent(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn performance_passthrough() {
    let orchestrator = SearchOrchestrator::builder()
        .performance(Arc::new(FixedPerformance))
        .build();
    let samples = orchestrator.analyze_performance().await.unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].metric, "wiki.page_count");

    let bare = SearchOrchestrator::builder().build();
    assert!(bare.analyze_performance().await.unwrap().is_empty());
}
