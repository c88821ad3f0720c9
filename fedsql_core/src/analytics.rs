//! Search analytics: event recording, popular queries and trends.

use crate::error::AnalyticsError;
use crate::federated::{QueryCount, SearchMode, SearchTrends};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One completed search, as seen by analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub event_id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Normalized query as submitted
    pub query: String,
    /// Query sent to the databases (differs when optimized)
    pub executed_query: String,
    pub databases: Vec<String>,
    pub search_mode: SearchMode,
    pub result_count: usize,
    pub total_count: usize,
    pub execution_time_ms: u64,
    /// Served from cache without touching the databases
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_databases: Vec<String>,
}

impl SearchEvent {
    pub fn new(query: impl Into<String>, search_mode: SearchMode) -> Self {
        let query = query.into();
        Self {
            event_id: new_id("evt"),
            timestamp: Utc::now().to_rfc3339(),
            user_id: None,
            executed_query: query.clone(),
            query,
            databases: Vec::new(),
            search_mode,
            result_count: 0,
            total_count: 0,
            execution_time_ms: 0,
            cache_hit: false,
            failed_databases: Vec::new(),
        }
    }
}

/// Destination for search events.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: &SearchEvent) -> Result<(), AnalyticsError>;

    /// The most recent `limit` events, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<SearchEvent>, AnalyticsError>;
}

/// Source of query completions.
#[async_trait]
pub trait PopularQueries: Send + Sync {
    /// Most frequent past queries matching `prefix`.
    async fn popular(&self, prefix: &str, limit: usize) -> Result<Vec<String>, AnalyticsError>;

    /// The user's own recent queries matching `prefix`, newest first.
    async fn recent_for_user(
        &self,
        _user_id: &str,
        _prefix: &str,
        _limit: usize,
    ) -> Result<Vec<String>, AnalyticsError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Bounded in-process event store. Once full, the oldest event is dropped
/// for each new one.
pub struct MemoryAnalytics {
    events: Mutex<VecDeque<SearchEvent>>,
    capacity: usize,
}

impl MemoryAnalytics {
    pub fn new() -> Self {
        Self::with_capacity(crate::config::DEFAULT_MEMORY_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn load_all(&self) -> Result<Vec<SearchEvent>, AnalyticsError> {
        Ok(self.lock()?.iter().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<SearchEvent>>, AnalyticsError> {
        self.events
            .lock()
            .map_err(|e| AnalyticsError::Other(format!("analytics store poisoned: {}", e)))
    }
}

impl Default for MemoryAnalytics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalyticsSink for MemoryAnalytics {
    async fn record(&self, event: &SearchEvent) -> Result<(), AnalyticsError> {
        let mut events = self.lock()?;
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SearchEvent>, AnalyticsError> {
        let events = self.lock()?;
        let skip = events.len().saturating_sub(limit);
        Ok(events.iter().skip(skip).cloned().collect())
    }
}

#[async_trait]
impl PopularQueries for MemoryAnalytics {
    async fn popular(&self, prefix: &str, limit: usize) -> Result<Vec<String>, AnalyticsError> {
        let mut events = self.lock()?;
        Ok(popular_queries(events.make_contiguous(), prefix, limit))
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, AnalyticsError> {
        let mut events = self.lock()?;
        Ok(user_history(events.make_contiguous(), user_id, prefix, limit))
    }
}

// ============================================================================
// JSON-lines file store
// ============================================================================

/// Append-only JSON-lines event log.
pub struct FileAnalytics {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAnalytics {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn new_default() -> Result<Self, AnalyticsError> {
        Self::new(Self::default_path())
    }

    /// `~/.fedsql/searches.jsonl`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fedsql")
            .join("searches.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every event; unparseable lines are skipped.
    pub fn load_all(&self) -> Result<Vec<SearchEvent>, AnalyticsError> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SearchEvent>(&line) {
                Ok(event) => out.push(event),
                Err(err) => tracing::debug!(target: "fedsql.analytics", "skipping bad event line: {}", err),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl AnalyticsSink for FileAnalytics {
    async fn record(&self, event: &SearchEvent) -> Result<(), AnalyticsError> {
        let line = serde_json::to_string(event)?;
        let mut file = self
            .file
            .lock()
            .map_err(|e| AnalyticsError::Other(format!("analytics log poisoned: {}", e)))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SearchEvent>, AnalyticsError> {
        Ok(tail(self.load_all()?, limit))
    }
}

#[async_trait]
impl PopularQueries for FileAnalytics {
    async fn popular(&self, prefix: &str, limit: usize) -> Result<Vec<String>, AnalyticsError> {
        Ok(popular_queries(&self.load_all()?, prefix, limit))
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, AnalyticsError> {
        Ok(user_history(&self.load_all()?, user_id, prefix, limit))
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Aggregate trends over `events`.
pub fn compute_trends(events: &[SearchEvent], top_n: usize) -> SearchTrends {
    let total = events.len();
    if total == 0 {
        return SearchTrends::default();
    }

    let hits = events.iter().filter(|e| e.cache_hit).count();
    let executed: Vec<u64> = events
        .iter()
        .filter(|e| !e.cache_hit)
        .map(|e| e.execution_time_ms)
        .collect();
    let average_execution_ms = if executed.is_empty() {
        0.0
    } else {
        executed.iter().sum::<u64>() as f64 / executed.len() as f64
    };

    let mut searches_by_mode = BTreeMap::new();
    for event in events {
        *searches_by_mode
            .entry(event.search_mode.as_str().to_string())
            .or_insert(0) += 1;
    }

    let top_queries = ranked_counts(events.iter().map(|e| e.query.as_str()))
        .into_iter()
        .take(top_n)
        .map(|(query, count)| QueryCount { query, count })
        .collect();

    SearchTrends {
        total_searches: total,
        cache_hit_rate: hits as f64 / total as f64,
        average_execution_ms,
        top_queries,
        searches_by_mode,
    }
}

/// Most frequent queries matching `prefix`, lowercased.
pub fn popular_queries(events: &[SearchEvent], prefix: &str, limit: usize) -> Vec<String> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() {
        return Vec::new();
    }
    ranked_counts(
        events
            .iter()
            .map(|e| e.query.as_str())
            .filter(|q| matches_prefix(q, &prefix)),
    )
    .into_iter()
    .take(limit)
    .map(|(query, _)| query)
    .collect()
}

/// A user's distinct queries matching `prefix`, newest first.
pub fn user_history(events: &[SearchEvent], user_id: &str, prefix: &str, limit: usize) -> Vec<String> {
    let prefix = prefix.trim().to_lowercase();
    let mut out: Vec<String> = Vec::new();
    for event in events.iter().rev() {
        if out.len() >= limit {
            break;
        }
        if event.user_id.as_deref() != Some(user_id) {
            continue;
        }
        let query = event.query.to_lowercase();
        if !prefix.is_empty() && !matches_prefix(&query, &prefix) {
            continue;
        }
        if !query.is_empty() && !out.contains(&query) {
            out.push(query);
        }
    }
    out
}

/// Prefix match on the whole query, on any word, or ignoring spaces.
fn matches_prefix(query: &str, prefix_lower: &str) -> bool {
    let query = query.to_lowercase();
    if query.starts_with(prefix_lower) {
        return true;
    }
    if query.split_whitespace().any(|w| w.starts_with(prefix_lower)) {
        return true;
    }
    let compact: String = query.split_whitespace().collect();
    let compact_prefix: String = prefix_lower.split_whitespace().collect();
    compact.starts_with(&compact_prefix)
}

/// Case-insensitive frequency counts, most frequent first, ties alphabetical.
fn ranked_counts<'a>(queries: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for q in queries {
        let q = q.trim().to_lowercase();
        if !q.is_empty() {
            *counts.entry(q).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn tail(mut events: Vec<SearchEvent>, limit: usize) -> Vec<SearchEvent> {
    if events.len() > limit {
        events.drain(..events.len() - limit);
    }
    events
}

fn new_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let ts = Utc::now().timestamp_millis();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    format!("{}-{}-{}-{}", prefix, ts, pid, seq)
}
