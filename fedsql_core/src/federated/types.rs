//! Core types for federated search requests and responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// How the query text is interpreted by the backing databases.
///
/// Deserialization is lenient: casing is ignored and unrecognized values
/// fall back to `Natural` instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SearchMode {
    /// Terms are matched independently and ranked (default)
    #[default]
    Natural,
    /// Query is a boolean full-text expression passed through as-is
    Boolean,
    /// Query may be rewritten by the optimizer before execution
    Semantic,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Natural => "natural",
            SearchMode::Boolean => "boolean",
            SearchMode::Semantic => "semantic",
        }
    }
}

impl From<&str> for SearchMode {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "boolean" => SearchMode::Boolean,
            "semantic" => SearchMode::Semantic,
            _ => SearchMode::Natural,
        }
    }
}

impl From<String> for SearchMode {
    fn from(value: String) -> Self {
        SearchMode::from(value.as_str())
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied search options. Unset fields take engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Database identifiers to search, in priority order
    #[serde(default)]
    pub databases: Vec<String>,

    /// Restrict the search to these tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,

    /// Restrict matching to these columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<SearchMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,

    /// Attach trends to the response
    #[serde(default)]
    pub include_analytics: bool,

    /// Opaque caller identity for history and analytics attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl SearchOptions {
    pub fn new<I, S>(databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            databases: databases.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<SearchMode>) -> Self {
        self.search_mode = Some(mode.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_analytics(mut self, include: bool) -> Self {
        self.include_analytics = include;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// A single merged search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Unique within a response: `database:table:row`
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    pub database: String,

    /// Higher is more relevant. Not normalized across databases.
    pub relevance_score: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_columns: Vec<String>,

    /// Row payload as returned by the database
    #[serde(default)]
    pub data: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

/// Notices and optimizer details attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptimization {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimized_query: Option<String>,

    /// Auxiliary context returned by the optimizer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl QueryOptimization {
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            notices: vec![message.into()],
            ..Self::default()
        }
    }
}

/// A database whose call failed during fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseFailure {
    pub database: String,
    pub error: String,
    #[serde(default)]
    pub is_timeout: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// Frequently searched by everyone
    Popular,
    /// Proposed by the query optimizer
    Semantic,
    /// From the requesting user's own history
    Recent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub score: f64,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
}

/// A single performance metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub metric: String,
    pub value: f64,
}

impl PerformanceSample {
    pub fn new(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCount {
    pub query: String,
    pub count: usize,
}

/// Aggregates over recent search events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchTrends {
    pub total_searches: usize,
    /// Fraction of searches served from cache (0.0 - 1.0)
    pub cache_hit_rate: f64,
    /// Mean execution time of searches that hit the databases
    pub average_execution_ms: f64,
    #[serde(default)]
    pub top_queries: Vec<QueryCount>,
    #[serde(default)]
    pub searches_by_mode: BTreeMap<String, usize>,
}

/// Complete response from a federated search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Page of results ordered by descending relevance
    pub results: Vec<SearchResult>,

    /// Matches across all databases before pagination
    pub total_count: usize,

    /// Wall-clock time of the orchestration (ms)
    pub execution_time_ms: u64,

    /// The query actually executed
    pub query: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<Suggestion>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_optimization: Option<QueryOptimization>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<SearchTrends>,

    /// Databases excluded because their call failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_databases: Vec<DatabaseFailure>,
}

impl SearchResponse {
    /// An empty successful response for `query`.
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            total_count: 0,
            execution_time_ms: 0,
            query: query.into(),
            categories: Vec::new(),
            suggestions: None,
            query_optimization: None,
            trends: None,
            failed_databases: Vec::new(),
        }
    }

    pub fn with_notice(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        match self.query_optimization.as_mut() {
            Some(opt) => opt.notices.push(message),
            None => self.query_optimization = Some(QueryOptimization::notice(message)),
        }
        self
    }

    /// Whether some databases failed (partial results).
    pub fn is_partial(&self) -> bool {
        !self.failed_databases.is_empty()
    }
}
