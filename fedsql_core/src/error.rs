// src/error.rs
use serde_json::json;

/// Errors surfaced by the search orchestrator.
///
/// Only a total fan-out failure aborts `perform_search`; everything else
/// degrades into a successful response.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("All {count} databases failed to respond: {}", .databases.join(", "))]
    AllDatabasesFailed {
        count: usize,
        databases: Vec<String>,
    },

    #[error("Performance analysis unavailable: {0}")]
    Performance(#[from] ExecutionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    pub fn code_str(&self) -> &'static str {
        match self {
            SearchError::AllDatabasesFailed { .. } => "all_failed",
            SearchError::Performance(_) => "performance_unavailable",
            SearchError::Internal(_) => "internal_error",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut body = json!({
            "code": self.code_str(),
            "message": self.to_string(),
        });
        if let SearchError::AllDatabasesFailed { databases, .. } = self {
            body["databases"] = json!(databases);
        }
        body
    }
}

/// Failure of a single per-database call.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Database '{0}' is not registered")]
    UnknownDatabase(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl ExecutionError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ExecutionError::UnknownDatabase(_) => "unknown_database",
            ExecutionError::Connection(_) => "connection_failed",
            ExecutionError::Query(_) => "query_failed",
            ExecutionError::Timeout(_) => "timeout",
            ExecutionError::Sqlx(_) => "query_failed",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum OptimizationError {
    #[error("optimizer is not available")]
    Unavailable,

    #[error("optimizer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid optimizer response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("other: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
