//! Per-database execution.
//!
//! Every backing database is reached through a `DatabaseExecutor`. The
//! orchestrator only sees the trait; concrete store types live in
//! submodules.

pub mod sqlite;

pub use sqlite::SqliteExecutor;

use crate::error::ExecutionError;
use crate::federated::{PerformanceSample, SearchMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One full-text query against one database.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub database: String,
    pub query: String,
    /// Empty means every searchable table
    pub tables: Vec<String>,
    /// Empty means every column
    pub columns: Vec<String>,
    pub limit: u32,
    pub offset: u32,
    pub mode: SearchMode,
}

/// Runs a full-text query and returns ranked rows.
///
/// Rows are free-form JSON objects. Fields prefixed with `_` (`_table`,
/// `_rowid`, `_score`, ...) are treated as metadata by the merger.
#[async_trait]
pub trait DatabaseExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<Value>, ExecutionError>;

    fn description(&self) -> &str {
        ""
    }
}

/// Source of performance metrics.
#[async_trait]
pub trait PerformanceSource: Send + Sync {
    async fn samples(&self) -> Result<Vec<PerformanceSample>, ExecutionError>;
}

/// Concatenates the samples of several sources, in order.
///
/// A failing source fails the whole call.
#[derive(Default, Clone)]
pub struct CompositePerformance {
    sources: Vec<Arc<dyn PerformanceSource>>,
}

impl CompositePerformance {
    pub fn new(sources: Vec<Arc<dyn PerformanceSource>>) -> Self {
        Self { sources }
    }

    pub fn push(&mut self, source: Arc<dyn PerformanceSource>) {
        self.sources.push(source);
    }
}

#[async_trait]
impl PerformanceSource for CompositePerformance {
    async fn samples(&self) -> Result<Vec<PerformanceSample>, ExecutionError> {
        let mut out = Vec::new();
        for source in &self.sources {
            out.extend(source.samples().await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub id: String,
    pub description: String,
}

/// Executors keyed by database id.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn DatabaseExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any previous one with the same id.
    pub fn register(&mut self, id: impl Into<String>, executor: Arc<dyn DatabaseExecutor>) {
        self.executors.insert(id.into(), executor);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn DatabaseExecutor>> {
        self.executors.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.executors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Registered databases sorted by id.
    pub fn list(&self) -> Vec<DatabaseInfo> {
        let mut out: Vec<DatabaseInfo> = self
            .executors
            .iter()
            .map(|(id, executor)| DatabaseInfo {
                id: id.clone(),
                description: executor.description().to_string(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Execute against the named database.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<Value>, ExecutionError> {
        let executor = self
            .get(&request.database)
            .ok_or_else(|| ExecutionError::UnknownDatabase(request.database.clone()))?;
        executor.execute(request).await
    }
}
