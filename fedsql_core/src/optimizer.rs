//! Query optimizer capability.
//!
//! The optimizer rewrites a query for semantic search and may propose
//! related queries. It is optional: the orchestrator falls back to the
//! original query on any failure.

use crate::config::OptimizerConfig;
use crate::error::OptimizationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Result of a successful optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedQuery {
    pub optimized_query: String,

    /// Auxiliary context (intent, expansions, ...) surfaced in the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[async_trait]
pub trait QueryOptimizer: Send + Sync {
    fn is_available(&self) -> bool;

    async fn optimize(&self, query: &str) -> Result<OptimizedQuery, OptimizationError>;

    /// Related queries for a partial input. Optional.
    async fn semantic_suggestions(&self, _partial: &str) -> Result<Vec<String>, OptimizationError> {
        Ok(Vec::new())
    }
}

/// Optimizer reached over HTTP.
///
/// Sends `{"task", "query", "model"}` as JSON to the configured endpoint and
/// expects `{"optimized_query", "context"}` or `{"suggestions": [...]}`.
pub struct HttpQueryOptimizer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    requires_key: bool,
    model: Option<String>,
}

impl HttpQueryOptimizer {
    pub fn from_config(config: &OptimizerConfig) -> Result<Self, OptimizationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            requires_key: config.api_key_env.is_some(),
            model: config.model.clone(),
        })
    }

    async fn post(&self, task: &str, query: &str) -> Result<Value, OptimizationError> {
        if !self.is_available() {
            return Err(OptimizationError::Unavailable);
        }

        let mut body = json!({ "task": task, "query": query });
        if let Some(ref model) = self.model {
            body["model"] = json!(model);
        }

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(target: "fedsql.optimizer", task, endpoint = %self.endpoint, "optimizer request");
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl QueryOptimizer for HttpQueryOptimizer {
    fn is_available(&self) -> bool {
        !self.requires_key || self.api_key.is_some()
    }

    async fn optimize(&self, query: &str) -> Result<OptimizedQuery, OptimizationError> {
        let raw = self.post("optimize", query).await?;
        parse_optimize_response(&raw)
    }

    async fn semantic_suggestions(&self, partial: &str) -> Result<Vec<String>, OptimizationError> {
        let raw = self.post("suggest", partial).await?;
        parse_suggestions_response(&raw)
    }
}

/// Accepts snake_case or camelCase field names.
fn parse_optimize_response(raw: &Value) -> Result<OptimizedQuery, OptimizationError> {
    let optimized = raw
        .get("optimized_query")
        .or_else(|| raw.get("optimizedQuery"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            OptimizationError::InvalidResponse("missing optimized_query".to_string())
        })?;

    let context = raw.get("context").filter(|v| !v.is_null()).cloned();

    Ok(OptimizedQuery {
        optimized_query: optimized.to_string(),
        context,
    })
}

fn parse_suggestions_response(raw: &Value) -> Result<Vec<String>, OptimizationError> {
    let items = raw
        .get("suggestions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| OptimizationError::InvalidResponse("missing suggestions".to_string()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            item.as_str()
                .or_else(|| item.get("text").and_then(|t| t.as_str()))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .collect())
}
