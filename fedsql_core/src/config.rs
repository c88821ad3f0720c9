//! Engine configuration.
//!
//! Everything has sensible defaults; a missing config file yields
//! `EngineConfig::default()`.

use crate::error::ConfigError;
use crate::federated::SearchMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

// ============================================================================
// Default Values
// ============================================================================

/// Default page size
pub const DEFAULT_LIMIT: u32 = 20;

/// Default cache entry lifetime in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Longest accepted cache entry lifetime (one year)
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Default number of cached responses kept in memory
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1024;

/// Default maximum snippet length in characters
pub const DEFAULT_SNIPPET_LENGTH: usize = 200;

/// Default number of suggestions returned
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

/// Score given to popular-query suggestions
pub const DEFAULT_POPULAR_SCORE: f64 = 0.8;

/// Score given to optimizer suggestions
pub const DEFAULT_SEMANTIC_SCORE: f64 = 0.6;

/// Score given to the user's own recent queries
pub const DEFAULT_RECENT_SCORE: f64 = 0.5;

/// Default number of events kept by the in-memory analytics store
pub const DEFAULT_MEMORY_EVENTS: usize = 10_000;

/// Default per-database timeout in milliseconds
pub const DEFAULT_DATABASE_TIMEOUT_MS: u64 = 10000;

/// Default optimizer timeout in milliseconds
pub const DEFAULT_OPTIMIZER_TIMEOUT_MS: u64 = 5000;

const CONFIG_ENV: &str = "FEDSQL_CONFIG";

// ============================================================================
// Sections
// ============================================================================

/// Defaults applied to requests that leave options unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDefaults {
    #[serde(default = "default_limit")]
    pub limit: u32,

    #[serde(default)]
    pub search_mode: SearchMode,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            search_mode: SearchMode::Natural,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "default_suggestion_limit")]
    pub limit: usize,

    #[serde(default = "default_popular_score")]
    pub popular_score: f64,

    #[serde(default = "default_semantic_score")]
    pub semantic_score: f64,

    #[serde(default = "default_recent_score")]
    pub recent_score: f64,
}

fn default_suggestion_limit() -> usize {
    DEFAULT_SUGGESTION_LIMIT
}

fn default_popular_score() -> f64 {
    DEFAULT_POPULAR_SCORE
}

fn default_semantic_score() -> f64 {
    DEFAULT_SEMANTIC_SCORE
}

fn default_recent_score() -> f64 {
    DEFAULT_RECENT_SCORE
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SUGGESTION_LIMIT,
            popular_score: DEFAULT_POPULAR_SCORE,
            semantic_score: DEFAULT_SEMANTIC_SCORE,
            recent_score: DEFAULT_RECENT_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendsConfig {
    /// Number of top queries reported
    #[serde(default = "default_top_queries")]
    pub top_queries: usize,

    /// Number of most recent events considered
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_top_queries() -> usize {
    5
}

fn default_window() -> usize {
    500
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            top_queries: default_top_queries(),
            window: default_window(),
        }
    }
}

/// Kind of backing store for a database entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseKind {
    #[default]
    Sqlite,
}

/// A searchable database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub id: String,

    #[serde(default)]
    pub kind: DatabaseKind,

    /// Connection URL, e.g. `sqlite:data/orders.db`
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Full-text tables searched when a request names none
    #[serde(default)]
    pub tables: Vec<String>,

    #[serde(default = "default_database_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_database_timeout_ms() -> u64 {
    DEFAULT_DATABASE_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub endpoint: Url,

    /// Environment variable holding the bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_optimizer_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_optimizer_timeout_ms() -> u64 {
    DEFAULT_OPTIMIZER_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// JSON-lines event log; in-memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Events kept by the in-memory store; oldest are dropped first
    #[serde(default = "default_memory_events")]
    pub memory_events: usize,
}

fn default_memory_events() -> usize {
    DEFAULT_MEMORY_EVENTS
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            path: None,
            memory_events: DEFAULT_MEMORY_EVENTS,
        }
    }
}

// ============================================================================
// EngineConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub defaults: SearchDefaults,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default = "default_snippet_length")]
    pub snippet_length: usize,

    #[serde(default)]
    pub suggestions: SuggestionConfig,

    #[serde(default)]
    pub trends: TrendsConfig,

    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<OptimizerConfig>,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

fn default_snippet_length() -> usize {
    DEFAULT_SNIPPET_LENGTH
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            defaults: SearchDefaults::default(),
            cache: CacheConfig::default(),
            snippet_length: DEFAULT_SNIPPET_LENGTH,
            suggestions: SuggestionConfig::default(),
            trends: TrendsConfig::default(),
            databases: Vec::new(),
            optimizer: None,
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse YAML config text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML config text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn database(&self, id: &str) -> Option<&DatabaseConfig> {
        self.databases.iter().find(|d| d.id == id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.limit == 0 {
            return Err(ConfigError::Invalid(
                "defaults.limit must be greater than zero".to_string(),
            ));
        }
        if self.cache.ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "cache.ttl_secs must be at most {} (one year)",
                MAX_CACHE_TTL_SECS
            )));
        }
        if self.analytics.memory_events == 0 {
            return Err(ConfigError::Invalid(
                "analytics.memory_events must be greater than zero".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for db in &self.databases {
            if db.id.trim().is_empty() {
                return Err(ConfigError::Invalid("database id cannot be empty".to_string()));
            }
            if !seen.insert(db.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate database id '{}'",
                    db.id
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// ConfigStore
// ============================================================================

/// Location of the engine config file.
///
/// Defaults to `~/.config/fedsql/config.yaml`; `FEDSQL_CONFIG` overrides it.
/// Files ending in `.toml` are parsed as TOML, everything else as YAML.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new_default() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::new(PathBuf::from(path));
        }
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("fedsql").join("config.yaml"),
        }
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config; a missing file yields defaults.
    pub fn load(&self) -> Result<EngineConfig, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(EngineConfig::default())
            }
            Err(e) => return Err(e.into()),
        };
        if self.is_toml() {
            EngineConfig::from_toml_str(&content)
        } else {
            EngineConfig::from_yaml_str(&content)
        }
    }

    pub fn save(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = if self.is_toml() {
            toml::to_string_pretty(config)
                .map_err(|e| ConfigError::Invalid(format!("toml serialization: {}", e)))?
        } else {
            serde_yaml::to_string(config)?
        };
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn is_toml(&self) -> bool {
        self.path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new_default()
    }
}
