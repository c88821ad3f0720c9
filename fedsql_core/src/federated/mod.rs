//! Federated search across multiple databases.
//!
//! This module provides:
//! - `SearchOrchestrator`: cache, optimizer, fan-out and merge for one request
//! - `ResultMerger`: normalization and ranking of heterogeneous rows
//! - `SearchCache`/`MemoryCache`: response caching keyed by request fingerprints
//! - `SuggestionEngine`: query completions
//!
//! # Example
//!
//! ```ignore
//! use fedsql_core::federated::{SearchOptions, SearchOrchestrator};
//!
//! let orchestrator = SearchOrchestrator::builder()
//!     .executor("wiki", wiki_executor)
//!     .build();
//! let response = orchestrator
//!     .perform_search("vacuum tuning", &SearchOptions::new(["wiki"]))
//!     .await?;
//! ```

mod cache;
mod engine;
pub mod merge;
mod request;
mod suggestions;
mod types;

pub use cache::{fingerprint, MemoryCache, SearchCache};
pub use engine::{
    SearchOrchestrator, SearchOrchestratorBuilder, CPU_MERGE_THRESHOLD, NO_DATABASES_NOTICE,
};
pub use merge::{DatabaseRows, ResultMerger, NEUTRAL_SCORE};
pub use request::NormalizedRequest;
pub use suggestions::SuggestionEngine;
pub use types::{
    DatabaseFailure, PerformanceSample, QueryCount, QueryOptimization, SearchMode, SearchOptions,
    SearchResponse, SearchResult, SearchTrends, Suggestion, SuggestionType,
};
