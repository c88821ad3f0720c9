//! Request normalization.

use super::{SearchMode, SearchOptions};
use crate::config::SearchDefaults;

/// A search request with defaults applied and inputs cleaned up.
///
/// - query: trimmed, internal whitespace collapsed
/// - databases: blank ids dropped, duplicates removed, first occurrence kept
/// - limit: never zero
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub query: String,
    pub databases: Vec<String>,
    pub tables: Vec<String>,
    pub columns: Vec<String>,
    pub mode: SearchMode,
    pub limit: u32,
    pub offset: u32,
    pub include_analytics: bool,
    pub user_id: Option<String>,
}

impl NormalizedRequest {
    pub fn new(query: &str, options: &SearchOptions, defaults: &SearchDefaults) -> Self {
        let limit = match options.limit {
            Some(0) | None => defaults.limit.max(1),
            Some(limit) => limit,
        };

        Self {
            query: normalize_query(query),
            databases: clean_list(&options.databases),
            tables: options.tables.as_deref().map(clean_list).unwrap_or_default(),
            columns: options.columns.as_deref().map(clean_list).unwrap_or_default(),
            mode: options.search_mode.unwrap_or(defaults.search_mode),
            limit,
            offset: options.offset.unwrap_or(0),
            include_analytics: options.include_analytics,
            user_id: options.user_id.clone(),
        }
    }

    /// Number of rows to request from each database so that the merged
    /// sequence can be paginated globally.
    pub fn per_database_limit(&self) -> u32 {
        self.limit.saturating_add(self.offset)
    }
}

fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_list(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|existing| existing == item) {
            out.push(item.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> SearchDefaults {
        SearchDefaults::default()
    }

    #[test]
    fn test_applies_defaults() {
        let req = NormalizedRequest::new("  hello   world ", &SearchOptions::default(), &defaults());
        assert_eq!(req.query, "hello world");
        assert_eq!(req.mode, SearchMode::Natural);
        assert_eq!(req.limit, 20);
        assert_eq!(req.offset, 0);
        assert!(req.databases.is_empty());
    }

    #[test]
    fn test_zero_limit_falls_back_to_default() {
        let opts = SearchOptions::new(["a"]).with_limit(0);
        let req = NormalizedRequest::new("q", &opts, &defaults());
        assert_eq!(req.limit, 20);
    }

    #[test]
    fn test_databases_cleaned_in_order() {
        let opts = SearchOptions::new(["crm", " ", "orders", "crm ", ""]);
        let req = NormalizedRequest::new("q", &opts, &defaults());
        assert_eq!(req.databases, vec!["crm", "orders"]);
    }

    #[test]
    fn test_per_database_limit_covers_offset() {
        let opts = SearchOptions::new(["a"]).with_limit(10).with_offset(30);
        let req = NormalizedRequest::new("q", &opts, &defaults());
        assert_eq!(req.per_database_limit(), 40);
    }
}
