//! Normalization and ranking of per-database rows.
//!
//! Databases return heterogeneous row shapes. Every row maps to a
//! `SearchResult`; rows lacking the expected fields degrade to a minimal
//! result instead of being dropped.

use super::SearchResult;
use crate::error::SearchError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};

/// Score assigned to rows that carry no relevance signal.
pub const NEUTRAL_SCORE: f64 = 0.5;

static TERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}_]+").expect("term pattern is valid"));

/// Full-text operators that are not search terms.
const OPERATORS: &[&str] = &["and", "or", "not", "near"];

const TABLE_FIELDS: &[&str] = &["_table", "table"];
const ROW_ID_FIELDS: &[&str] = &["_rowid", "rowid", "id"];
const SCORE_FIELDS: &[&str] = &["_score", "relevance_score", "relevance", "score"];
const SNIPPET_FIELDS: &[&str] = &["_snippet", "snippet"];
const MATCHED_FIELDS: &[&str] = &["_matched_columns", "matched_columns"];
const CATEGORY_FIELDS: &[&str] = &["_categories", "categories", "category", "tags"];

/// Executor metadata stripped from the row payload.
const METADATA_FIELDS: &[&str] = &[
    "_table",
    "_rowid",
    "_score",
    "_rank",
    "_snippet",
    "_matched_columns",
    "_categories",
];

/// Rows returned by one database, in the database's own order.
#[derive(Debug, Clone)]
pub struct DatabaseRows {
    pub database: String,
    pub rows: Vec<Value>,
}

impl DatabaseRows {
    pub fn new(database: impl Into<String>, rows: Vec<Value>) -> Self {
        Self {
            database: database.into(),
            rows,
        }
    }
}

/// Maps raw rows to ranked results for one query.
#[derive(Debug, Clone)]
pub struct ResultMerger {
    matcher: Option<Regex>,
    columns: Vec<String>,
    snippet_length: usize,
}

impl ResultMerger {
    /// `columns` restricts which fields count as matched; empty means all.
    pub fn new(query: &str, columns: Vec<String>, snippet_length: usize) -> Self {
        Self {
            matcher: build_matcher(query),
            columns,
            snippet_length: snippet_length.max(1),
        }
    }

    /// Normalize, rank and de-duplicate all row sets.
    ///
    /// Order: relevance descending; ties keep the order of `sets` and then
    /// the order within each set. Pagination is left to the caller.
    pub fn merge(&self, sets: &[DatabaseRows]) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = sets
            .iter()
            .flat_map(|set| {
                set.rows
                    .iter()
                    .enumerate()
                    .map(move |(idx, row)| self.normalize_row(&set.database, row, idx))
            })
            .collect();

        // Stable sort preserves the declared database order on ties.
        results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        let mut seen = HashSet::new();
        results.retain(|r| seen.insert(r.id.clone()));
        results
    }

    /// Same as [`merge`](Self::merge), run on the rayon pool so large row
    /// sets do not stall the async runtime.
    ///
    /// A panic while merging surfaces as `SearchError::Internal`.
    pub async fn merge_offloaded(
        self,
        sets: Vec<DatabaseRows>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        rayon::spawn(move || {
            let merged = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.merge(&sets)
            }));
            let _ = tx.send(merged);
        });

        match rx.await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(_)) => Err(SearchError::Internal("result merge panicked".to_string())),
            Err(_) => Err(SearchError::Internal(
                "result merge was dropped before completing".to_string(),
            )),
        }
    }

    /// Map one raw row to a result. Never fails.
    pub fn normalize_row(&self, database: &str, row: &Value, position: usize) -> SearchResult {
        let Some(obj) = row.as_object() else {
            return SearchResult {
                id: format!("{}:_:{}", database, position),
                table: None,
                database: database.to_string(),
                relevance_score: NEUTRAL_SCORE,
                matched_columns: Vec::new(),
                data: row.clone(),
                snippet: None,
                categories: Vec::new(),
            };
        };

        let table = first_string(obj, TABLE_FIELDS);
        let row_id = first_scalar(obj, ROW_ID_FIELDS).unwrap_or_else(|| position.to_string());
        let data = extract_data(obj);

        let matched_columns = match first_string_list(obj, MATCHED_FIELDS) {
            Some(cols) => cols,
            None => self.matched_columns(&data),
        };

        let snippet = first_string(obj, SNIPPET_FIELDS)
            .map(|s| truncate_chars(&collapse_whitespace(&s), self.snippet_length))
            .or_else(|| self.build_snippet(&data, &matched_columns));

        let mut categories = first_string_list(obj, CATEGORY_FIELDS)
            .or_else(|| data.as_object().and_then(|d| first_string_list(d, CATEGORY_FIELDS)))
            .unwrap_or_default();
        if categories.is_empty() {
            if let Some(ref t) = table {
                categories.push(t.clone());
            }
        }

        SearchResult {
            id: format!(
                "{}:{}:{}",
                database,
                table.as_deref().unwrap_or("_"),
                row_id
            ),
            table,
            database: database.to_string(),
            relevance_score: extract_score(obj),
            matched_columns,
            data,
            snippet,
            categories,
        }
    }

    fn column_allowed(&self, column: &str) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    fn matched_columns(&self, data: &Value) -> Vec<String> {
        let (Some(matcher), Some(obj)) = (self.matcher.as_ref(), data.as_object()) else {
            return Vec::new();
        };
        obj.iter()
            .filter(|(col, _)| self.column_allowed(col))
            .filter(|(_, value)| value_text(value).is_some_and(|t| matcher.is_match(&t)))
            .map(|(col, _)| col.clone())
            .collect()
    }

    fn build_snippet(&self, data: &Value, matched: &[String]) -> Option<String> {
        let obj = data.as_object()?;

        for col in matched {
            if let Some(text) = obj.get(col).and_then(value_text) {
                return Some(self.excerpt(&text));
            }
        }

        obj.iter()
            .filter(|(col, _)| self.column_allowed(col))
            .find_map(|(_, value)| value.as_str().filter(|s| !s.trim().is_empty()))
            .map(|s| truncate_chars(&collapse_whitespace(s), self.snippet_length))
    }

    /// Window of `snippet_length` characters around the first term hit.
    fn excerpt(&self, text: &str) -> String {
        let text = collapse_whitespace(text);
        let hit = self
            .matcher
            .as_ref()
            .and_then(|m| m.find(&text))
            .map(|m| text[..m.start()].chars().count())
            .unwrap_or(0);

        let total = text.chars().count();
        if total <= self.snippet_length {
            return text;
        }

        let lead = self.snippet_length / 3;
        let start = hit
            .saturating_sub(lead)
            .min(total.saturating_sub(self.snippet_length));
        let body: String = text.chars().skip(start).take(self.snippet_length).collect();

        let mut out = String::with_capacity(body.len() + 6);
        if start > 0 {
            out.push_str("...");
        }
        out.push_str(body.trim());
        if start + self.snippet_length < total {
            out.push_str("...");
        }
        out
    }
}

/// Apply `offset`/`limit` to a merged sequence.
pub fn paginate(results: Vec<SearchResult>, offset: u32, limit: u32) -> Vec<SearchResult> {
    results
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

/// Sorted union of result categories.
pub fn collect_categories(results: &[SearchResult]) -> Vec<String> {
    results
        .iter()
        .flat_map(|r| r.categories.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Lowercased search terms of a query, operators removed.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for m in TERM_RE.find_iter(query) {
        let term = m.as_str().to_lowercase();
        if !OPERATORS.contains(&term.as_str()) && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

fn build_matcher(query: &str) -> Option<Regex> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)({})", alternation)).ok()
}

fn extract_data(obj: &Map<String, Value>) -> Value {
    if let Some(data) = obj.get("data").filter(|d| d.is_object()) {
        return data.clone();
    }
    let payload: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| !METADATA_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(payload)
}

fn extract_score(obj: &Map<String, Value>) -> f64 {
    SCORE_FIELDS
        .iter()
        .filter_map(|f| obj.get(*f))
        .find_map(|v| {
            v.as_f64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        })
        .filter(|s| s.is_finite())
        .unwrap_or(NEUTRAL_SCORE)
}

fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|f| obj.get(*f))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

fn first_scalar(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().filter_map(|f| obj.get(*f)).find_map(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Arrays of strings, or comma-separated strings.
fn first_string_list(obj: &Map<String, Value>, fields: &[&str]) -> Option<Vec<String>> {
    fields.iter().filter_map(|f| obj.get(*f)).find_map(|v| {
        let items: Vec<String> = match v {
            Value::Array(items) => items
                .iter()
                .filter_map(|i| i.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Value::String(s) => s
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            _ => return None,
        };
        Some(items)
    })
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head.trim_end())
    }
}
