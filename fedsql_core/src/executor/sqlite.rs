//! SQLite FTS5 executor.
//!
//! Searches FTS5 virtual tables with `MATCH` and ranks rows by `bm25`.
//! Rows come back as JSON objects carrying `_table`, `_rowid` and
//! `_score` (the negated bm25 rank, higher is better) next to the table's
//! own columns.

use super::{DatabaseExecutor, ExecutionRequest, PerformanceSource};
use crate::config::DatabaseConfig;
use crate::error::ExecutionError;
use crate::federated::{PerformanceSample, SearchMode};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteExecutor {
    id: String,
    description: String,
    pool: SqlitePool,
    /// Configured searchable tables; empty means discover FTS5 tables
    tables: Vec<String>,
    timeout: Duration,
}

enum ColumnFilter {
    All,
    Only(Vec<String>),
    Nothing,
}

impl SqliteExecutor {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ExecutionError> {
        // Every connection to an in-memory database sees its own empty database.
        let max_connections = if config.url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| ExecutionError::Connection(format!("{}: {}", config.id, e)))?;

        sqlx::query("PRAGMA busy_timeout=5000")
            .execute(&pool)
            .await?;

        info!(target: "fedsql.search", database = %config.id, "sqlite database connected");

        let executor = Self::from_pool(
            config.id.clone(),
            pool,
            config.tables.clone(),
            Duration::from_millis(config.timeout_ms),
        );
        Ok(match config.description {
            Some(ref description) => executor.with_description(description.clone()),
            None => executor,
        })
    }

    pub fn from_pool(
        id: impl Into<String>,
        pool: SqlitePool,
        tables: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            pool,
            tables,
            timeout,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// FTS5 tables present in the database, by name.
    pub async fn discover_tables(&self) -> Result<Vec<String>, ExecutionError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND lower(sql) LIKE '%using fts5%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn searchable_tables(&self, requested: &[String]) -> Result<Vec<String>, ExecutionError> {
        let available = if self.tables.is_empty() {
            self.discover_tables().await?
        } else {
            self.tables.clone()
        };

        if requested.is_empty() {
            return Ok(available);
        }
        Ok(available
            .into_iter()
            .filter(|t| requested.iter().any(|r| r.eq_ignore_ascii_case(t)))
            .collect())
    }

    async fn column_filter(
        &self,
        table: &str,
        requested: &[String],
    ) -> Result<ColumnFilter, ExecutionError> {
        if requested.is_empty() {
            return Ok(ColumnFilter::All);
        }

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let selected: Vec<String> = columns
            .into_iter()
            .filter(|c| is_bareword(c))
            .filter(|c| requested.iter().any(|r| r.eq_ignore_ascii_case(c)))
            .collect();

        Ok(if selected.is_empty() {
            ColumnFilter::Nothing
        } else {
            ColumnFilter::Only(selected)
        })
    }

    async fn search(
        &self,
        request: &ExecutionRequest,
        expression: &str,
    ) -> Result<Vec<Value>, ExecutionError> {
        let fetch_limit = i64::from(request.limit.saturating_add(request.offset));
        let mut rows: Vec<Value> = Vec::new();

        for table in self.searchable_tables(&request.tables).await? {
            let matched = match self.column_filter(&table, &request.columns).await? {
                ColumnFilter::All => expression.to_string(),
                ColumnFilter::Only(columns) => format!("{{{}}} : ({})", columns.join(" "), expression),
                ColumnFilter::Nothing => continue,
            };

            let ident = quote_ident(&table);
            let sql = format!(
                "SELECT rowid AS _rowid, bm25({ident}) AS _rank, * FROM {ident} \
                 WHERE {ident} MATCH ?1 ORDER BY _rank LIMIT ?2"
            );

            let fetched = sqlx::query(&sql)
                .bind(&matched)
                .bind(fetch_limit)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| match_error(&table, e))?;

            debug!(
                target: "fedsql.search",
                database = %self.id,
                table = %table,
                rows = fetched.len(),
                "fts5 table searched"
            );

            for row in &fetched {
                let mut obj = row_to_json(row);
                let rank = obj.remove("_rank").and_then(|v| v.as_f64()).unwrap_or(0.0);
                obj.insert("_score".to_string(), json!(-rank));
                obj.insert("_table".to_string(), json!(table));
                rows.push(Value::Object(obj));
            }
        }

        // Stable: equal scores keep table order.
        rows.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));

        Ok(rows
            .into_iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .collect())
    }
}

#[async_trait]
impl DatabaseExecutor for SqliteExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<Vec<Value>, ExecutionError> {
        let Some(expression) = match_expression(&request.query, request.mode) else {
            return Ok(Vec::new());
        };

        match tokio::time::timeout(self.timeout, self.search(request, &expression)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(format!(
                "{} did not answer within {}ms",
                self.id,
                self.timeout.as_millis()
            ))),
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[async_trait]
impl PerformanceSource for SqliteExecutor {
    async fn samples(&self) -> Result<Vec<PerformanceSample>, ExecutionError> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        let freelist: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&self.pool)
            .await?;

        let metric = |name: &str| format!("{}.{}", self.id, name);
        let mut samples = vec![
            PerformanceSample::new(metric("page_count"), page_count as f64),
            PerformanceSample::new(metric("page_size"), page_size as f64),
            PerformanceSample::new(metric("size_bytes"), (page_count * page_size) as f64),
            PerformanceSample::new(metric("freelist_pages"), freelist as f64),
        ];

        let tables = self.searchable_tables(&[]).await?;
        samples.push(PerformanceSample::new(metric("fts_tables"), tables.len() as f64));
        for table in &tables {
            let sql = format!("SELECT count(*) FROM {}", quote_ident(table));
            let rows: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
            samples.push(PerformanceSample::new(
                metric(&format!("rows.{}", table)),
                rows as f64,
            ));
        }

        Ok(samples)
    }
}

/// FTS5 expression for a query, or `None` when nothing is searchable.
///
/// Natural and semantic queries become an OR of quoted terms so user input
/// can never be parsed as FTS5 syntax. Boolean queries pass through.
pub fn match_expression(query: &str, mode: SearchMode) -> Option<String> {
    match mode {
        SearchMode::Boolean => {
            let trimmed = query.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        SearchMode::Natural | SearchMode::Semantic => {
            let mut terms: Vec<String> = Vec::new();
            for term in query
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase)
            {
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
            if terms.is_empty() {
                return None;
            }
            Some(
                terms
                    .iter()
                    .map(|t| format!("\"{}\"", t))
                    .collect::<Vec<_>>()
                    .join(" OR "),
            )
        }
    }
}

/// Errors reported by SQLite itself (FTS5 syntax, unknown columns) become
/// `Query`; driver and pool errors pass through.
fn match_error(table: &str, err: sqlx::Error) -> ExecutionError {
    match err {
        sqlx::Error::Database(db) => ExecutionError::Query(format!("{}: {}", table, db.message())),
        other => ExecutionError::Sqlx(other),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_bareword(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn score_of(row: &Value) -> f64 {
    row.get("_score").and_then(Value::as_f64).unwrap_or(0.0)
}

fn row_to_json(row: &SqliteRow) -> Map<String, Value> {
    let mut obj = Map::new();
    for column in row.columns() {
        obj.insert(column.name().to_string(), decode_column(row, column.ordinal()));
    }
    obj
}

fn decode_column(row: &SqliteRow, idx: usize) -> Value {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(idx)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|bytes| Value::String(hex::encode(bytes)))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn executor() -> SqliteExecutor {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        for stmt in [
            "CREATE VIRTUAL TABLE articles USING fts5(title, body)",
            "CREATE VIRTUAL TABLE notes USING fts5(body)",
            "CREATE TABLE plain (body TEXT)",
            "INSERT INTO articles(title, body) VALUES \
                ('Vacuum tuning', 'How vacuum keeps database pages compact'), \
                ('Rust async', 'Futures and executors explained'), \
                ('Python tips', 'List comprehensions and generators')",
            "INSERT INTO notes(body) VALUES ('remember to vacuum the staging database')",
            "INSERT INTO plain(body) VALUES ('vacuum')",
        ] {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }

        SqliteExecutor::from_pool("wiki", pool, Vec::new(), Duration::from_secs(5))
    }

    fn request(query: &str, mode: SearchMode) -> ExecutionRequest {
        ExecutionRequest {
            database: "wiki".to_string(),
            query: query.to_string(),
            tables: Vec::new(),
            columns: Vec::new(),
            limit: 10,
            offset: 0,
            mode,
        }
    }

    #[test]
    fn test_match_expression() {
        assert_eq!(
            match_expression("Rust \"async\" NEAR(io)", SearchMode::Natural).as_deref(),
            Some("\"rust\" OR \"async\" OR \"near\" OR \"io\"")
        );
        assert_eq!(
            match_expression(" rust NOT python ", SearchMode::Boolean).as_deref(),
            Some("rust NOT python")
        );
        assert!(match_expression("  -- ", SearchMode::Semantic).is_none());
        assert!(match_expression("   ", SearchMode::Boolean).is_none());
    }

    #[tokio::test]
    async fn test_discovers_only_fts_tables() {
        let exec = executor().await;
        assert_eq!(exec.discover_tables().await.unwrap(), vec!["articles", "notes"]);
    }

    #[tokio::test]
    async fn test_natural_search_returns_ranked_rows() {
        let exec = executor().await;
        let rows = exec
            .execute(&request("vacuum", SearchMode::Natural))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row["_score"].as_f64().unwrap() >= 0.0);
            assert!(row["_rowid"].is_i64());
            assert!(row.get("_rank").is_none());
        }
        let tables: Vec<&str> = rows.iter().filter_map(|r| r["_table"].as_str()).collect();
        assert!(tables.contains(&"articles"));
        assert!(tables.contains(&"notes"));

        let article = rows.iter().find(|r| r["_table"] == "articles").unwrap();
        assert_eq!(article["title"], "Vacuum tuning");
    }

    #[tokio::test]
    async fn test_table_and_column_restrictions() {
        let exec = executor().await;

        let mut req = request("vacuum", SearchMode::Natural);
        req.tables = vec!["NOTES".to_string()];
        let rows = exec.execute(&req).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["_table"], "notes");

        let mut req = request("futures", SearchMode::Natural);
        req.columns = vec!["title".to_string()];
        assert!(exec.execute(&req).await.unwrap().is_empty());

        req.columns = vec!["body".to_string()];
        let rows = exec.execute(&req).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "Rust async");
    }

    #[tokio::test]
    async fn test_boolean_mode() {
        let exec = executor().await;
        let rows = exec
            .execute(&request("database NOT staging", SearchMode::Boolean))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["_table"], "articles");

        let err = exec
            .execute(&request("\"unbalanced", SearchMode::Boolean))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Query(ref msg) if msg.starts_with("articles: ")));
        assert_eq!(err.code_str(), "query_failed");
    }

    #[tokio::test]
    async fn test_limit_and_offset() {
        let exec = executor().await;
        let mut req = request("vacuum database", SearchMode::Natural);
        req.limit = 1;
        let first = exec.execute(&req).await.unwrap();
        req.offset = 1;
        let second = exec.execute(&req).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0]["_table"], second[0]["_table"]);
    }

    #[tokio::test]
    async fn test_empty_expression_skips_database() {
        let exec = executor().await;
        assert!(exec
            .execute(&request("!!!", SearchMode::Natural))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_performance_samples() {
        let exec = executor().await;
        let samples = exec.samples().await.unwrap();
        let get = |name: &str| {
            samples
                .iter()
                .find(|s| s.metric == name)
                .map(|s| s.value)
                .unwrap()
        };
        assert!(get("wiki.page_count") > 0.0);
        assert_eq!(get("wiki.fts_tables"), 2.0);
        assert_eq!(get("wiki.rows.articles"), 3.0);
        assert_eq!(get("wiki.rows.notes"), 1.0);
    }
}
