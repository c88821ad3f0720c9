//! Pretty formatter for terminal output.
//!
//! Results render as numbered cards; tabular data renders through
//! comfy-table.

use crate::commands::{terminal_width, truncate_text};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use fedsql_core::config::DatabaseConfig;
use fedsql_core::federated::{
    PerformanceSample, SearchResponse, SearchResult, SearchTrends, Suggestion, SuggestionType,
};
use owo_colors::OwoColorize;
use serde_json::Value;

/// Indent for card content (after number)
const CARD_INDENT: &str = "      ";

/// Fields shown as the card title, in order of preference
const TITLE_KEYS: &[&str] = &["title", "name", "subject", "headline"];

pub fn format_search(response: &SearchResponse) -> String {
    let width = terminal_width();
    let mut out = String::new();

    out.push_str(&format_section_header(
        &format!("\"{}\"", response.query),
        response.total_count,
        width,
    ));
    out.push('\n');

    if let Some(ref optimization) = response.query_optimization {
        for notice in &optimization.notices {
            out.push_str(&format!("{} {}\n", "Note:".yellow().bold(), notice));
        }
        if let Some(ref original) = optimization.original_query {
            out.push_str(&format!(
                "{} {} {} {}\n",
                "Optimized:".dimmed(),
                original.dimmed(),
                "->".dimmed(),
                response.query.cyan()
            ));
        }
    }

    if response.results.is_empty() {
        out.push_str(&format!("{}\n", "No results".yellow()));
    }

    for (i, result) in response.results.iter().enumerate() {
        out.push('\n');
        out.push_str(&format_card(result, i + 1, width));
    }

    if !response.failed_databases.is_empty() {
        out.push('\n');
        for failure in &response.failed_databases {
            let label = if failure.is_timeout { "timed out" } else { "failed" };
            out.push_str(&format!(
                "{} {} {}: {}\n",
                "!".yellow().bold(),
                failure.database.yellow(),
                label.yellow(),
                failure.error.dimmed()
            ));
        }
    }

    if let Some(ref suggestions) = response.suggestions {
        let texts: Vec<String> = suggestions.iter().map(|s| s.text.cyan().to_string()).collect();
        out.push('\n');
        out.push_str(&format!("{} {}\n", "Did you mean:".bold(), texts.join(", ")));
    }

    if let Some(ref trends) = response.trends {
        out.push('\n');
        out.push_str(&format_trends(trends, width));
    }

    out.push('\n');
    out.push_str(&format!(
        "{}",
        format!(
            "{} of {} results in {} ms",
            response.results.len(),
            response.total_count,
            response.execution_time_ms
        )
        .dimmed()
    ));
    out
}

fn format_card(result: &SearchResult, index: usize, width: usize) -> String {
    let mut out = String::new();
    let content_width = width.saturating_sub(CARD_INDENT.len() + 2).max(20);

    let title = result
        .data
        .as_object()
        .and_then(|obj| {
            TITLE_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| result.id.clone());

    out.push_str(&format!(
        "{}{}\n",
        format!(" {:>3}. ", index).cyan().bold(),
        truncate_text(&title, content_width).bold()
    ));

    if let Some(ref snippet) = result.snippet {
        out.push_str(&format!(
            "{}{}\n",
            CARD_INDENT,
            truncate_text(snippet, content_width * 2).dimmed()
        ));
    }

    let location = match result.table {
        Some(ref table) => format!("{}.{}", result.database, table),
        None => result.database.clone(),
    };
    let mut meta = format!("{} · score {:.3}", location, result.relevance_score);
    if !result.matched_columns.is_empty() {
        meta.push_str(&format!(" · matched {}", result.matched_columns.join(", ")));
    }
    out.push_str(&format!("{}{}\n", CARD_INDENT, meta.dimmed()));
    out
}

fn format_section_header(label: &str, count: usize, width: usize) -> String {
    let header_text = format!("{} ({} results)", label, count);
    let line_len = (width.saturating_sub(header_text.chars().count() + 4)).min(60);
    let line = "─".repeat(line_len);

    format!(
        "{} {} {}",
        "──".cyan(),
        header_text.green().bold(),
        line.cyan()
    )
}

fn format_trends(trends: &SearchTrends, width: usize) -> String {
    let mut table = new_table(width);
    table.set_header(vec!["Trend", "Value"]);
    table.add_row(vec!["Searches".to_string(), trends.total_searches.to_string()]);
    table.add_row(vec![
        "Cache hit rate".to_string(),
        format!("{:.0}%", trends.cache_hit_rate * 100.0),
    ]);
    table.add_row(vec![
        "Avg execution".to_string(),
        format!("{:.1} ms", trends.average_execution_ms),
    ]);
    for (mode, count) in &trends.searches_by_mode {
        table.add_row(vec![format!("Mode: {}", mode), count.to_string()]);
    }
    for top in &trends.top_queries {
        table.add_row(vec![format!("Top: {}", top.query), top.count.to_string()]);
    }
    format!("{}\n", table)
}

pub fn format_suggestions(partial: &str, suggestions: &[Suggestion]) -> String {
    if suggestions.is_empty() {
        return format!("{} for '{}'", "No suggestions".yellow(), partial);
    }

    let mut table = new_table(terminal_width());
    table.set_header(vec!["Suggestion", "Type", "Score"]);
    for s in suggestions {
        let kind = match s.kind {
            SuggestionType::Popular => "popular",
            SuggestionType::Semantic => "semantic",
            SuggestionType::Recent => "recent",
        };
        table.add_row(vec![s.text.clone(), kind.to_string(), format!("{:.2}", s.score)]);
    }
    format!("{}\n\n{}", format!("Suggestions for '{}'", partial).bold().cyan(), table)
}

pub fn format_performance(samples: &[PerformanceSample]) -> String {
    if samples.is_empty() {
        return format!("{}", "No performance data available".yellow());
    }

    let mut table = new_table(terminal_width());
    table.set_header(vec!["Metric", "Value"]);
    for sample in samples {
        let value = if sample.value.fract() == 0.0 {
            format!("{}", sample.value as i64)
        } else {
            format!("{:.3}", sample.value)
        };
        table.add_row(vec![sample.metric.clone(), value]);
    }
    format!("{}\n\n{}", "Database Performance".bold().cyan(), table)
}

pub fn format_databases(databases: &[DatabaseConfig]) -> String {
    if databases.is_empty() {
        return format!("{}", "No databases configured".yellow());
    }

    let width = terminal_width();
    let mut table = new_table(width);
    table.set_header(vec!["Id", "URL", "Tables", "Description"]);
    for db in databases {
        let tables = if db.tables.is_empty() {
            "(all fts5)".to_string()
        } else {
            db.tables.join(", ")
        };
        table.add_row(vec![
            db.id.clone(),
            truncate_text(&db.url, 40),
            tables,
            db.description.clone().unwrap_or_default(),
        ]);
    }
    format!("{}\n\n{}", "Configured Databases".bold().cyan(), table)
}

fn new_table(width: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(u16::try_from(width).unwrap_or(u16::MAX));
    table
}
