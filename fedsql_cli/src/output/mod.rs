use crate::cli::OutputFormat;
use crate::commands::Result;
use fedsql_core::config::DatabaseConfig;
use fedsql_core::federated::{PerformanceSample, SearchResponse, Suggestion};
use serde::{Deserialize, Serialize};

mod pretty;
pub use pretty::{format_databases, format_performance, format_search, format_suggestions};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutputData {
    SearchResults(SearchResponse),
    Suggestions {
        partial: String,
        suggestions: Vec<Suggestion>,
    },
    Performance(Vec<PerformanceSample>),
    Databases(Vec<DatabaseConfig>),
}

pub fn format_output(data: &OutputData, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(data)?);
        }
        OutputFormat::Text => {
            print!("{}", format_text(data));
        }
        OutputFormat::Pretty => {
            let rendered = match data {
                OutputData::SearchResults(response) => format_search(response),
                OutputData::Suggestions {
                    partial,
                    suggestions,
                } => format_suggestions(partial, suggestions),
                OutputData::Performance(samples) => format_performance(samples),
                OutputData::Databases(databases) => format_databases(databases),
            };
            println!("{}", rendered);
        }
    }
    Ok(())
}

/// Tab-separated lines, one record per line.
pub fn format_text(data: &OutputData) -> String {
    let mut out = String::new();
    match data {
        OutputData::SearchResults(response) => {
            for result in &response.results {
                out.push_str(&format!(
                    "{}\t{:.4}\t{}\n",
                    result.id,
                    result.relevance_score,
                    result.snippet.as_deref().unwrap_or("")
                ));
            }
            for failure in &response.failed_databases {
                out.push_str(&format!("failed\t{}\t{}\n", failure.database, failure.error));
            }
        }
        OutputData::Suggestions { suggestions, .. } => {
            for s in suggestions {
                let kind = serde_json::to_value(s.kind)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                out.push_str(&format!("{}\t{}\t{:.2}\n", s.text, kind, s.score));
            }
        }
        OutputData::Performance(samples) => {
            for sample in samples {
                out.push_str(&format!("{}\t{}\n", sample.metric, sample.value));
            }
        }
        OutputData::Databases(databases) => {
            for db in databases {
                out.push_str(&format!("{}\t{}\n", db.id, db.url));
            }
        }
    }
    out
}
