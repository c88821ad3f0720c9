use crate::cli::{Cli, OutputFormat};
use crate::commands::{load_orchestrator, spinner, CommandError, Result};
use crate::output::{format_output, OutputData};
use fedsql_core::federated::{SearchMode, SearchOptions};

/// Arguments of `fedsql search`, borrowed from the parsed command line.
pub struct SearchArgs<'a> {
    pub query: &'a str,
    pub databases: &'a [String],
    pub tables: &'a [String],
    pub columns: &'a [String],
    pub mode: Option<&'a str>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub analytics: bool,
    pub user: Option<&'a str>,
}

pub async fn run(cli: &Cli, args: SearchArgs<'_>) -> Result<()> {
    if let Some(mode) = args.mode {
        parse_mode(mode)?;
    }

    let orchestrator = load_orchestrator(cli).await?;
    let databases: Vec<String> = if args.databases.is_empty() {
        orchestrator.databases().into_iter().map(|db| db.id).collect()
    } else {
        args.databases.to_vec()
    };

    let options = build_options(databases, &args);

    let progress = if matches!(cli.output, OutputFormat::Pretty) {
        Some(spinner(format!(
            "Searching {} database(s) for '{}'...",
            options.databases.len(),
            args.query
        )))
    } else {
        None
    };

    let result = orchestrator.perform_search(args.query, &options).await;

    if let Some(p) = progress {
        p.finish_and_clear();
    }

    let response = result?;
    tracing::debug!(
        results = response.results.len(),
        total = response.total_count,
        elapsed_ms = response.execution_time_ms,
        "search complete"
    );
    format_output(&OutputData::SearchResults(response), &cli.output)
}

fn parse_mode(mode: &str) -> Result<SearchMode> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "natural" => Ok(SearchMode::Natural),
        "boolean" => Ok(SearchMode::Boolean),
        "semantic" => Ok(SearchMode::Semantic),
        other => Err(CommandError::InvalidInput(format!(
            "Unknown search mode '{}'. Use natural, boolean or semantic.",
            other
        ))),
    }
}

fn build_options(databases: Vec<String>, args: &SearchArgs<'_>) -> SearchOptions {
    let mut options = SearchOptions::new(databases).with_analytics(args.analytics);
    if !args.tables.is_empty() {
        options = options.with_tables(args.tables.to_vec());
    }
    if !args.columns.is_empty() {
        options = options.with_columns(args.columns.to_vec());
    }
    if let Some(mode) = args.mode {
        options = options.with_mode(mode);
    }
    if let Some(limit) = args.limit {
        options = options.with_limit(limit);
    }
    if let Some(offset) = args.offset {
        options = options.with_offset(offset);
    }
    if let Some(user) = args.user {
        options = options.with_user(user);
    }
    options
}
