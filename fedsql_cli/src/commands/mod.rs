pub mod databases;
pub mod perf;
pub mod search;
pub mod suggest;

use crate::cli::Cli;
use fedsql_core::analytics::FileAnalytics;
use fedsql_core::config::{ConfigStore, EngineConfig};
use fedsql_core::error::{ConfigError, SearchError};
use fedsql_core::SearchOrchestrator;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No databases configured. Add a `databases:` section to {0}")]
    NoDatabases(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Search(#[from] SearchError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

pub fn config_store(cli: &Cli) -> ConfigStore {
    match cli.config {
        Some(ref path) => ConfigStore::new(path.clone()),
        None => ConfigStore::new_default(),
    }
}

/// Load the config, falling back to a persistent analytics log so that
/// suggestions and trends survive between invocations.
pub fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = config_store(cli).load()?;
    config.validate()?;
    if config.analytics.path.is_none() {
        config.analytics.path = Some(FileAnalytics::default_path());
    }
    Ok(config)
}

pub async fn load_orchestrator(cli: &Cli) -> Result<SearchOrchestrator> {
    let config = load_config(cli)?;
    if config.databases.is_empty() {
        return Err(CommandError::NoDatabases(
            config_store(cli).path().display().to_string(),
        ));
    }
    Ok(fedsql_core::build_orchestrator(config).await?)
}

pub fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

/// Get the terminal width, defaulting to 80 if detection fails
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

/// Truncate text to fit within a given width, adding "..." if truncated
pub fn truncate_text(text: &str, max_width: usize) -> String {
    if text.chars().count() <= max_width {
        text.to_string()
    } else if max_width > 3 {
        let head: String = text.chars().take(max_width - 3).collect();
        format!("{}...", head)
    } else {
        text.chars().take(max_width).collect()
    }
}
