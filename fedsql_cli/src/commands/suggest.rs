use crate::cli::Cli;
use crate::commands::{load_orchestrator, CommandError, Result};
use crate::output::{format_output, OutputData};

pub async fn run(cli: &Cli, partial: &str, user: Option<&str>) -> Result<()> {
    if partial.trim().is_empty() {
        return Err(CommandError::InvalidInput(
            "Provide at least one character to complete".to_string(),
        ));
    }

    let orchestrator = load_orchestrator(cli).await?;
    let suggestions = orchestrator.get_suggestions(partial, user).await;

    let data = OutputData::Suggestions {
        partial: partial.to_string(),
        suggestions,
    };
    format_output(&data, &cli.output)
}
