use crate::cli::{Cli, OutputFormat};
use crate::commands::{load_orchestrator, spinner, Result};
use crate::output::{format_output, OutputData};

pub async fn run(cli: &Cli) -> Result<()> {
    let orchestrator = load_orchestrator(cli).await?;

    let progress = matches!(cli.output, OutputFormat::Pretty)
        .then(|| spinner("Collecting database statistics...".to_string()));
    let result = orchestrator.analyze_performance().await;
    if let Some(p) = progress {
        p.finish_and_clear();
    }

    format_output(&OutputData::Performance(result?), &cli.output)
}
