use crate::cli::Cli;
use crate::commands::{load_config, Result};
use crate::output::{format_output, OutputData};

/// List configured databases without connecting to any of them.
pub async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    format_output(&OutputData::Databases(config.databases), &cli.output)
}
