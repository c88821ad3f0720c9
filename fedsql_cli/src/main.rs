use clap::Parser;
use owo_colors::OwoColorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose > 0 {
        "fedsql=debug"
    } else {
        "fedsql=warn,fedsql_cli=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Search {
            query,
            databases,
            tables,
            columns,
            mode,
            limit,
            offset,
            analytics,
            user,
        } => {
            let args = search::SearchArgs {
                query,
                databases,
                tables,
                columns,
                mode: mode.as_deref(),
                limit: *limit,
                offset: *offset,
                analytics: *analytics,
                user: user.as_deref(),
            };
            search::run(&cli, args).await
        }
        Commands::Suggest { partial, user } => suggest::run(&cli, partial, user.as_deref()).await,
        Commands::Perf => perf::run(&cli).await,
        Commands::Databases => databases::run(&cli).await,
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }
}
