use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fedsql")]
#[command(about = "fedsql - Federated full-text search across databases")]
#[command(version)]
#[command(after_help = "\x1b[1;36mQuick Start:\x1b[0m
  fedsql databases                           List configured databases
  fedsql search \"vacuum tuning\" -d wiki,docs  Search two databases
  fedsql suggest datab                       Complete a partial query
  fedsql perf                                Show database statistics

\x1b[1;36mConfiguration:\x1b[0m
  ~/.config/fedsql/config.yaml (override with --config or FEDSQL_CONFIG)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (YAML, or TOML when the name ends in .toml)
    #[arg(long, global = true, env = "FEDSQL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// Verbose output (-v for debug logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search one or more databases
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  fedsql search \"refund policy\" -d crm
  fedsql search \"rust NOT python\" -d wiki --mode boolean
  fedsql search \"money back\" -d crm,orders --mode semantic --analytics
  fedsql search invoice -d orders --tables invoices --limit 5 --offset 10")]
    Search {
        /// The search query
        query: String,
        /// Comma-separated database ids (defaults to every configured database)
        #[arg(short, long, value_delimiter = ',')]
        databases: Vec<String>,
        /// Comma-separated tables to search
        #[arg(short, long, value_delimiter = ',')]
        tables: Vec<String>,
        /// Comma-separated columns to match
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,
        /// natural, boolean or semantic
        #[arg(short, long)]
        mode: Option<String>,
        /// Page size
        #[arg(short, long)]
        limit: Option<u32>,
        /// Results to skip
        #[arg(long)]
        offset: Option<u32>,
        /// Attach search trends to the response
        #[arg(long)]
        analytics: bool,
        /// User id recorded with the search
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Suggest completions for a partial query
    Suggest {
        /// The partial query
        partial: String,
        /// Include this user's recent searches
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show performance metrics for configured databases
    Perf,

    /// List configured databases
    #[command(alias = "ls")]
    Databases,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Pretty,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Plain text output
    Text,
}
