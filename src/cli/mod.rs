//! Command-line interface for prompt-cache.

mod config;
mod stress;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "prompt-cache", version, about = "In-memory LLM response cache")]
pub(crate) struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Print the effective cache configuration (file + environment).
    Config,
    /// Hammer a cache with concurrent randomized lookups and stores.
    Stress(StressArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct StressArgs {
    /// Worker threads issuing operations.
    #[arg(long, default_value_t = 8)]
    pub threads: usize,
    /// How long each worker runs, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub duration_ms: u64,
    /// Distinct prompts drawn from.
    #[arg(long, default_value_t = 256)]
    pub keys: usize,
    /// Override `max_entries` from config.
    #[arg(long)]
    pub max_entries: Option<usize>,
    /// Override `ttl_secs` from config.
    #[arg(long)]
    pub ttl_secs: Option<u64>,
}

/// Dispatch a parsed command line.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Config => config::cmd_config(),
        Commands::Stress(args) => stress::cmd_stress(args).await,
    }
}
