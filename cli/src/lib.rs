use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "datasync", version)]
#[command(about = "One-way file sync between storage backends", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set the logging level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy new and updated files from the source to the destination
    Sync(SyncArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Job configuration file (toml, yaml or json)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Source location: a directory, file:///path or s3://bucket/prefix
    #[arg(short, long, value_name = "URI")]
    pub source: Option<String>,

    /// Destination location: a directory, file:///path or s3://bucket/prefix
    #[arg(short, long, value_name = "URI")]
    pub destination: Option<String>,

    /// Only sync files under this path prefix
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Number of concurrent transfers
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Retries for transient transfer errors
    #[arg(long)]
    pub retries: Option<u32>,

    /// Directory for in-flight transfer files
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Print the plan without copying anything
    #[arg(long)]
    pub dry_run: bool,

    /// Write the sync result (or the plan, with --dry-run) as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn cli_match() -> utils::error::Result<()> {
    let cli = Cli::parse();

    // Execute the subcommand
    match &cli.command {
        Commands::Sync(args) => commands::sync_cmd(args, cli.log_level.as_deref()).await?,
    }

    Ok(())
}
