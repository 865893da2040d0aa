use super::commands;
use super::logging::setup_logging;
use clap::{Args, Parser, Subcommand};
use posegnn_embed::Pooling;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all logging
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write pooled per-layer embeddings of every input structure to CSV
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Model configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Model weights (safetensors); a seeded random model is used when absent
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// JSON array of structure records
    #[arg(short, long)]
    pub input: PathBuf,

    #[arg(short, long)]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "test")]
    pub split: String,

    #[arg(long, default_value = "posegnn")]
    pub prefix: String,

    #[arg(long, value_enum, default_value_t = Pooling::Cls)]
    pub pooling: Pooling,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Run on the CPU even when a GPU is available
    #[arg(long)]
    pub cpu: bool,
}

impl Cli {
    pub fn execute(self) -> anyhow::Result<()> {
        setup_logging(self.verbose, self.quiet)?;
        match self.command {
            Commands::Extract(args) => commands::extract::execute(args),
        }
    }
}
