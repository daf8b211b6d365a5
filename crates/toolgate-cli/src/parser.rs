use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the toolgate control plane.
#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Supervise tool providers and gate the tool calls made against them")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Data directory holding the database
    #[arg(long, global = true, env = "TOOLGATE_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
