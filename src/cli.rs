use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve,

    /// Download a single URL and print the result as JSON
    Extract {
        /// Video page URL
        #[arg(short, long)]
        url: String,

        /// Base for the printed download link
        #[arg(long, default_value = "http://localhost:3000")]
        base_url: String,
    },

    /// Remove downloads older than the retention window once
    Reclaim {
        /// Override the configured retention window
        #[arg(long)]
        retention_hours: Option<u64>,
    },

    /// List files in the downloads directory
    List,
}
