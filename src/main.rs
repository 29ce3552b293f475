//! Reelgrab - video extraction service
//!
//! Entry point: parses the command line, loads configuration, sets up logging
//! and dispatches to the HTTP service or one of the maintenance commands.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelgrab::cli::{Args, Commands};
use reelgrab::config::{hours_window, Config};
use reelgrab::orchestrator::{ExtractionRequest, Orchestrator};
use reelgrab::server;
use reelgrab::server::response::ErrorResponse;
use reelgrab::store::ArtifactStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (file, then environment overrides)
    let config = Config::load(args.config.as_deref())?;

    // Setup logging to both console and file
    let _guard = setup_logging(&config.server.log_dir, args.verbose)?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!("Starting Reelgrab extraction service");
            server::run(config).await?;
        }
        Commands::Extract { url, base_url } => {
            let orchestrator = Orchestrator::new(Arc::new(config));
            orchestrator.store().ensure_dir().await?;
            match orchestrator.extract(&ExtractionRequest::new(url, base_url)).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => {
                    println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&e))?);
                    return Err(e.into());
                }
            }
        }
        Commands::Reclaim { retention_hours } => {
            let retention = match retention_hours {
                Some(hours) => hours_window(hours)?,
                None => config.storage.retention(),
            };

            let store = ArtifactStore::new(config.storage.downloads_dir.clone());
            let removed = store.reclaim(retention).await?;
            println!(
                "Removed {} file(s) older than {} from {}",
                removed,
                format_duration(retention.as_secs()),
                store.dir().display()
            );
        }
        Commands::List => {
            let store = ArtifactStore::new(config.storage.downloads_dir.clone());
            let artifacts = store.list().await?;

            if artifacts.is_empty() {
                println!("No downloads found in {}", store.dir().display());
            } else {
                println!("{:<40} {:>12} {:<15}", "Filename", "Size (KB)", "Age");
                println!("{}", "-".repeat(70));

                let now = SystemTime::now();
                for artifact in artifacts {
                    let age = now
                        .duration_since(SystemTime::from(artifact.created_at))
                        .unwrap_or_default()
                        .as_secs();
                    println!(
                        "{:<40} {:>12.1} {:<15}",
                        artifact.filename,
                        artifact.size_bytes as f64 / 1024.0,
                        format_duration(age)
                    );
                }
            }
        }
    }

    Ok(())
}

/// Setup logging to both console and a daily-rotated file
fn setup_logging(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, "reelgrab.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("reelgrab.log").display()
    );

    Ok(guard)
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
