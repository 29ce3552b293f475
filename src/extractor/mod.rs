// External extractor plumbing
//
// - commands: argument-list invocation descriptors and the per-platform builder
// - runner: deadline-bounded execution of one descriptor

pub mod commands;
pub mod runner;

use async_trait::async_trait;
use std::time::Duration;

pub use commands::*;
pub use runner::*;

use crate::config::ExtractorConfig;

/// Result of running one extractor process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exited zero before the deadline
    Success { stdout: String },
    /// Exited non-zero or could not be started
    Failed { message: String },
    /// Killed after the deadline elapsed
    TimedOut,
}

/// Executes an extractor command to completion or forced termination.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` once. Implementations never retry.
    async fn run(&self, command: &ExtractorCommand, deadline: Duration) -> ProcessOutcome;
}

/// Factory for creating process runner instances
pub struct ProcessRunnerFactory;

impl ProcessRunnerFactory {
    /// Create the default runner backed by `tokio::process`
    pub fn create_runner(config: &ExtractorConfig) -> Box<dyn ProcessRunner> {
        Box::new(TokioProcessRunner::new(config.max_capture_bytes))
    }
}
