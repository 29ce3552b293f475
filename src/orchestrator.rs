use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};
use url::Url;

use crate::config::Config;
use crate::diagnostics::classify_failure;
use crate::error::{ErrorKind, ExtractionError};
use crate::extractor::{
    ExtractorCommand, ExtractorCommandBuilder, ProcessOutcome, ProcessRunner, ProcessRunnerFactory,
};
use crate::platform::{classify, Platform};
use crate::store::{allocate_filename, ArtifactStore};

/// One inbound extraction request.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub url: String,
    pub received_at: DateTime<Utc>,
    /// Scheme and authority download links are built on, e.g. `http://host:3000`
    pub public_base_url: String,
}

impl ExtractionRequest {
    pub fn new<S1: Into<String>, S2: Into<String>>(url: S1, public_base_url: S2) -> Self {
        Self {
            url: url.into(),
            received_at: Utc::now(),
            public_base_url: public_base_url.into(),
        }
    }
}

/// Everything needed to run one extraction; lives for a single request.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub platform: Platform,
    pub url: String,
    pub deadline: Duration,
    pub filename: String,
    pub output_path: PathBuf,
    pub command: ExtractorCommand,
}

/// Successful extraction as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    /// Public download link
    pub url: String,
    pub platform: Platform,
    pub filename: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// Drives a request through classification, command building, execution and
/// artifact verification.
pub struct Orchestrator {
    config: Arc<Config>,
    builder: ExtractorCommandBuilder,
    runner: Box<dyn ProcessRunner>,
    store: Arc<ArtifactStore>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>) -> Self {
        let runner = ProcessRunnerFactory::create_runner(&config.extractor);
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: Arc<Config>, runner: Box<dyn ProcessRunner>) -> Self {
        let builder = ExtractorCommandBuilder::new(Arc::clone(&config));
        let store = Arc::new(ArtifactStore::new(config.storage.downloads_dir.clone()));

        Self {
            config,
            builder,
            runner,
            store,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The store extractions write into.
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Run one extraction end to end. Never retries.
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, ExtractionError> {
        let url = validate_url(&request.url)?;
        let job = self.prepare(url);

        info!(
            platform = %job.platform,
            deadline_ms = job.deadline.as_millis() as u64,
            filename = %job.filename,
            "Processing URL: {}",
            job.url
        );

        let outcome = self.runner.run(&job.command, job.deadline).await;

        match outcome {
            ProcessOutcome::Success { .. } => {
                let result = self.verify_artifact(&job, &request.public_base_url).await?;
                let elapsed = Utc::now() - request.received_at;
                info!(
                    platform = %job.platform,
                    size = result.size_bytes,
                    elapsed_ms = elapsed.num_milliseconds(),
                    "Video downloaded: {}",
                    result.filename
                );
                Ok(result)
            }
            ProcessOutcome::Failed { message } => {
                let kind = classify_failure(&message);
                error!(platform = %job.platform, kind = %kind, "Extraction failed");
                Err(ExtractionError::new(kind, message, Some(job.platform)))
            }
            ProcessOutcome::TimedOut => {
                warn!(platform = %job.platform, "Extraction timed out after {:?}", job.deadline);
                Err(ExtractionError::new(
                    ErrorKind::Timeout,
                    "Processing timeout exceeded",
                    Some(job.platform),
                ))
            }
        }
    }

    /// Classify, pick the deadline, allocate the output file and build the command.
    pub fn prepare(&self, url: &str) -> ExtractionJob {
        let platform = classify(url);
        let deadline = self.config.extractor.deadline_for(platform);
        let filename = allocate_filename();
        let output_path = self.store.path_for(&filename);
        let command = self.builder.build(platform, url, &output_path);

        ExtractionJob {
            platform,
            url: url.to_string(),
            deadline,
            filename,
            output_path,
            command,
        }
    }

    /// The extractor's exit code is not trusted: the file must exist and be non-empty.
    async fn verify_artifact(
        &self,
        job: &ExtractionJob,
        public_base_url: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        let metadata = fs::metadata(&job.output_path).await.map_err(|e| {
            ExtractionError::new(
                ErrorKind::ArtifactMissing,
                format!("Downloaded file not found: {}", e),
                Some(job.platform),
            )
        })?;

        if !metadata.is_file() || metadata.len() == 0 {
            return Err(ExtractionError::new(
                ErrorKind::ArtifactMissing,
                "Downloaded file is empty",
                Some(job.platform),
            ));
        }

        Ok(ExtractionResult {
            success: true,
            url: download_url(public_base_url, &job.filename),
            platform: job.platform,
            filename: job.filename.clone(),
            size_bytes: metadata.len(),
        })
    }
}

/// Accept any well-formed absolute URL; returns the trimmed input. Whether
/// the scheme or site is supported is the extractor's call.
pub fn validate_url(raw: &str) -> Result<&str, ExtractionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::invalid_input("URL is required"));
    }

    Url::parse(trimmed)
        .map_err(|e| ExtractionError::invalid_input(format!("Invalid URL '{}': {}", trimmed, e)))?;
    Ok(trimmed)
}

pub fn download_url(public_base_url: &str, filename: &str) -> String {
    format!("{}/downloads/{}", public_base_url.trim_end_matches('/'), filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::MockProcessRunner;
    use tempfile::TempDir;

    const BASE: &str = "http://localhost:3000";

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.downloads_dir = dir.path().to_path_buf();
        config
    }

    fn writes(bytes: &'static [u8]) -> impl Fn(&ExtractorCommand, Duration) -> ProcessOutcome {
        move |cmd, _| {
            if let Some(path) = cmd.output_path() {
                std::fs::write(path, bytes).unwrap();
            }
            ProcessOutcome::Success { stdout: String::new() }
        }
    }

    #[tokio::test]
    async fn test_success_returns_artifact() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(1).returning(writes(b"0123456789"));

        let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(runner));
        let result = orchestrator
            .extract(&ExtractionRequest::new("https://www.tiktok.com/@u/video/123", BASE))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.platform, Platform::TikTok);
        assert_eq!(result.size_bytes, 10);
        assert_eq!(result.url, format!("{}/downloads/{}", BASE, result.filename));
        assert!(dir.path().join(&result.filename).is_file());
    }

    #[tokio::test]
    async fn test_invalid_url_never_runs_process() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(0);

        let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(runner));
        for bad in ["not-a-url", "", "   ", "/relative/path", "www.tiktok.com/@u/video/1"] {
            let err = orchestrator.extract(&ExtractionRequest::new(bad, BASE)).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidInput, "{:?}", bad);
            assert_eq!(err.http_status(), 400);
        }
    }

    #[tokio::test]
    async fn test_any_absolute_url_reaches_extractor() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|cmd, _| cmd.args.last().map(String::as_str) == Some("ftp://example.com/v.mp4"))
            .times(1)
            .returning(|_, _| ProcessOutcome::Failed {
                message: "ERROR: Unsupported URL: ftp://example.com/v.mp4".to_string(),
            });

        let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(runner));
        let err = orchestrator
            .extract(&ExtractionRequest::new(" ftp://example.com/v.mp4 ", BASE))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedPlatform);
        assert_eq!(err.platform, Some(Platform::Unknown));
    }

    #[tokio::test]
    async fn test_clean_exit_without_file_is_artifact_missing() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, _| ProcessOutcome::Success { stdout: String::new() });

        let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(runner));
        let err = orchestrator
            .extract(&ExtractionRequest::new("https://youtu.be/abc", BASE))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ArtifactMissing);
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.platform, Some(Platform::YouTube));
    }

    #[tokio::test]
    async fn test_empty_file_is_artifact_missing() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(writes(b""));

        let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(runner));
        let err = orchestrator
            .extract(&ExtractionRequest::new("https://example.com/v", BASE))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ArtifactMissing);
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let cases = [
            ("ERROR: Unsupported URL: https://example.com", ErrorKind::UnsupportedPlatform),
            ("ERROR: No downloadable video found", ErrorKind::NotFound),
            ("ERROR: HTTP Error 403: Forbidden", ErrorKind::ExtractionFailed),
        ];

        for (message, expected) in cases {
            let dir = TempDir::new().unwrap();
            let mut runner = MockProcessRunner::new();
            runner.expect_run().returning(move |_, _| ProcessOutcome::Failed {
                message: message.to_string(),
            });

            let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(runner));
            let err = orchestrator
                .extract(&ExtractionRequest::new("https://www.instagram.com/reel/1", BASE))
                .await
                .unwrap_err();
            assert_eq!(err.kind, expected);
            assert_eq!(err.message, message);
            assert_eq!(err.platform, Some(Platform::Instagram));
        }
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_, _| ProcessOutcome::TimedOut);

        let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(runner));
        let err = orchestrator
            .extract(&ExtractionRequest::new("https://www.tiktok.com/@u/video/1", BASE))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.http_status(), 504);
    }

    #[tokio::test]
    async fn test_deadline_follows_platform_table() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|_, deadline| *deadline == Duration::from_secs(45))
            .times(1)
            .returning(|_, _| ProcessOutcome::TimedOut);

        let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(runner));
        let _ = orchestrator
            .extract(&ExtractionRequest::new("https://www.youtube.com/watch?v=x", BASE))
            .await;
    }

    #[tokio::test]
    async fn test_deadline_override() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.extractor.timeout_override_ms = Some(1500);

        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|_, deadline| *deadline == Duration::from_millis(1500))
            .times(1)
            .returning(|_, _| ProcessOutcome::TimedOut);

        let orchestrator = Orchestrator::with_runner(Arc::new(config), Box::new(runner));
        let _ = orchestrator
            .extract(&ExtractionRequest::new("https://www.youtube.com/watch?v=x", BASE))
            .await;
    }

    #[test]
    fn test_prepare_targets_store_directory() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::with_runner(Arc::new(config_in(&dir)), Box::new(MockProcessRunner::new()));

        let job = orchestrator.prepare("https://www.tiktok.com/@u/video/1");
        assert_eq!(job.platform, Platform::TikTok);
        assert_eq!(job.deadline, Duration::from_secs(30));
        assert_eq!(job.output_path, dir.path().join(&job.filename));
        assert_eq!(job.command.output_path(), Some(job.output_path.as_path()));

        let other = orchestrator.prepare("https://www.tiktok.com/@u/video/1");
        assert_ne!(job.filename, other.filename);
    }

    #[test]
    fn test_download_url_joins_cleanly() {
        assert_eq!(
            download_url("http://h:3000/", "video_1_a.mp4"),
            "http://h:3000/downloads/video_1_a.mp4"
        );
    }
}
