use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, ReelgrabError};
use crate::platform::Platform;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "reelgrab.toml";

/// Upper bound for retention and reclaim windows (ten years).
pub const MAX_WINDOW_HOURS: u64 = 24 * 365 * 10;

/// Slack the HTTP request timeout must leave above the longest extraction deadline.
pub const REQUEST_TIMEOUT_HEADROOM: Duration = Duration::from_secs(5);

const SECS_PER_HOUR: u64 = 60 * 60;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Listening port
    pub port: u16,
    /// Base used for download links; derived from the Host header when unset
    pub public_base_url: Option<String>,
    /// Upper bound on a single HTTP request, extraction included
    pub request_timeout_secs: u64,
    /// Directory receiving the rolling log file
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding produced videos, served under /downloads
    pub downloads_dir: PathBuf,
    /// Files older than this are reclaimed
    pub retention_hours: u64,
    /// Pause between reclaim passes
    pub reclaim_interval_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Path to the extractor binary (yt-dlp)
    pub binary_path: String,
    /// Arguments placed before the generated ones, e.g. ["-m", "yt_dlp"]
    pub binary_args: Vec<String>,
    /// Replaces every per-platform deadline when set
    pub timeout_override_ms: Option<u64>,
    /// Netscape cookie file handed to YouTube downloads
    pub cookies_path: String,
    /// Desktop browser User-Agent (YouTube, and TikTok unless overridden)
    pub desktop_user_agent: String,
    /// TikTok-specific User-Agent
    pub tiktok_user_agent: Option<String>,
    /// Mobile browser User-Agent (Instagram)
    pub mobile_user_agent: String,
    /// Bytes of stdout/stderr retained per stream
    pub max_capture_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_base_url: None,
            request_timeout_secs: 60,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("downloads"),
            retention_hours: 24,
            reclaim_interval_hours: 6,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary_path: "yt-dlp".to_string(),
            binary_args: Vec::new(),
            timeout_override_ms: None,
            cookies_path: "./cookies.txt".to_string(),
            desktop_user_agent: DESKTOP_USER_AGENT.to_string(),
            tiktok_user_agent: None,
            mobile_user_agent: MOBILE_USER_AGENT.to_string(),
            max_capture_bytes: 64 * 1024,
        }
    }
}

/// Convert an hour count into a window, rejecting anything past [`MAX_WINDOW_HOURS`].
pub fn hours_window(hours: u64) -> Result<Duration> {
    if hours > MAX_WINDOW_HOURS {
        return Err(ReelgrabError::Config(format!(
            "{} hours exceeds the maximum of {}",
            hours, MAX_WINDOW_HOURS
        )));
    }
    Ok(Duration::from_secs(hours * SECS_PER_HOUR))
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl StorageConfig {
    /// Clamped to [`MAX_WINDOW_HOURS`]; `validate` rejects larger values.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.min(MAX_WINDOW_HOURS) * SECS_PER_HOUR)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_hours.min(MAX_WINDOW_HOURS) * SECS_PER_HOUR)
    }
}

impl ExtractorConfig {
    /// Deadline for one extraction on `platform`.
    pub fn deadline_for(&self, platform: Platform) -> Duration {
        match self.timeout_override_ms {
            Some(ms) => Duration::from_millis(ms),
            None => platform.default_timeout(),
        }
    }

    /// Longest deadline any platform can get under this configuration.
    pub fn longest_deadline(&self) -> Duration {
        Platform::ALL
            .iter()
            .map(|platform| self.deadline_for(*platform))
            .max()
            .unwrap_or_default()
    }

    pub fn tiktok_user_agent(&self) -> &str {
        self.tiktok_user_agent
            .as_deref()
            .unwrap_or(&self.desktop_user_agent)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReelgrabError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;

        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Resolve the configuration the binary runs with: explicit file, then
    /// `reelgrab.toml` in the working directory, then defaults; environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_var(&lookup, "PORT")? {
            self.server.port = port;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(base) = lookup("PUBLIC_BASE_URL") {
            self.server.public_base_url = Some(base);
        }
        if let Some(secs) = parse_var(&lookup, "REQUEST_TIMEOUT_SECS")? {
            self.server.request_timeout_secs = secs;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.server.log_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DOWNLOADS_DIR") {
            self.storage.downloads_dir = PathBuf::from(dir);
        }
        if let Some(hours) = parse_var(&lookup, "RETENTION_HOURS")? {
            self.storage.retention_hours = hours;
        }
        if let Some(hours) = parse_var(&lookup, "RECLAIM_INTERVAL_HOURS")? {
            self.storage.reclaim_interval_hours = hours;
        }
        if let Some(path) = lookup("YTDLP_PATH") {
            self.extractor.binary_path = path;
        }
        if let Some(ms) = parse_var(&lookup, "YTDLP_TIMEOUT")? {
            self.extractor.timeout_override_ms = Some(ms);
        }
        if let Some(path) = lookup("COOKIES_PATH") {
            self.extractor.cookies_path = path;
        }
        if let Some(agent) = lookup("TIKTOK_USER_AGENT") {
            self.extractor.tiktok_user_agent = Some(agent);
        }
        if let Some(agent) = lookup("DESKTOP_USER_AGENT") {
            self.extractor.desktop_user_agent = agent;
        }
        if let Some(agent) = lookup("MOBILE_USER_AGENT") {
            self.extractor.mobile_user_agent = agent;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ReelgrabError::Config("server.port must be non-zero".to_string()));
        }
        if self.storage.retention_hours == 0 {
            return Err(ReelgrabError::Config(
                "storage.retention_hours must be at least 1".to_string(),
            ));
        }
        if self.storage.reclaim_interval_hours == 0 {
            return Err(ReelgrabError::Config(
                "storage.reclaim_interval_hours must be at least 1".to_string(),
            ));
        }
        hours_window(self.storage.retention_hours)
            .map_err(|e| ReelgrabError::Config(format!("storage.retention_hours: {}", e)))?;
        hours_window(self.storage.reclaim_interval_hours)
            .map_err(|e| ReelgrabError::Config(format!("storage.reclaim_interval_hours: {}", e)))?;
        if self.extractor.timeout_override_ms == Some(0) {
            return Err(ReelgrabError::Config(
                "extractor.timeout_override_ms must be positive".to_string(),
            ));
        }
        let longest = self.extractor.longest_deadline();
        if self.server.request_timeout() < longest + REQUEST_TIMEOUT_HEADROOM {
            return Err(ReelgrabError::Config(format!(
                "server.request_timeout_secs ({}s) must exceed the longest extraction deadline ({:?}) by at least {:?}",
                self.server.request_timeout_secs, longest, REQUEST_TIMEOUT_HEADROOM
            )));
        }
        if self.extractor.max_capture_bytes == 0 {
            return Err(ReelgrabError::Config(
                "extractor.max_capture_bytes must be positive".to_string(),
            ));
        }
        if self.extractor.binary_path.trim().is_empty() {
            return Err(ReelgrabError::Config("extractor.binary_path is empty".to_string()));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ReelgrabError::Config(format!("Invalid {} '{}': {}", key, raw, e))),
        None => Ok(None),
    }
}
