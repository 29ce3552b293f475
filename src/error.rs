use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::platform::Platform;

/// Longest process excerpt ever returned to a client.
pub const MAX_ERROR_DETAIL_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum ReelgrabError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Artifact store error: {0}")]
    Store(String),

    #[error("Invalid artifact name: {0}")]
    InvalidArtifactName(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, ReelgrabError>;

/// Stable classification of a failed extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// URL missing or not an absolute URL
    InvalidInput,
    /// Extractor does not recognise the site
    UnsupportedPlatform,
    /// Extractor found no downloadable media
    NotFound,
    /// Deadline elapsed before the extractor finished
    Timeout,
    /// Extractor exited cleanly but left no usable file
    ArtifactMissing,
    /// Anything else
    ExtractionFailed,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput | Self::UnsupportedPlatform => 400,
            Self::NotFound => 404,
            Self::Timeout => 504,
            Self::ArtifactMissing | Self::ExtractionFailed => 500,
        }
    }

    /// Machine-readable code included in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::UnsupportedPlatform => "UNSUPPORTED_PLATFORM",
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::ArtifactMissing => "ARTIFACT_MISSING",
            Self::ExtractionFailed => "EXTRACTION_FAILED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A request-scoped extraction failure, already mapped onto [`ErrorKind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    pub kind: ErrorKind,
    /// Internal detail (captured process output, I/O error text, ...)
    pub message: String,
    pub platform: Option<Platform>,
}

impl ExtractionError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S, platform: Option<Platform>) -> Self {
        Self {
            kind,
            message: message.into(),
            platform,
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::InvalidInput, message, None)
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    /// Message shown to API clients.
    pub fn client_message(&self) -> String {
        match self.kind {
            ErrorKind::InvalidInput => "Valid URL is required".to_string(),
            ErrorKind::UnsupportedPlatform => "Unsupported video platform".to_string(),
            ErrorKind::NotFound => "No video found at this URL".to_string(),
            ErrorKind::Timeout => {
                let name = self.platform.unwrap_or(Platform::Unknown).display_name();
                format!("{} processing timeout. Please try again.", name)
            }
            ErrorKind::ArtifactMissing => {
                "Video downloaded but file could not be accessed".to_string()
            }
            ErrorKind::ExtractionFailed => "Video extraction failed".to_string(),
        }
    }

    /// Internal detail cut down to what may leave the service.
    pub fn public_detail(&self) -> String {
        truncate_chars(&self.message, MAX_ERROR_DETAIL_CHARS)
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
