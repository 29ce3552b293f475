// Failure diagnostics - maps extractor error output onto the error taxonomy
//
// Patterns are literal, case-sensitive substrings checked in order; the first
// hit wins and anything unmatched is a generic extraction failure.

use crate::error::ErrorKind;

/// Ordered classification table for failed extractor runs.
pub const FAILURE_PATTERNS: &[(&str, ErrorKind)] = &[
    ("No downloadable", ErrorKind::NotFound),
    ("Unsupported URL", ErrorKind::UnsupportedPlatform),
];

/// Classify captured output from a non-zero extractor exit.
pub fn classify_failure(message: &str) -> ErrorKind {
    FAILURE_PATTERNS
        .iter()
        .find(|(pattern, _)| message.contains(pattern))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::ExtractionFailed)
}
