//! JSON bodies for failed requests.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{ErrorKind, ExtractionError};
use crate::platform::Platform;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable classification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl ErrorResponse {
    /// Failure body carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: None,
            code: None,
            platform: None,
        }
    }
}

impl From<&ExtractionError> for ErrorResponse {
    fn from(err: &ExtractionError) -> Self {
        Self {
            success: false,
            message: err.client_message(),
            error: Some(err.public_detail()),
            code: Some(err.kind.code()),
            platform: err.platform,
        }
    }
}

/// `{success:false, message}` with the given status.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::message(message))).into_response()
}

impl IntoResponse for ExtractionError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match self.kind {
            ErrorKind::InvalidInput => {
                tracing::debug!(error = %self, "Rejected extraction request");
            }
            ErrorKind::ExtractionFailed | ErrorKind::ArtifactMissing => {
                tracing::error!(error = %self.public_detail(), code = self.kind.code(), "Extraction failed");
            }
            _ => {
                tracing::warn!(error = %self.public_detail(), code = self.kind.code(), "Extraction failed");
            }
        }

        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let err = ExtractionError::new(
            ErrorKind::UnsupportedPlatform,
            "ERROR: Unsupported URL: https://example.com",
            Some(Platform::Unknown),
        );
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Unsupported video platform");
        assert_eq!(body["error"], "ERROR: Unsupported URL: https://example.com");
        assert_eq!(body["code"], "UNSUPPORTED_PLATFORM");
        assert_eq!(body["platform"], "unknown");
    }

    #[test]
    fn test_invalid_input_omits_platform() {
        let body = serde_json::to_value(ErrorResponse::from(&ExtractionError::invalid_input("bad"))).unwrap();
        assert!(body.get("platform").is_none());
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[test]
    fn test_status_from_kind() {
        let response = ExtractionError::new(ErrorKind::Timeout, "late", Some(Platform::TikTok)).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
