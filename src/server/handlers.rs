use axum::{
    Json,
    body::Body,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use super::AppState;
use super::response::{error_response, ErrorResponse};
use crate::config::ServerConfig;
use crate::error::{ErrorKind, ExtractionError, ReelgrabError};
use crate::orchestrator::ExtractionRequest;

#[derive(Debug, Deserialize)]
pub struct ExtractBody {
    pub url: Option<String>,
}

/// POST /extract
pub async fn extract(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ExtractBody>, JsonRejection>,
) -> Response {
    let url = match body {
        Ok(Json(ExtractBody { url: Some(url) })) => url,
        Ok(_) => return ExtractionError::invalid_input("URL is required").into_response(),
        Err(rejection) => {
            return ExtractionError::invalid_input(rejection.body_text()).into_response();
        }
    };

    let request = ExtractionRequest::new(url, public_base_url(&state.config.server, &headers));

    // Detached so that a dropped connection or the request timeout cannot cut
    // the extraction short; only its own deadline ends it.
    let orchestrator = Arc::clone(&state.orchestrator);
    let job = tokio::spawn(async move { orchestrator.extract(&request).await });

    match job.await {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            error!(error = %e, "Extraction task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /downloads/{filename}
pub async fn download(State(state): State<Arc<AppState>>, Path(filename): Path<String>) -> Response {
    match state.store.open(&filename).await {
        Ok((file, len)) => {
            let body = Body::from_stream(ReaderStream::new(file));
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("video/mp4")),
                    (header::CONTENT_LENGTH, HeaderValue::from(len)),
                ],
                body,
            )
                .into_response()
        }
        Err(ReelgrabError::InvalidArtifactName(_)) | Err(ReelgrabError::ArtifactNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "File not found")
        }
        Err(e) => {
            error!(error = %e, filename = %filename, "Failed to open artifact");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Replace the timeout layer's empty 408 with a JSON timeout body.
pub async fn request_timeout_as_json(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }

    let body = ErrorResponse {
        success: false,
        message: "Request timeout exceeded".to_string(),
        error: Some("The request did not complete within the server's time limit".to_string()),
        code: Some(ErrorKind::Timeout.code()),
        platform: None,
    };
    (StatusCode::GATEWAY_TIMEOUT, Json(body)).into_response()
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

/// Logs `<METHOD> <path> <status> <ms>ms` for every request.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} {} {}ms",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// Base URL for download links: configured value, else the request's Host.
pub fn public_base_url(config: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(base) = &config.public_base_url {
        return base.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|proto| *proto == "https")
        .unwrap_or("http");

    match headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        Some(host) if !host.is_empty() => format!("{}://{}", scheme, host),
        _ => format!("{}://localhost:{}", scheme, config.port),
    }
}
