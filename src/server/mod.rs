//! HTTP boundary: routes, shared state, startup and graceful shutdown.

pub mod handlers;
pub mod health;
pub mod response;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::Response,
    routing::{get, post},
};
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::System;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, ReelgrabError};
use crate::extractor::{ExtractorCommandBuilder, ProcessOutcome, ProcessRunnerFactory};
use crate::orchestrator::Orchestrator;
use crate::store::{spawn_reclaim_loop, ArtifactStore};

const MAX_BODY_BYTES: usize = 64 * 1024;
const VERSION_PROBE_DEADLINE: Duration = Duration::from_secs(10);

/// State shared by every handler. Config and store are the same instances
/// the orchestrator holds.
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<ArtifactStore>,
    pub started_at: Instant,
    pub system: Mutex<System>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_orchestrator(Orchestrator::new(Arc::new(config)))
    }

    pub fn with_orchestrator(orchestrator: Orchestrator) -> Self {
        Self {
            config: Arc::clone(orchestrator.config()),
            store: Arc::clone(orchestrator.store()),
            orchestrator: Arc::new(orchestrator),
            started_at: Instant::now(),
            system: Mutex::new(System::new()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let request_timeout = state.config.server.request_timeout();

    Router::new()
        .route("/extract", post(handlers::extract))
        .route("/downloads/{filename}", get(handlers::download))
        .route("/health", get(health::health))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(handlers::log_requests))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::map_response(handlers::request_timeout_as_json))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "Server error");
    response::error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Prepare the downloads directory, start background reclaim and serve until shutdown.
pub async fn run(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config));
    let config = Arc::clone(&state.config);

    state.store.ensure_dir().await?;
    probe_extractor(&config).await;

    let reclaim = spawn_reclaim_loop(
        Arc::clone(&state.store),
        config.storage.retention(),
        config.storage.reclaim_interval(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ReelgrabError::Server(format!("Failed to bind {}: {}", addr, e)))?;

    info!(
        addr = %addr,
        downloads_dir = %config.storage.downloads_dir.display(),
        retention_hours = config.storage.retention_hours,
        reclaim_interval_hours = config.storage.reclaim_interval_hours,
        extractor = %config.extractor.binary_path,
        "Server running on port {}",
        config.server.port
    );

    let app = router(state);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    reclaim.abort();
    served.map_err(|e| ReelgrabError::Server(format!("Server terminated abnormally: {}", e)))?;

    info!("Server terminated");
    Ok(())
}

/// Log which extractor build is installed. A failure here only warns; each
/// request reports its own spawn errors.
async fn probe_extractor(config: &Arc<Config>) {
    let command = ExtractorCommandBuilder::new(Arc::clone(config)).version_check();
    let runner = ProcessRunnerFactory::create_runner(&config.extractor);

    match runner.run(&command, VERSION_PROBE_DEADLINE).await {
        ProcessOutcome::Success { stdout } => {
            info!(version = %stdout.trim(), "Using {}", config.extractor.binary_path);
        }
        ProcessOutcome::Failed { message } => {
            warn!(error = %message, "Extractor version check failed");
        }
        ProcessOutcome::TimedOut => {
            warn!("Extractor version check timed out after {:?}", VERSION_PROBE_DEADLINE);
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM. Shutting down gracefully..."),
    }
}
