use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use sysinfo::System;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub memory: MemoryReport,
    /// Seconds since the server started
    pub uptime: f64,
    pub timestamp: String,
    pub load: LoadReport,
    pub disk: DiskReport,
}

#[derive(Debug, Default, Serialize)]
pub struct MemoryReport {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    pub cpu_percent: f32,
}

#[derive(Debug, Serialize)]
pub struct DiskReport {
    /// Files currently in the downloads directory
    pub downloads: usize,
}

#[derive(Debug, Serialize)]
struct UnhealthyReport {
    status: &'static str,
    error: String,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let downloads = match state.store.list().await {
        Ok(artifacts) => artifacts.len(),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UnhealthyReport {
                    status: "unhealthy",
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let (memory, load) = process_metrics(&state.system);

    Json(HealthReport {
        status: "healthy",
        memory,
        uptime: state.started_at.elapsed().as_secs_f64(),
        timestamp: Utc::now().to_rfc3339(),
        load,
        disk: DiskReport { downloads },
    })
    .into_response()
}

fn process_metrics(system: &Mutex<System>) -> (MemoryReport, LoadReport) {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return Default::default();
    };

    let mut system = system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    system.refresh_process(pid);

    match system.process(pid) {
        Some(process) => (
            MemoryReport {
                rss_bytes: process.memory(),
                virtual_bytes: process.virtual_memory(),
            },
            LoadReport {
                cpu_percent: process.cpu_usage(),
            },
        ),
        None => Default::default(),
    }
}
