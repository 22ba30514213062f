//! Status Routes
//!
//! Routes:
//! - GET /health - Liveness plus a database round trip

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{db, AppState};

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub database: DependencyCheck,
}

#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub message: Option<String>,
}

/// Health check.
///
/// GET /health
///
/// Returns 503 when the database does not answer.
#[axum::debug_handler]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = check_database(&state).await;
    let status = database.status;

    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").into(),
            timestamp: Utc::now(),
            database,
        }),
    )
}

async fn check_database(state: &AppState) -> DependencyCheck {
    let start = Instant::now();
    let result = db::health_check(&state.db).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(()) => DependencyCheck {
            status: HealthStatus::Healthy,
            latency_ms,
            message: None,
        },
        Err(e) => DependencyCheck {
            status: HealthStatus::Unhealthy,
            latency_ms,
            message: Some(e.to_string()),
        },
    }
}
