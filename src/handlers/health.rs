//! # Health Check Handler
//!
//! Liveness endpoint for load balancers and monitoring. Also pings the
//! database, since no ceremony can complete without it.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

/// Health check endpoint
///
/// ## Route
/// GET /health
///
/// ## Response
/// `200 OK` with `"status": "healthy"` when the database answers,
/// `503 Service Unavailable` with `"status": "degraded"` otherwise.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "passkey-ceremony-server",
                "database": "ok"
            })),
        ),
        Err(e) => {
            tracing::error!("Health check database ping failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "service": "passkey-ceremony-server",
                    "database": "unreachable"
                })),
            )
        }
    }
}
