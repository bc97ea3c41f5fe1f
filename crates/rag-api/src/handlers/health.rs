use axum::extract::State;
use axum::{http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// `GET /health/ping` — liveness only, no dependency checks.
pub async fn ping() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /health/warmup` and `GET /actuator/health` — touches the database
/// so a cold-started deployment's first real request doesn't pay
/// connection setup cost.
pub async fn warmup(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(state.db_pool.get()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("warmup database check failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
