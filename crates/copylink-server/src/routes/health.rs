use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/health: liveness and uptime.
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_seconds": app.started_at.elapsed().as_secs(),
    }))
}
