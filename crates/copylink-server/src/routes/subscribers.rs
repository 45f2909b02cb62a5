use axum::extract::{Path, State};
use axum::Json;
use copylink_core::types::Subscriber;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/subscribers/{id}: copy-trade subscriber configuration.
pub async fn get_subscriber(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Subscriber>, AppError> {
    app.providers
        .copytrade
        .find_subscriber(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("subscriber not found: {id}")))
}
