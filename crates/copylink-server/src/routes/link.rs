use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use copylink_core::link::{self, LinkReport, LinkRequest, UnlinkReport, UnlinkRequest};

use super::run_detached;
use crate::error::AppError;
use crate::state::AppState;

/// POST /api/link: provision an account, wait for it to connect and
/// subscribe it to a strategy. 200 when linked, 400 otherwise.
pub async fn link_account(
    State(app): State<AppState>,
    Json(body): Json<LinkRequest>,
) -> Result<(StatusCode, Json<LinkReport>), AppError> {
    let report = run_detached(app.request_token(), move |cancel| async move {
        let policy = app.config.poll_policy();
        link::link_account(&app.providers, &app.config, &body, &policy, &cancel).await
    })
    .await??;

    let status = if report.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(report)))
}

/// POST /api/unlink: drop a subscription, optionally removing the account.
/// 400 when the account was asked to go but is still there.
pub async fn unlink_account(
    State(app): State<AppState>,
    Json(body): Json<UnlinkRequest>,
) -> Result<(StatusCode, Json<UnlinkReport>), AppError> {
    let report = run_detached(app.request_token(), move |cancel| async move {
        let policy = app.config.poll_policy();
        link::unlink_account(&app.providers, &body, &policy, &cancel).await
    })
    .await??;

    let status = match &report.account {
        Some(removal) if !removal.deleted => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    Ok((status, Json(report)))
}
