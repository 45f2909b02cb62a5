use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use copylink_core::link::{self, AccountRemoval, LinkRequest};
use copylink_core::poller::{self, Outcome, PollPolicy};
use copylink_core::types::{AccountInformation, AccountSnapshot, Position};
use std::time::Duration;

use super::run_detached;
use crate::error::AppError;
use crate::state::AppState;

/// POST /api/accounts: create and deploy without waiting.
pub async fn create_account(
    State(app): State<AppState>,
    Json(body): Json<LinkRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let id = link::provision_account(&app.providers, &app.config, &body).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// GET /api/accounts/{id}: current provider snapshot.
pub async fn get_account(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountSnapshot>, AppError> {
    app.providers
        .provisioning
        .find_account(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("account not found: {id}")))
}

#[derive(Debug, serde::Deserialize)]
pub struct WaitQuery {
    pub max_wait_ms: Option<u64>,
    pub interval_ms: Option<u64>,
}

impl WaitQuery {
    fn policy(&self, default: PollPolicy) -> Result<PollPolicy, AppError> {
        let policy = PollPolicy {
            max_wait: self
                .max_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(default.max_wait),
            interval: self
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(default.interval),
        };
        if policy.interval.is_zero() {
            return Err(AppError::bad_request("interval_ms must be greater than zero"));
        }
        if policy.max_wait > poller::MAX_WAIT_LIMIT {
            return Err(AppError::bad_request(format!(
                "max_wait_ms must be at most {}",
                poller::MAX_WAIT_LIMIT.as_millis()
            )));
        }
        Ok(policy)
    }
}

/// POST /api/accounts/{id}/wait: poll until connected. 200 on success, 400
/// on failure, timeout or cancellation.
pub async fn wait_account(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Result<(StatusCode, Json<Outcome>), AppError> {
    let policy = query.policy(app.config.poll_policy())?;
    let outcome = run_detached(app.request_token(), move |cancel| async move {
        let provisioning = app.providers.provisioning.as_ref();
        poller::wait_until_connected(provisioning, &id, &policy, &cancel).await
    })
    .await?;
    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(outcome)))
}

/// DELETE /api/accounts/{id}: undeploy, wait, delete.
pub async fn delete_account(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AccountRemoval>), AppError> {
    let removal = run_detached(app.request_token(), move |cancel| async move {
        let policy = app.config.poll_policy();
        link::remove_account(&app.providers, &id, &policy, &cancel).await
    })
    .await??;
    let status = if removal.deleted {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(removal)))
}

/// GET /api/accounts/{id}/balance
pub async fn balance(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountInformation>, AppError> {
    Ok(Json(app.providers.trading.account_information(&id).await?))
}

/// GET /api/accounts/{id}/positions
pub async fn positions(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Position>>, AppError> {
    Ok(Json(app.providers.trading.positions(&id).await?))
}
