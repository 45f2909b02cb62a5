use axum::http::StatusCode;
use copylink_core::config::ServiceConfig;
use copylink_core::test_support::{FakeProvider, FakeState};
use copylink_core::types::{Position, Subscriber, Subscription};
use copylink_server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> ServiceConfig {
    let mut cfg = ServiceConfig::default();
    cfg.provider.token = "tok".into();
    cfg.link.default_strategy_id = Some("strat-1".into());
    cfg.polling.max_wait_secs = 10;
    cfg.polling.interval_ms = 1000;
    cfg
}

fn app(fake: &Arc<FakeProvider>) -> axum::Router {
    build_router(AppState::new(config(), fake.clone().providers()))
}

async fn send(
    app: axum::Router,
    req: axum::http::Request<axum::body::Body>,
) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

async fn delete(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, req).await
}

fn credentials() -> serde_json::Value {
    json!({ "login": "1001", "password": "pw", "server": "Broker-Demo" })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let fake = Arc::new(FakeProvider::new());
    let (status, body) = get(app(&fake), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime_seconds"].is_u64());
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn link_success_returns_200_with_subscriber() {
    let fake = Arc::new(
        FakeProvider::new()
            .with_strategy("strat-1")
            .on_deploy(vec![FakeState::deploying(), FakeState::connected()]),
    );
    let (status, body) = post_json(app(&fake), "/api/link", credentials()).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "connected");
    assert_eq!(body["account_id"], "acc-1");
    assert_eq!(body["subscriber"]["subscriptions"][0]["strategyId"], "strat-1");
    assert!(fake.subscriber("acc-1").is_some());
}

#[tokio::test(start_paused = true)]
async fn link_failure_returns_400_and_cleans_up() {
    let fake = Arc::new(
        FakeProvider::new()
            .with_strategy("strat-1")
            .on_deploy(vec![FakeState::Errored("DEPLOY_FAILED", "E_SRV_NOT_FOUND")]),
    );
    let (status, body) = post_json(app(&fake), "/api/link", credentials()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["outcome"], "failed");
    assert_eq!(body["error_code"], "E_SRV_NOT_FOUND");
    assert_eq!(body["cleaned_up"], true);
    assert!(!fake.has_account("acc-1"));
}

#[tokio::test(start_paused = true)]
async fn link_timeout_returns_400() {
    let fake = Arc::new(
        FakeProvider::new()
            .with_strategy("strat-1")
            .on_deploy(vec![FakeState::deploying()]),
    );
    let (status, body) = post_json(app(&fake), "/api/link", credentials()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["outcome"], "timed_out");
    assert_eq!(body["last_observed"]["lifecycle_state"], "DEPLOYING");
}

#[tokio::test(start_paused = true)]
async fn client_disconnect_during_link_cleans_up_account() {
    let fake = Arc::new(
        FakeProvider::new()
            .with_strategy("strat-1")
            .on_deploy(vec![FakeState::deploying()]),
    );
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/link")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&credentials()).unwrap()))
        .unwrap();

    // The client goes away mid-wait; the response future is dropped.
    let pending = app(&fake).oneshot(req);
    assert!(tokio::time::timeout(Duration::from_millis(2500), pending)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!fake.has_account("acc-1"));
    let calls = fake.calls();
    assert!(calls.contains(&"undeploy acc-1".to_string()), "{calls:?}");
    assert!(calls.contains(&"delete acc-1".to_string()), "{calls:?}");
    assert!(fake.subscriber("acc-1").is_none());
}

#[tokio::test]
async fn link_missing_fields_returns_400_without_provider_calls() {
    let fake = Arc::new(FakeProvider::new().with_strategy("strat-1"));
    let (status, body) = post_json(app(&fake), "/api/link", json!({ "login": "1001" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let msg = body["error"].as_str().unwrap();
    assert!(msg.contains("password"), "{msg}");
    assert!(msg.contains("server"), "{msg}");
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn link_unknown_strategy_returns_404() {
    let fake = Arc::new(FakeProvider::new());
    let (status, _) = post_json(app(&fake), "/api/link", credentials()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(fake.created().is_empty());
}

#[tokio::test]
async fn link_upsert_failure_returns_502() {
    let fake = Arc::new(FakeProvider::new().with_strategy("strat-1").failing_upsert());
    let (status, _) = post_json(app(&fake), "/api/link", credentials()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!fake.has_account("acc-1"));
}

// ---------------------------------------------------------------------------
// Unlink
// ---------------------------------------------------------------------------

fn linked(fake: &FakeProvider) {
    fake.insert_account("acc-7", FakeState::connected());
    fake.insert_subscriber(Subscriber {
        id: "acc-7".into(),
        name: "acc-7".into(),
        subscriptions: vec![Subscription {
            strategy_id: "strat-1".into(),
            multiplier: 1.0,
        }],
    });
}

#[tokio::test(start_paused = true)]
async fn unlink_removes_subscriber_and_account() {
    let fake = Arc::new(FakeProvider::new());
    linked(&fake);
    let (status, body) = post_json(
        app(&fake),
        "/api/unlink",
        json!({ "accountId": "acc-7", "removeAccount": true }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["subscriber_deleted"], true);
    assert_eq!(body["account"]["deleted"], true);
    assert!(!fake.has_account("acc-7"));
}

#[tokio::test(start_paused = true)]
async fn unlink_with_stuck_undeploy_returns_400() {
    let fake = Arc::new(
        FakeProvider::new().on_undeploy(vec![FakeState::At("UNDEPLOYING", "DISCONNECTED")]),
    );
    linked(&fake);
    let (status, body) = post_json(
        app(&fake),
        "/api/unlink",
        json!({ "accountId": "acc-7", "removeAccount": true }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["account"]["deleted"], false);
    assert_eq!(body["account"]["undeploy"]["outcome"], "timed_out");
    assert!(fake.has_account("acc-7"));
}

#[tokio::test]
async fn unlink_unknown_subscriber_returns_404() {
    let fake = Arc::new(FakeProvider::new());
    let (status, _) = post_json(app(&fake), "/api/unlink", json!({ "accountId": "ghost" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_account_returns_201_with_id() {
    let fake = Arc::new(FakeProvider::new());
    let (status, body) = post_json(app(&fake), "/api/accounts", credentials()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "acc-1");
    assert_eq!(fake.calls(), vec!["create acc-1", "deploy acc-1"]);
}

#[tokio::test]
async fn get_account_returns_snapshot_or_404() {
    let fake = Arc::new(FakeProvider::new());
    fake.insert_account("acc-5", FakeState::deploying());

    let (status, body) = get(app(&fake), "/api/accounts/acc-5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lifecycle_state"], "DEPLOYING");
    assert_eq!(body["connection_status"], "DISCONNECTED");

    let (status, _) = get(app(&fake), "/api/accounts/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn wait_endpoint_reports_connected() {
    let fake = Arc::new(FakeProvider::new());
    fake.insert_account("acc-5", FakeState::connected());

    let (status, body) = post_json(
        app(&fake),
        "/api/accounts/acc-5/wait?max_wait_ms=3000&interval_ms=500",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "connected");
    assert_eq!(body["lifecycle_state"], "DEPLOYED");
}

#[tokio::test(start_paused = true)]
async fn wait_endpoint_honours_query_budget() {
    let fake = Arc::new(FakeProvider::new());
    fake.insert_account("acc-5", FakeState::deploying());

    let (status, body) = post_json(
        app(&fake),
        "/api/accounts/acc-5/wait?max_wait_ms=3000&interval_ms=1000",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["outcome"], "timed_out");
    assert_eq!(body["polls"], 3);
}

#[tokio::test(start_paused = true)]
async fn wait_endpoint_stops_on_shutdown() {
    let fake = Arc::new(FakeProvider::new());
    fake.insert_account("acc-5", FakeState::deploying());
    let state = AppState::new(config(), fake.clone().providers());
    state.shutdown.cancel();

    let (status, body) = post_json(build_router(state), "/api/accounts/acc-5/wait", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["outcome"], "timed_out");
    assert_eq!(body["cancelled"], true);
    assert_eq!(body["polls"], 0);
}

#[tokio::test]
async fn wait_endpoint_rejects_oversized_budget() {
    let fake = Arc::new(FakeProvider::new());
    fake.insert_account("acc-5", FakeState::deploying());
    let (status, body) = post_json(
        app(&fake),
        "/api/accounts/acc-5/wait?max_wait_ms=1000000000000000000",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("max_wait_ms"));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn wait_endpoint_rejects_zero_interval() {
    let fake = Arc::new(FakeProvider::new());
    let (status, body) = post_json(
        app(&fake),
        "/api/accounts/acc-5/wait?interval_ms=0",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("interval_ms"));
    assert!(fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_account_undeploys_then_deletes() {
    let fake = Arc::new(FakeProvider::new());
    fake.insert_account("acc-5", FakeState::connected());

    let (status, body) = delete(app(&fake), "/api/accounts/acc-5").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["deleted"], true);
    assert!(!fake.has_account("acc-5"));
}

#[tokio::test]
async fn delete_unknown_account_returns_404() {
    let fake = Arc::new(FakeProvider::new());
    let (status, _) = delete(app(&fake), "/api/accounts/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn balance_and_positions_pass_through() {
    let fake = Arc::new(FakeProvider::new());
    fake.insert_account("acc-5", FakeState::connected());
    fake.insert_position(
        "acc-5",
        Position {
            id: "p1".into(),
            symbol: "EURUSD".into(),
            position_type: "POSITION_TYPE_BUY".into(),
            volume: 0.1,
            open_price: Some(1.1),
            current_price: None,
            profit: Some(3.5),
            extra: Default::default(),
        },
    );

    let (status, body) = get(app(&fake), "/api/accounts/acc-5/balance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 10000.0);
    assert_eq!(body["currency"], "USD");

    let (status, body) = get(app(&fake), "/api/accounts/acc-5/positions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["symbol"], "EURUSD");
    assert_eq!(body[0]["type"], "POSITION_TYPE_BUY");

    let (status, _) = get(app(&fake), "/api/accounts/nope/balance").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscriber_lookup() {
    let fake = Arc::new(FakeProvider::new());
    linked(&fake);

    let (status, body) = get(app(&fake), "/api/subscribers/acc-7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["_id"], "acc-7");

    let (status, _) = get(app(&fake), "/api/subscribers/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
