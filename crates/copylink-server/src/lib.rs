pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        // Link workflow
        .route("/api/link", post(routes::link::link_account))
        .route("/api/unlink", post(routes::link::unlink_account))
        // Accounts
        .route("/api/accounts", post(routes::accounts::create_account))
        .route(
            "/api/accounts/{id}",
            get(routes::accounts::get_account).delete(routes::accounts::delete_account),
        )
        .route(
            "/api/accounts/{id}/wait",
            post(routes::accounts::wait_account),
        )
        .route(
            "/api/accounts/{id}/balance",
            get(routes::accounts::balance),
        )
        .route(
            "/api/accounts/{id}/positions",
            get(routes::accounts::positions),
        )
        // Copy-trade configuration
        .route(
            "/api/subscribers/{id}",
            get(routes::subscribers::get_subscriber),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve on a pre-bound listener until `state.shutdown` is cancelled.
///
/// In-flight waits hold child tokens of `state.shutdown`, so they end with a
/// cancelled `TimedOut` instead of holding shutdown open for their full budget.
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let shutdown = app_state.shutdown.clone();
    let app = build_router(app_state);

    tracing::info!("copylink listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("copylink stopped");
    Ok(())
}
