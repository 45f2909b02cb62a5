use copylink_core::config::ServiceConfig;
use copylink_core::provider::Providers;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub providers: Providers,
    pub started_at: Instant,
    /// Cancelled on server shutdown; every in-flight wait runs on a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServiceConfig, providers: Providers) -> Self {
        Self {
            config: Arc::new(config),
            providers,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token for one request's wait loop.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copylink_core::test_support::FakeProvider;

    #[test]
    fn request_tokens_follow_shutdown() {
        let state = AppState::new(
            ServiceConfig::default(),
            Arc::new(FakeProvider::new()).providers(),
        );
        let token = state.request_token();
        assert!(!token.is_cancelled());
        state.shutdown.cancel();
        assert!(token.is_cancelled());
    }
}
