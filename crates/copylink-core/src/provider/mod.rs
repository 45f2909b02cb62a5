//! Seams to the external platform.
//!
//! The three provider APIs (provisioning, copy-trade configuration, trading
//! data) are traits so the server and tests can swap in fakes. [`HttpProvider`]
//! implements all of them over REST.

mod http;

pub use http::{HttpProvider, ProviderEndpoints};

use crate::error::ProviderError;
use crate::types::{
    AccountInformation, AccountSnapshot, NewAccount, Position, Strategy, Subscriber,
};
use async_trait::async_trait;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Read-only status endpoint the poller drives.
#[async_trait]
pub trait AccountStatusSource: Send + Sync {
    async fn fetch_snapshot(&self, account_id: &str) -> ProviderResult<AccountSnapshot>;
}

#[async_trait]
pub trait ProvisioningApi: AccountStatusSource {
    /// Create an account and return the provider-assigned id.
    async fn create_account(&self, account: &NewAccount) -> ProviderResult<String>;

    async fn deploy(&self, account_id: &str) -> ProviderResult<()>;

    async fn undeploy(&self, account_id: &str) -> ProviderResult<()>;

    async fn delete_account(&self, account_id: &str) -> ProviderResult<()>;

    /// Existence check: `Ok(None)` when the provider has no such account.
    async fn find_account(&self, account_id: &str) -> ProviderResult<Option<AccountSnapshot>> {
        match self.fetch_snapshot(account_id).await {
            Ok(snap) => Ok(Some(snap)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
pub trait CopyTradeApi: Send + Sync {
    /// Existence check: `Ok(None)` when no subscriber is configured for the id.
    async fn find_subscriber(&self, subscriber_id: &str) -> ProviderResult<Option<Subscriber>>;

    /// Create or replace the subscriber configuration.
    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> ProviderResult<()>;

    async fn remove_subscription(
        &self,
        subscriber_id: &str,
        strategy_id: &str,
    ) -> ProviderResult<()>;

    async fn delete_subscriber(&self, subscriber_id: &str) -> ProviderResult<()>;

    async fn find_strategy(&self, strategy_id: &str) -> ProviderResult<Option<Strategy>>;
}

#[async_trait]
pub trait TradingApi: Send + Sync {
    async fn account_information(&self, account_id: &str) -> ProviderResult<AccountInformation>;

    async fn positions(&self, account_id: &str) -> ProviderResult<Vec<Position>>;
}

/// The three provider APIs, shared across handlers.
#[derive(Clone)]
pub struct Providers {
    pub provisioning: std::sync::Arc<dyn ProvisioningApi>,
    pub copytrade: std::sync::Arc<dyn CopyTradeApi>,
    pub trading: std::sync::Arc<dyn TradingApi>,
}

impl Providers {
    /// One REST client serving all three APIs.
    pub fn http(provider: HttpProvider) -> Self {
        let shared = std::sync::Arc::new(provider);
        Self {
            provisioning: shared.clone(),
            copytrade: shared.clone(),
            trading: shared,
        }
    }
}
