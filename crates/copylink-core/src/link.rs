//! Link and unlink workflows.
//!
//! Linking provisions a subscriber account and attaches it to a copy-trading
//! strategy:
//!
//! ```text
//! validate → strategy exists? → create → deploy → wait_until_connected
//!     Connected            → find_subscriber → merge subscription → upsert
//!     Failed / TimedOut    → undeploy + delete (when cleanup_on_failure)
//!     subscribe fails      → undeploy + delete (when cleanup_on_failure), then the error
//! ```
//!
//! Unlinking reverses it: drop the subscription (or the whole subscriber) and
//! optionally undeploy and delete the account.

use crate::config::ServiceConfig;
use crate::error::{LinkError, Result};
use crate::poller::{self, Outcome, PollPolicy, WaitCondition};
use crate::provider::{ProvisioningApi, Providers};
use crate::types::{LifecycleState, NewAccount, Platform, Subscriber, Subscription};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Incoming link/provision request. Every field is optional on the wire so
/// that missing ones can be reported together.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub magic: Option<u64>,
    #[serde(default)]
    pub strategy_id: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl LinkRequest {
    /// Field-presence check; builds the provider account body.
    pub fn account(&self, config: &ServiceConfig) -> Result<NewAccount> {
        let mut missing = Vec::new();
        let login = present(&self.login);
        let password = present(&self.password);
        let server = present(&self.server);
        if login.is_none() {
            missing.push("login");
        }
        if password.is_none() {
            missing.push("password");
        }
        if server.is_none() {
            missing.push("server");
        }
        let (Some(login), Some(password), Some(server)) = (login, password, server) else {
            return Err(LinkError::MissingFields(missing));
        };

        let platform = match present(&self.platform) {
            Some(p) => p.parse::<Platform>().map_err(LinkError::InvalidPlatform)?,
            None => config.account.platform,
        };
        let name = present(&self.name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{login}@{server}"));
        let account_type = present(&self.account_type)
            .map(str::to_string)
            .unwrap_or_else(|| config.account.account_type.clone());

        Ok(NewAccount::subscriber(
            name,
            login,
            password,
            server,
            platform,
            account_type,
            self.magic.unwrap_or(config.account.magic),
        ))
    }

    /// The strategy subscription, falling back to configured defaults.
    pub fn subscription(&self, config: &ServiceConfig) -> Result<Subscription> {
        let strategy_id = present(&self.strategy_id)
            .map(str::to_string)
            .or_else(|| config.link.default_strategy_id.clone())
            .ok_or_else(|| LinkError::MissingFields(vec!["strategyId"]))?;
        let multiplier = self.multiplier.unwrap_or(config.link.default_multiplier);
        if multiplier <= 0.0 || !multiplier.is_finite() {
            return Err(LinkError::InvalidMultiplier(multiplier));
        }
        Ok(Subscription {
            strategy_id,
            multiplier,
        })
    }

    /// All validation at once, so a bad request touches nothing remote.
    pub fn validate(&self, config: &ServiceConfig) -> Result<(NewAccount, Subscription)> {
        match (self.account(config), self.subscription(config)) {
            (Ok(acc), Ok(sub)) => Ok((acc, sub)),
            (Err(LinkError::MissingFields(mut a)), Err(LinkError::MissingFields(b))) => {
                a.extend(b);
                Err(LinkError::MissingFields(a))
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkRequest {
    pub account_id: String,
    /// Drop only this strategy; `None` removes the whole subscriber.
    #[serde(default)]
    pub strategy_id: Option<String>,
    /// Also undeploy and delete the trading account.
    #[serde(default)]
    pub remove_account: bool,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub account_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<Subscriber>,
    pub cleaned_up: bool,
}

impl LinkReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success() && self.subscriber.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountRemoval {
    pub undeploy: Outcome,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlinkReport {
    pub account_id: String,
    pub subscription_removed: bool,
    pub subscriber_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountRemoval>,
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// Create and deploy an account without waiting for it. Returns its id.
pub async fn provision_account(
    providers: &Providers,
    config: &ServiceConfig,
    req: &LinkRequest,
) -> Result<String> {
    let account = req.account(config)?;
    create_and_deploy(providers.provisioning.as_ref(), &account, config).await
}

async fn create_and_deploy(
    provisioning: &dyn ProvisioningApi,
    account: &NewAccount,
    config: &ServiceConfig,
) -> Result<String> {
    let account_id = provisioning.create_account(account).await?;
    tracing::info!(account_id = %account_id, login = %account.login, "account created");

    if let Err(e) = provisioning.deploy(&account_id).await {
        tracing::warn!(account_id = %account_id, "deploy failed: {e}");
        if config.link.cleanup_on_failure {
            cleanup(provisioning, &account_id).await;
        }
        return Err(e.into());
    }
    tracing::info!(account_id = %account_id, "deploy requested");
    Ok(account_id)
}

/// Provision an account, wait for it to connect, then subscribe it to the
/// strategy.
pub async fn link_account(
    providers: &Providers,
    config: &ServiceConfig,
    req: &LinkRequest,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<LinkReport> {
    let (account, subscription) = req.validate(config)?;

    if config.link.verify_strategy
        && providers
            .copytrade
            .find_strategy(&subscription.strategy_id)
            .await?
            .is_none()
    {
        return Err(LinkError::StrategyNotFound(subscription.strategy_id));
    }

    let account_id = create_and_deploy(providers.provisioning.as_ref(), &account, config).await?;
    let outcome =
        poller::wait_until_connected(providers.provisioning.as_ref(), &account_id, policy, cancel)
            .await;

    if !outcome.is_success() {
        let cleaned_up = if config.link.cleanup_on_failure {
            cleanup(providers.provisioning.as_ref(), &account_id).await
        } else {
            false
        };
        return Ok(LinkReport {
            account_id,
            outcome,
            subscriber: None,
            cleaned_up,
        });
    }

    let subscriber = match subscribe(providers, &account_id, &account.name, subscription).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            tracing::warn!(account_id = %account_id, "subscribe failed after connect: {e}");
            if config.link.cleanup_on_failure {
                cleanup(providers.provisioning.as_ref(), &account_id).await;
            }
            return Err(e);
        }
    };
    Ok(LinkReport {
        account_id,
        outcome,
        subscriber: Some(subscriber),
        cleaned_up: false,
    })
}

/// Attach `subscription` to the subscriber for `account_id`, creating the
/// subscriber when none exists.
pub async fn subscribe(
    providers: &Providers,
    account_id: &str,
    name: &str,
    subscription: Subscription,
) -> Result<Subscriber> {
    let mut subscriber = match providers.copytrade.find_subscriber(account_id).await? {
        Some(existing) => existing,
        None => Subscriber {
            id: account_id.to_string(),
            name: name.to_string(),
            subscriptions: Vec::new(),
        },
    };
    let strategy_id = subscription.strategy_id.clone();
    subscriber.merge_subscription(subscription);
    providers.copytrade.upsert_subscriber(&subscriber).await?;
    tracing::info!(account_id, strategy_id = %strategy_id, "subscriber linked");
    Ok(subscriber)
}

/// Remove the subscription (or subscriber) and optionally the account.
pub async fn unlink_account(
    providers: &Providers,
    req: &UnlinkRequest,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<UnlinkReport> {
    let account_id = req.account_id.trim();
    if account_id.is_empty() {
        return Err(LinkError::MissingFields(vec!["accountId"]));
    }

    let mut report = UnlinkReport {
        account_id: account_id.to_string(),
        subscription_removed: false,
        subscriber_deleted: false,
        account: None,
    };

    match providers.copytrade.find_subscriber(account_id).await? {
        Some(mut subscriber) => match present(&req.strategy_id) {
            Some(strategy_id) => {
                if subscriber.remove_subscription(strategy_id) {
                    report.subscription_removed = true;
                    if subscriber.subscriptions.is_empty() {
                        providers.copytrade.delete_subscriber(account_id).await?;
                        report.subscriber_deleted = true;
                    } else {
                        providers
                            .copytrade
                            .remove_subscription(account_id, strategy_id)
                            .await?;
                    }
                }
            }
            None => {
                report.subscription_removed = !subscriber.subscriptions.is_empty();
                providers.copytrade.delete_subscriber(account_id).await?;
                report.subscriber_deleted = true;
            }
        },
        None if !req.remove_account => {
            return Err(LinkError::SubscriberNotFound(account_id.to_string()));
        }
        None => {}
    }

    if req.remove_account {
        report.account = Some(remove_account(providers, account_id, policy, cancel).await?);
    }
    tracing::info!(
        account_id,
        subscription_removed = report.subscription_removed,
        subscriber_deleted = report.subscriber_deleted,
        "account unlinked"
    );
    Ok(report)
}

/// Undeploy, wait for `UNDEPLOYED`, then delete.
pub async fn remove_account(
    providers: &Providers,
    account_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<AccountRemoval> {
    let provisioning = providers.provisioning.as_ref();
    let snapshot = provisioning
        .find_account(account_id)
        .await?
        .ok_or_else(|| LinkError::AccountNotFound(account_id.to_string()))?;

    match snapshot.lifecycle_state {
        LifecycleState::Undeployed | LifecycleState::Undeploying => {
            let state = &snapshot.lifecycle_state;
            tracing::debug!(account_id, %state, "undeploy already under way");
        }
        _ => provisioning.undeploy(account_id).await?,
    }
    let undeploy =
        poller::wait_until(provisioning, account_id, WaitCondition::undeployed(), policy, cancel)
            .await;

    let deleted = if undeploy.is_success() {
        provisioning.delete_account(account_id).await?;
        tracing::info!(account_id, "account deleted");
        true
    } else {
        tracing::warn!(account_id, ?undeploy, "account not undeployed; leaving it in place");
        false
    };
    Ok(AccountRemoval { undeploy, deleted })
}

/// Best-effort undeploy + delete. Returns true when the delete went through.
async fn cleanup(provisioning: &dyn ProvisioningApi, account_id: &str) -> bool {
    if let Err(e) = provisioning.undeploy(account_id).await {
        tracing::warn!(account_id, "cleanup undeploy failed: {e}");
    }
    match provisioning.delete_account(account_id).await {
        Ok(()) => {
            tracing::info!(account_id, "cleaned up account after failed link");
            true
        }
        Err(e) => {
            tracing::warn!(account_id, "cleanup delete failed: {e}");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
