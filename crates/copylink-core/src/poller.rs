//! Wait for a provider account to reach a target state.
//!
//! One loop, parameterized by a [`WaitCondition`]: fetch a snapshot, stop on
//! the success or failure predicate, otherwise sleep a fixed interval. Fetch
//! errors are retried until the deadline. The caller's [`CancellationToken`]
//! ends the loop early.

use crate::provider::AccountStatusSource;
use crate::types::{
    AccountSnapshot, ConnectionStatus, LifecycleState, ObservedState,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(90);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2500);
/// Longest wait a caller may ask for.
pub const MAX_WAIT_LIMIT: Duration = Duration::from_secs(60 * 60);

const EMPTY_ACCOUNT_ID: &str = "E_EMPTY_ACCOUNT_ID";

// ---------------------------------------------------------------------------
// PollPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_wait: Duration,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

// ---------------------------------------------------------------------------
// WaitCondition
// ---------------------------------------------------------------------------

/// The pair of terminal predicates a wait loop checks on every snapshot.
#[derive(Clone, Copy)]
pub struct WaitCondition {
    pub label: &'static str,
    pub success: fn(&AccountSnapshot) -> bool,
    pub failure: fn(&AccountSnapshot) -> bool,
}

impl WaitCondition {
    /// Deployed and connected, both in the same snapshot.
    pub fn connected() -> Self {
        Self {
            label: "deployed and connected",
            success: |s| {
                s.lifecycle_state == LifecycleState::Deployed
                    && s.connection_status == ConnectionStatus::Connected
                    && s.error_code.is_none()
            },
            failure: |s| s.lifecycle_state == LifecycleState::DeployFailed || s.error_code.is_some(),
        }
    }

    /// Fully undeployed, so the account can be deleted.
    pub fn undeployed() -> Self {
        Self {
            label: "undeployed",
            success: |s| s.lifecycle_state == LifecycleState::Undeployed,
            failure: |s| s.lifecycle_state == LifecycleState::UndeployFailed,
        }
    }
}

impl std::fmt::Debug for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitCondition")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The success predicate held. For [`WaitCondition::connected`] that is
    /// `DEPLOYED` + `CONNECTED` in one snapshot.
    Connected {
        lifecycle_state: LifecycleState,
        connection_status: ConnectionStatus,
    },
    Failed {
        lifecycle_state: Option<LifecycleState>,
        connection_status: Option<ConnectionStatus>,
        error_code: Option<String>,
        raw: serde_json::Value,
    },
    /// The budget ran out, or the caller cancelled (`cancelled: true`) before
    /// either predicate held.
    TimedOut {
        last_observed: Option<ObservedState>,
        last_error: Option<String>,
        polls: u32,
        cancelled: bool,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Connected { .. })
    }
}

// ---------------------------------------------------------------------------
// ProvisioningAttempt
// ---------------------------------------------------------------------------

/// Book-keeping for one wait loop. Lives only for the duration of the call.
#[derive(Debug, Clone)]
pub struct ProvisioningAttempt {
    pub account_id: Option<String>,
    pub desired_state: WaitCondition,
    pub observed_state: Option<ObservedState>,
    pub error_code: Option<String>,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub polls: u32,
}

impl ProvisioningAttempt {
    pub fn new(account_id: &str, desired_state: WaitCondition, policy: &PollPolicy) -> Self {
        let started_at = Utc::now();
        let deadline = chrono::Duration::from_std(policy.max_wait)
            .ok()
            .and_then(|d| started_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            account_id: (!account_id.is_empty()).then(|| account_id.to_string()),
            desired_state,
            observed_state: None,
            error_code: None,
            started_at,
            deadline,
            polls: 0,
        }
    }

    fn observe(&mut self, snap: &AccountSnapshot) {
        self.observed_state = Some(snap.observed());
        self.error_code = snap.error_code.clone();
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Poll `account_id` until it is deployed and connected, fails, or the
/// policy's deadline passes.
pub async fn wait_until_connected<S: AccountStatusSource + ?Sized>(
    source: &S,
    account_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Outcome {
    wait_until(source, account_id, WaitCondition::connected(), policy, cancel).await
}

/// Poll `account_id` until `condition` succeeds or fails.
pub async fn wait_until<S: AccountStatusSource + ?Sized>(
    source: &S,
    account_id: &str,
    condition: WaitCondition,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Outcome {
    let mut attempt = ProvisioningAttempt::new(account_id, condition, policy);
    let Some(id) = attempt.account_id.clone() else {
        return Outcome::Failed {
            lifecycle_state: None,
            connection_status: None,
            error_code: Some(EMPTY_ACCOUNT_ID.to_string()),
            raw: serde_json::Value::Null,
        };
    };

    let start = Instant::now();
    let mut last_error: Option<String> = None;

    tracing::info!(
        account_id = %id,
        target = condition.label,
        max_wait_ms = policy.max_wait.as_millis() as u64,
        interval_ms = policy.interval.as_millis() as u64,
        "waiting for account"
    );

    while start.elapsed() < policy.max_wait {
        if cancel.is_cancelled() {
            return cancelled(&attempt);
        }

        attempt.polls += 1;
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return cancelled(&attempt),
            r = source.fetch_snapshot(&id) => r,
        };
        match fetched {
            Ok(snap) => {
                attempt.observe(&snap);
                last_error = None;
                tracing::debug!(
                    account_id = %id,
                    poll = attempt.polls,
                    state = %snap.lifecycle_state,
                    connection = %snap.connection_status,
                    "account snapshot"
                );

                if (condition.success)(&snap) {
                    tracing::info!(account_id = %id, polls = attempt.polls, "account reached {}", condition.label);
                    return Outcome::Connected {
                        lifecycle_state: snap.lifecycle_state,
                        connection_status: snap.connection_status,
                    };
                }
                if (condition.failure)(&snap) {
                    tracing::warn!(
                        account_id = %id,
                        state = %snap.lifecycle_state,
                        error_code = ?snap.error_code,
                        "account reported terminal failure"
                    );
                    return Outcome::Failed {
                        lifecycle_state: Some(snap.lifecycle_state),
                        connection_status: Some(snap.connection_status),
                        error_code: snap.error_code,
                        raw: snap.raw,
                    };
                }
            }
            Err(e) => {
                tracing::warn!(account_id = %id, poll = attempt.polls, "snapshot fetch failed: {e}");
                last_error = Some(e.to_string());
            }
        }

        let remaining = policy.max_wait.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return cancelled(&attempt),
            _ = tokio::time::sleep(policy.interval.min(remaining)) => {}
        }
    }

    tracing::warn!(
        account_id = %id,
        polls = attempt.polls,
        deadline = %attempt.deadline,
        "timed out waiting for account"
    );
    Outcome::TimedOut {
        last_observed: attempt.observed_state,
        last_error,
        polls: attempt.polls,
        cancelled: false,
    }
}

fn cancelled(attempt: &ProvisioningAttempt) -> Outcome {
    tracing::info!(account_id = ?attempt.account_id, polls = attempt.polls, "wait cancelled");
    Outcome::TimedOut {
        last_observed: attempt.observed_state.clone(),
        last_error: None,
        polls: attempt.polls,
        cancelled: true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::ProviderResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    enum Step {
        State(&'static str, &'static str),
        Failed(&'static str),
        Error,
    }

    /// Replays scripted steps; the last step repeats forever.
    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        last: Mutex<Option<Step>>,
        polls: AtomicU32,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                last: Mutex::new(None),
                polls: AtomicU32::new(0),
            }
        }

        fn polls(&self) -> u32 {
            self.polls.load(Ordering::SeqCst)
        }
    }

    fn render(step: &Step) -> ProviderResult<AccountSnapshot> {
        match step {
            Step::State(state, conn) => AccountSnapshot::from_value(json!({
                "_id": "acc", "state": state, "connectionStatus": conn,
            })),
            Step::Failed(code) => AccountSnapshot::from_value(json!({
                "_id": "acc", "state": "DEPLOY_FAILED", "connectionStatus": "DISCONNECTED",
                "errorCode": code,
            })),
            Step::Error => Err(ProviderError::Status {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }

    #[async_trait]
    impl AccountStatusSource for Scripted {
        async fn fetch_snapshot(&self, _account_id: &str) -> ProviderResult<AccountSnapshot> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.steps.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(step) = next {
                *last = Some(step);
            }
            render(last.as_ref().expect("script must not be empty"))
        }
    }

    fn policy(max_ms: u64, interval_ms: u64) -> PollPolicy {
        PollPolicy {
            max_wait: Duration::from_millis(max_ms),
            interval: Duration::from_millis(interval_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_polls_once() {
        let src = Scripted::new(vec![Step::State("DEPLOYED", "CONNECTED")]);
        let started = Instant::now();
        let out = wait_until_connected(&src, "acc", &policy(10_000, 1000), &CancellationToken::new()).await;

        assert_eq!(
            out,
            Outcome::Connected {
                lifecycle_state: LifecycleState::Deployed,
                connection_status: ConnectionStatus::Connected,
            }
        );
        assert_eq!(src.polls(), 1);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_on_third_poll_stops_polling() {
        let src = Scripted::new(vec![
            Step::State("DEPLOYING", "DISCONNECTED"),
            Step::State("DEPLOYING", "DISCONNECTED"),
            Step::Failed("E_AUTH"),
            Step::State("DEPLOYED", "CONNECTED"),
        ]);
        let out = wait_until_connected(&src, "acc", &policy(60_000, 1000), &CancellationToken::new()).await;

        match out {
            Outcome::Failed { lifecycle_state, error_code, raw, .. } => {
                assert_eq!(lifecycle_state, Some(LifecycleState::DeployFailed));
                assert_eq!(error_code.as_deref(), Some("E_AUTH"));
                assert_eq!(raw["errorCode"], "E_AUTH");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(src.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn error_code_alone_is_terminal() {
        struct WithCode;
        #[async_trait]
        impl AccountStatusSource for WithCode {
            async fn fetch_snapshot(&self, _: &str) -> ProviderResult<AccountSnapshot> {
                AccountSnapshot::from_value(json!({
                    "_id": "acc", "state": "DEPLOYED", "connectionStatus": "CONNECTED",
                    "errorCode": "E_SRV_NOT_FOUND",
                }))
            }
        }
        let out = wait_until_connected(&WithCode, "acc", &policy(5000, 1000), &CancellationToken::new()).await;
        assert!(matches!(out, Outcome::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn never_terminal_times_out_after_about_five_polls() {
        let src = Scripted::new(vec![Step::State("DEPLOYING", "DISCONNECTED")]);
        let started = Instant::now();
        let out = wait_until_connected(&src, "acc", &policy(5000, 1000), &CancellationToken::new()).await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(4000) && elapsed <= Duration::from_millis(6000));
        match out {
            Outcome::TimedOut {
                last_observed,
                last_error,
                polls,
                cancelled,
            } => {
                assert!(!cancelled);
                assert!((4..=6).contains(&polls), "polls = {polls}");
                assert_eq!(
                    last_observed.map(|o| o.lifecycle_state),
                    Some(LifecycleState::Deploying)
                );
                assert!(last_error.is_none());
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
        assert!((4..=6).contains(&src.polls()));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_waits_on_connected_account_agree() {
        let src = Scripted::new(vec![Step::State("DEPLOYED", "CONNECTED")]);
        let p = policy(5000, 1000);
        let first = wait_until_connected(&src, "acc", &p, &CancellationToken::new()).await;
        let second = wait_until_connected(&src, "acc", &p, &CancellationToken::new()).await;
        assert!(first.is_success());
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_within_one_interval() {
        let src = Scripted::new(vec![Step::State("DEPLOYING", "DISCONNECTED")]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let out = wait_until_connected(&src, "acc", &policy(10_000, 1000), &cancel).await;

        assert!(started.elapsed() < Duration::from_millis(2500));
        match out {
            Outcome::TimedOut {
                polls,
                last_observed,
                cancelled,
                ..
            } => {
                assert!(cancelled);
                assert_eq!(polls, 2);
                assert!(last_observed.is_some());
            }
            other => panic!("expected cancelled TimedOut, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let src = Scripted::new(vec![
            Step::Error,
            Step::Error,
            Step::State("DEPLOYED", "CONNECTED"),
        ]);
        let out = wait_until_connected(&src, "acc", &policy(10_000, 1000), &CancellationToken::new()).await;
        assert!(out.is_success());
        assert_eq!(src.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_at_deadline_folds_into_timeout() {
        let src = Scripted::new(vec![Step::State("DEPLOYING", "DISCONNECTED"), Step::Error]);
        let out = wait_until_connected(&src, "acc", &policy(3000, 1000), &CancellationToken::new()).await;
        match out {
            Outcome::TimedOut { last_error, last_observed, .. } => {
                assert!(last_error.unwrap().contains("503"));
                assert!(last_observed.is_some());
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_account_id_fails_without_polling() {
        let src = Scripted::new(vec![Step::State("DEPLOYED", "CONNECTED")]);
        let out = wait_until_connected(&src, "", &policy(5000, 1000), &CancellationToken::new()).await;
        assert!(matches!(
            out,
            Outcome::Failed { error_code: Some(ref c), .. } if c == "E_EMPTY_ACCOUNT_ID"
        ));
        assert_eq!(src.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connected_requires_both_fields_in_one_snapshot() {
        // DEPLOYED without connection, then connection while still deploying.
        let src = Scripted::new(vec![
            Step::State("DEPLOYED", "DISCONNECTED"),
            Step::State("DEPLOYING", "CONNECTED"),
            Step::State("DEPLOYED", "CONNECTED"),
        ]);
        let out = wait_until_connected(&src, "acc", &policy(10_000, 1000), &CancellationToken::new()).await;
        assert!(out.is_success());
        assert_eq!(src.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn undeployed_condition_waits_for_undeploy() {
        let src = Scripted::new(vec![
            Step::State("UNDEPLOYING", "DISCONNECTED"),
            Step::State("UNDEPLOYED", "DISCONNECTED"),
        ]);
        let out = wait_until(
            &src,
            "acc",
            WaitCondition::undeployed(),
            &policy(10_000, 1000),
            &CancellationToken::new(),
        )
        .await;
        assert!(out.is_success());
        assert_eq!(src.polls(), 2);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let v = serde_json::to_value(Outcome::TimedOut {
            last_observed: None,
            last_error: None,
            polls: 3,
            cancelled: false,
        })
        .unwrap();
        assert_eq!(v["outcome"], "timed_out");
        assert_eq!(v["polls"], 3);
        assert_eq!(v["cancelled"], false);
    }

    #[test]
    fn attempt_records_deadline_from_policy() {
        let attempt = ProvisioningAttempt::new("acc", WaitCondition::connected(), &policy(5000, 1000));
        assert_eq!(attempt.account_id.as_deref(), Some("acc"));
        assert_eq!((attempt.deadline - attempt.started_at).num_milliseconds(), 5000);
        assert!(attempt.observed_state.is_none());
    }

    #[test]
    fn huge_budget_saturates_deadline() {
        let p = PollPolicy {
            max_wait: Duration::from_millis(1_000_000_000_000_000_000),
            interval: Duration::from_secs(1),
        };
        let attempt = ProvisioningAttempt::new("acc", WaitCondition::connected(), &p);
        assert_eq!(attempt.deadline, DateTime::<Utc>::MAX_UTC);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_budget_still_polls() {
        let src = Scripted::new(vec![Step::State("DEPLOYED", "CONNECTED")]);
        let p = PollPolicy {
            max_wait: Duration::from_millis(1_000_000_000_000_000_000),
            interval: Duration::from_secs(1),
        };
        let out = wait_until_connected(&src, "acc", &p, &CancellationToken::new()).await;
        assert!(out.is_success());
        assert_eq!(src.polls(), 1);
    }
}
