use crate::output::{print_fields, print_json};
use crate::settings::Globals;
use copylink_core::poller::{self, Outcome};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn run(
    globals: &Globals,
    account_id: &str,
    max_wait_secs: Option<u64>,
    interval_ms: Option<u64>,
) -> anyhow::Result<()> {
    let config = globals.valid_config()?;
    let mut policy = config.poll_policy();
    if let Some(secs) = max_wait_secs {
        policy.max_wait = Duration::from_secs(secs);
        if policy.max_wait > poller::MAX_WAIT_LIMIT {
            anyhow::bail!(
                "--max-wait must be at most {} seconds",
                poller::MAX_WAIT_LIMIT.as_secs()
            );
        }
    }
    if let Some(ms) = interval_ms {
        if ms == 0 {
            anyhow::bail!("--interval must be greater than zero");
        }
        policy.interval = Duration::from_millis(ms);
    }
    let providers = super::http_providers(&config)?;

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });
        poller::wait_until_connected(providers.provisioning.as_ref(), account_id, &policy, &cancel)
            .await
    });

    if globals.json {
        print_json(&outcome)?;
    } else {
        print_outcome(account_id, &outcome);
    }

    if !outcome.is_success() {
        anyhow::bail!("account {account_id} did not connect");
    }
    Ok(())
}

fn print_outcome(account_id: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Connected {
            lifecycle_state,
            connection_status,
        } => print_fields(&[
            ("account", account_id.to_string()),
            ("outcome", "connected".to_string()),
            ("state", lifecycle_state.to_string()),
            ("connection", connection_status.to_string()),
        ]),
        Outcome::Failed {
            lifecycle_state,
            error_code,
            ..
        } => print_fields(&[
            ("account", account_id.to_string()),
            ("outcome", "failed".to_string()),
            ("state", display_or_dash(lifecycle_state.as_ref())),
            ("error", display_or_dash(error_code.as_ref())),
        ]),
        Outcome::TimedOut {
            last_observed,
            last_error,
            polls,
            cancelled,
        } => print_fields(&[
            ("account", account_id.to_string()),
            (
                "outcome",
                if *cancelled { "cancelled" } else { "timed out" }.to_string(),
            ),
            ("polls", polls.to_string()),
            (
                "last state",
                display_or_dash(last_observed.as_ref().map(|o| &o.lifecycle_state)),
            ),
            ("last error", display_or_dash(last_error.as_ref())),
        ]),
    }
}

fn display_or_dash<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
