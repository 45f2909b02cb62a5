pub mod accounts;
pub mod health;
pub mod link;
pub mod subscribers;

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Run `work` on its own task, cancelling `token` if the handler is dropped.
///
/// A client disconnect drops the handler future. The spawned task keeps
/// running, sees the cancelled token and finishes its own cleanup.
pub(crate) async fn run_detached<F, Fut, T>(token: CancellationToken, work: F) -> Result<T, AppError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let _guard = token.clone().drop_guard();
    Ok(tokio::spawn(work(token)).await?)
}
