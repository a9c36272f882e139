//! Deadlines layered on top of cancellation tokens.
//!
//! A deadline never drops the guarded future. When the timer fires the child
//! token is cancelled and the future is awaited to completion, so whatever
//! graceful shutdown it performs on cancellation still runs.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Outcome of [`run_with_deadline`].
#[derive(Debug)]
pub struct Deadlined<T> {
    pub value: T,
    /// True when the timer fired before the future completed on its own.
    pub timed_out: bool,
}

/// Runs `f` with a child of `parent` that is cancelled after `timeout`.
///
/// Cancelling `parent` also cancels the child, but is not reported as a
/// timeout.
pub async fn run_with_deadline<F, Fut, T>(
    parent: &CancellationToken,
    timeout: Duration,
    f: F,
) -> Deadlined<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let child = parent.child_token();
    let fut = f(child.clone());
    tokio::pin!(fut);

    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(sleep);

    tokio::select! {
        biased;
        value = &mut fut => return Deadlined { value, timed_out: false },
        _ = &mut sleep => child.cancel(),
    }

    Deadlined {
        value: fut.await,
        timed_out: true,
    }
}
