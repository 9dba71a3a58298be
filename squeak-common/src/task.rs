//! A named, traced wrapper around [`tokio::task::JoinHandle`].
//!
//! Every long-running task in the node (the peer listener, each peer
//! connection, the invoice-settlement loop, the offer-expiry sweeper) is
//! spawned via [`SqTask::spawn`] rather than bare `tokio::spawn`, so a panic
//! or early exit shows up in the logs with the task's name instead of
//! silently vanishing.

use std::{future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument, Span};

pub struct SqTask<T> {
    name: &'static str,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> SqTask<T> {
    /// Spawn a task under the current tracing span, tagged with `name`.
    pub fn spawn(
        name: &'static str,
        future: impl Future<Output = T> + Send + 'static,
    ) -> Self {
        Self::spawn_with_span(name, Span::current(), future)
    }

    pub fn spawn_with_span(
        name: &'static str,
        span: Span,
        future: impl Future<Output = T> + Send + 'static,
    ) -> Self {
        let handle = tokio::spawn(future.instrument(span));
        Self { name, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Await task completion, logging (but not propagating) a panic.
    pub async fn join(self) -> Option<T> {
        match AssertUnwindSafe(self.handle).catch_unwind().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(join_err)) if join_err.is_cancelled() => {
                info!(task = self.name, "task cancelled");
                None
            }
            Ok(Err(join_err)) => {
                error!(task = self.name, error = %join_err, "task panicked");
                None
            }
            Err(_) => {
                error!(task = self.name, "task panicked while unwinding");
                None
            }
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Join every task in `tasks`, logging each one's outcome, then return once
/// all have finished. Used at shutdown to wait for a clean drain instead of
/// dropping tasks mid-flight.
pub async fn join_all<T: Send + 'static>(tasks: Vec<SqTask<T>>) {
    for task in tasks {
        let name = task.name();
        info!(task = name, "waiting for task to finish");
        task.join().await;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn join_returns_value_on_success() {
        let task = SqTask::spawn("test-task", async { 42 });
        assert_eq!(task.join().await, Some(42));
    }

    #[tokio::test]
    async fn join_returns_none_on_panic() {
        let task: SqTask<()> =
            SqTask::spawn("panicking-task", async { panic!("boom") });
        assert_eq!(task.join().await, None);
    }
}
