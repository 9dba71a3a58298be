//! A one-shot, multi-consumer shutdown signal.
//!
//! Cloning a [`ShutdownSignal`] and calling [`ShutdownSignal::recv`] from any
//! number of tasks lets them all wake up exactly once, in any order, when
//! [`ShutdownSignal::send`] is called. Unlike a broadcast channel, consumers
//! that subscribe after `send` was called still observe it immediately,
//! since the closed state is sticky.

use std::sync::Arc;

use tokio::sync::Semaphore;

// `Semaphore::close()` wakes every pending and future `acquire()` with
// `Closed`, which is exactly the "already happened" semantics we want.
const MAX_PERMITS: usize = Semaphore::MAX_PERMITS;

#[derive(Clone)]
pub struct ShutdownSignal {
    semaphore: Arc<Semaphore>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(MAX_PERMITS)),
        }
    }

    /// Signal shutdown to every current and future receiver. Idempotent.
    pub fn send(&self) {
        self.semaphore.close();
    }

    /// Resolves once [`ShutdownSignal::send`] has been called, possibly
    /// already before this call.
    pub async fn recv(&self) {
        // `acquire` on a closed semaphore returns `Err(Closed)` immediately;
        // a fresh, open semaphore never hands out a permit here since we
        // never call `add_permits`, so this only resolves via `close()`.
        let _ = self.semaphore.acquire().await;
    }

    pub fn is_shutdown(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn recv_resolves_after_send() {
        let signal = ShutdownSignal::new();
        let rx = signal.clone();

        let task = tokio::spawn(async move {
            rx.recv().await;
        });

        assert!(!signal.is_shutdown());
        signal.send();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("recv should resolve promptly")
            .unwrap();
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn late_subscriber_sees_already_sent_signal() {
        let signal = ShutdownSignal::new();
        signal.send();
        let late = signal.clone();
        tokio::time::timeout(Duration::from_millis(100), late.recv())
            .await
            .expect("late recv should not block");
    }
}
