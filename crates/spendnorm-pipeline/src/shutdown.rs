//! Cooperative cancellation for in-flight runs.
//!
//! The server triggers the signal on SIGTERM/Ctrl-C; the runner stops
//! launching transforms and skips the canonical write, then finalizes the
//! run as failed so the window is retried by the next run.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Creates a connected trigger/signal pair.
#[must_use]
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even when every receiver is gone.
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    /// A signal that never fires, for one-shot CLI runs.
    #[must_use]
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            // Trigger dropped without firing: nothing will ever fire.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn trigger_is_seen_by_every_clone() {
        let (trigger, signal) = shutdown_channel();
        let other = signal.clone();
        assert!(!signal.is_triggered());

        trigger.trigger();

        assert!(signal.is_triggered());
        assert!(other.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), other.triggered())
            .await
            .expect("triggered should resolve");
    }

    #[tokio::test]
    async fn never_does_not_fire() {
        let signal = ShutdownSignal::never();
        assert!(!signal.is_triggered());
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.triggered()).await;
        assert!(waited.is_err());
    }
}
