//! Cooperative cancellation for a recording run.
//!
//! A [`CancelHandle`] is held by whoever may abort the run (a signal handler,
//! a test); every [`Cancellation`] clone observes it. Cancelling is sticky.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/observer pair.
pub fn channel() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Cancellation {
    /// A cancellation that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested. Never resolves if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (handle, cancellation) = channel();
        assert!(!cancellation.is_cancelled());
        let waiter = tokio::spawn({
            let cancellation = cancellation.clone();
            async move { cancellation.cancelled().await }
        });
        handle.cancel();
        waiter.await.unwrap();
        assert!(cancellation.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_never_fires() {
        let (handle, cancellation) = channel();
        drop(handle);
        let fired = tokio::time::timeout(Duration::from_secs(60), cancellation.cancelled()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let (handle, cancellation) = channel();
        handle.cancel();
        cancellation.cancelled().await;
    }
}
