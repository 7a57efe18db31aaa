//! Cooperative run cancellation.

use tokio::sync::watch;

/// Creates a linked handle/signal pair. The handle side requests
/// cancellation; the signal side is given to a running harness.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// Requests cancellation of the run holding the paired [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation. Idempotent; a dropped signal side is fine.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observes a cancellation request at the harness's suspension points.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires, for runs without external cancellation.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves when cancellation is requested. Pends forever on a
    /// never-signal or when the handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            futures::future::pending::<()>().await;
            unreachable!()
        };
        if *rx.borrow() {
            return;
        }
        loop {
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling; nothing can fire now.
                futures::future::pending::<()>().await;
            }
            if *rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_fires_waiting_signal() {
        let (handle, mut signal) = cancel_pair();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
        });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() must resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_before_wait_resolves_immediately() {
        let (handle, mut signal) = cancel_pair();
        handle.cancel();
        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_millis(50), signal.cancelled())
            .await
            .expect("already-cancelled signal must resolve");
    }

    #[tokio::test]
    async fn never_signal_pends() {
        let mut signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let outcome =
            tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn dropped_handle_without_cancel_pends() {
        let (handle, mut signal) = cancel_pair();
        drop(handle);
        let outcome =
            tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(outcome.is_err());
    }
}
