//! Cooperative Cancellation
//!
//! A session-level cancellation pair. The source side flips the flag; token
//! holders race `cancelled()` against their provider/bridge awaits so an
//! in-flight external call is dropped rather than leaked.

use tokio::sync::watch;

/// Create a linked cancellation source/token pair
pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

/// The cancelling side, held by the caller that owns the run
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Request cancellation of the run
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// The observing side, cloned into workers and bridges
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that never fires (for callers without a cancel source)
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the token's lifetime
        std::mem::forget(tx);
        Self { rx }
    }

    /// Check without waiting
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // wait_for returns immediately if already true; a closed channel
        // with the flag unset means the source was dropped without
        // cancelling, so never resolve.
        if rx.wait_for(|v| *v).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_flips_token() {
        let (source, token) = cancel_pair();
        assert!(!token.is_cancelled());
        source.cancel();
        assert!(token.is_cancelled());
        // resolves promptly once cancelled
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_token_does_not_fire() {
        let token = CancelToken::never();
        let raced = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(raced.is_err());
    }
}
