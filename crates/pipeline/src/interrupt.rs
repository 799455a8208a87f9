//! Shared barge-in signal
//!
//! One `Interrupt` is shared by the supervisor, the reasoning loop and both
//! pipeline tasks. Raising it is idempotent; the long-lived tasks clone the
//! current token each iteration, so a raise is observed at their next await
//! point. The supervisor re-arms it at the start of every turn.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Mutex<CancellationToken>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every holder of the current token
    pub fn raise(&self) {
        self.inner.lock().cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.inner.lock().is_cancelled()
    }

    /// Clone of the current token, for `select!`-style observation
    pub fn watch(&self) -> CancellationToken {
        self.inner.lock().clone()
    }

    /// Replace a raised token with a fresh one; no-op if not raised
    pub fn rearm(&self) {
        let mut token = self.inner.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_is_idempotent() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        interrupt.raise();
        assert!(interrupt.is_raised());
    }

    #[test]
    fn test_rearm_resets() {
        let interrupt = Interrupt::new();
        let before = interrupt.watch();

        interrupt.raise();
        interrupt.rearm();

        assert!(!interrupt.is_raised());
        assert!(before.is_cancelled());
        assert!(!interrupt.watch().is_cancelled());
    }

    #[tokio::test]
    async fn test_watchers_observe_raise() {
        let interrupt = Interrupt::new();
        let token = interrupt.watch();
        interrupt.raise();
        token.cancelled().await;
    }
}
