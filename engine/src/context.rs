//! Cancellation shared by every worker of a run.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;

use crate::core::delay::millis;

/// Cancellable context handed to validators and middleware.
///
/// Clones share one cancellation flag. Once cancelled, a context stays
/// cancelled.
#[derive(Debug, Clone)]
pub struct RunContext {
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(tx),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives as long as `self`, so the only exit is the flag flipping.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Cancel after `timeout`. Must be called within a tokio runtime.
    ///
    /// The timer holds no strong reference, so dropping every clone of the
    /// context lets the timer task finish without effect.
    pub fn cancel_after(&self, timeout: Duration) {
        let weak: Weak<watch::Sender<bool>> = Arc::downgrade(&self.cancelled);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(tx) = weak.upgrade() {
                tracing::debug!(
                    timeout_ms = millis(timeout),
                    "run context deadline reached"
                );
                tx.send_replace(true);
            }
        });
    }
}
