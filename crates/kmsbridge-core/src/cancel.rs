//! Awaitable cancellation token.
//!
//! Shutdown is requested from a signal handler and observed by the accept loop
//! and by every in-flight call, so the token must be both pollable and
//! awaitable. State lives in a `tokio::sync::watch` channel.

use std::sync::Arc;
use tokio::sync::watch;

/// A cancellation token shared across tasks.
///
/// Cloning shares state: `cancel()` on any clone is observed by all of them,
/// including tasks already parked in [`CancellationToken::cancelled`].
///
/// # Example
///
/// ```
/// use kmsbridge_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
///
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Create a new, not yet cancelled token.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until cancellation is requested.
    ///
    /// Returns immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender is owned by `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
