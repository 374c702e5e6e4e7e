//! Single-fire stop signal shared by the player and the interrupt watcher

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Cancellation flag scoped to one speaking phase
///
/// Clones observe the same flag. It can be polled with [`StopSignal::is_set`]
/// or awaited with [`StopSignal::wait`], and it is set at most once.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    fired: Arc<AtomicBool>,
    token: CancellationToken,
}

impl StopSignal {
    /// Create an unset signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal, waking every waiter
    ///
    /// Returns `true` only for the call that actually set it.
    pub fn set(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::SeqCst);
        if first {
            self.token.cancel();
        }
        first
    }

    /// Whether the signal has been set
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the signal is set
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
