//! Unified cancellation for one relayed response

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken as AbortSignal;

/// Reports whether the client transport is still connected
pub type ConnectionProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Folds an explicit abort signal and a connection probe into one check
///
/// Cancellation latches: once [`is_cancelled`](Self::is_cancelled) has
/// returned `true` it keeps returning `true`, even if the probe later
/// reports a live connection again. Clones share the latch.
#[derive(Clone, Default)]
pub struct CancellationToken {
    abort: AbortSignal,
    probe: Option<ConnectionProbe>,
    latched: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also cancels once `probe` reports a closed connection
    pub fn with_probe(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            probe: Some(Arc::new(probe)),
            ..Self::default()
        }
    }

    /// Signal an explicit abort
    pub fn abort(&self) {
        self.abort.cancel();
        self.latched.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.latched.load(Ordering::Acquire) {
            return true;
        }

        let cancelled = self.abort.is_cancelled() || self.probe.as_ref().is_some_and(|connected| !connected());
        if cancelled {
            self.latched.store(true, Ordering::Release);
        }
        cancelled
    }

    /// Completes when [`abort`](Self::abort) is called
    ///
    /// The connection probe is poll-only and does not wake this future.
    pub async fn aborted(&self) {
        self.abort.cancelled().await;
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("aborted", &self.abort.is_cancelled())
            .field("has_probe", &self.probe.is_some())
            .field("latched", &self.latched.load(Ordering::Relaxed))
            .finish()
    }
}
