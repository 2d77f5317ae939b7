use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::BillingError;

/// Consecutive failures before the circuit opens
pub(crate) const FAILURE_THRESHOLD: u32 = 3;

/// How long the circuit stays open before a probe is let through
pub(crate) const RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Short-circuits ledger calls while the remote ledger keeps failing
///
/// Clones share state, so every handle to one ledger sees the same circuit.
#[derive(Clone)]
pub(crate) struct CircuitBreaker {
    inner: Arc<Inner>,
}

struct Inner {
    threshold: u32,
    recovery: Duration,
    consecutive_failures: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub(crate) fn new(threshold: u32, recovery: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                threshold,
                recovery,
                consecutive_failures: AtomicU32::new(0),
                opened_at: Mutex::new(None),
            }),
        }
    }

    /// Whether a call may proceed
    ///
    /// # Errors
    ///
    /// Returns `BillingError::CircuitOpen` while the circuit is open and the
    /// recovery window has not elapsed
    pub(crate) fn check(&self) -> Result<(), BillingError> {
        let opened_at = self.inner.opened_at.lock().unwrap_or_else(|e| e.into_inner());

        match *opened_at {
            Some(ts) if ts.elapsed() < self.inner.recovery => Err(BillingError::CircuitOpen),
            _ => Ok(()),
        }
    }

    pub(crate) fn record_success(&self) {
        self.inner.consecutive_failures.store(0, Ordering::Relaxed);
        *self.inner.opened_at.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Count a failure; opens (or re-opens) the circuit at the threshold
    pub(crate) fn record_failure(&self) {
        let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        if failures >= self.inner.threshold {
            *self.inner.opened_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(FAILURE_THRESHOLD, RECOVERY_TIMEOUT)
    }
}
