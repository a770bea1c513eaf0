//! Stop attempt bookkeeping and the caller-side stop handle.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::policies::ShutdownPolicy;

/// Counter of graceful stop attempts within one shutdown sequence.
///
/// Owned and mutated only by the lifecycle controller.
#[derive(Debug, Default)]
pub(crate) struct StopAttempt {
    count: u32,
    last_at: Option<Instant>,
    forced: bool,
}

impl StopAttempt {
    /// Starts a new shutdown sequence.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records an issued graceful request and returns its 1-based number.
    pub(crate) fn record(&mut self, now: Instant) -> u32 {
        self.count = self.count.saturating_add(1);
        self.last_at = Some(now);
        self.count
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    pub(crate) fn last_at(&self) -> Option<Instant> {
        self.last_at
    }

    /// True exactly once per sequence: past the threshold and not yet forced.
    pub(crate) fn should_escalate(&self, policy: &ShutdownPolicy) -> bool {
        !self.forced && policy.should_escalate(self.count)
    }

    pub(crate) fn mark_forced(&mut self) {
        self.forced = true;
    }

    pub(crate) fn forced(&self) -> bool {
        self.forced
    }
}

/// Caller handle that asks a running session to shut down gracefully.
///
/// Cloneable; the first request wins and later ones are no-ops.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues `requestGracefulStop`: the controller enters Stopping and starts the stop loop.
    pub fn request_graceful_stop(&self) {
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once a stop has been requested.
    pub async fn requested(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_fires_once() {
        let policy = ShutdownPolicy::default();
        let mut attempts = StopAttempt::default();
        let now = Instant::now();
        for _ in 0..3 {
            attempts.record(now);
        }
        assert!(!attempts.should_escalate(&policy));

        assert_eq!(attempts.record(now), 4);
        assert!(attempts.should_escalate(&policy));
        attempts.mark_forced();
        attempts.record(now);
        assert!(!attempts.should_escalate(&policy));
        assert!(attempts.forced());
    }

    #[test]
    fn test_reset_clears_sequence() {
        let mut attempts = StopAttempt::default();
        attempts.record(Instant::now());
        attempts.mark_forced();
        attempts.reset();
        assert_eq!(attempts.count(), 0);
        assert!(attempts.last_at().is_none());
        assert!(!attempts.forced());
    }

    #[test]
    fn test_stop_handle_is_shared() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        clone.request_graceful_stop();
        assert!(handle.is_requested());
    }
}
