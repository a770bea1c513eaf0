//! # Graceful-then-forced shutdown policy.
//!
//! ```text
//! attempt 1 ─ interval ─ attempt 2 ─ interval ─ attempt 3 ─ interval ─ attempt 4 ─ interval ─► forced stop (once)
//!                                                                      count > escalate_after
//! ```
//!
//! The interval is fixed: every step waits the same [`ShutdownPolicy::interval`].

use std::time::Duration;

/// Default pause between two stop steps.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Default number of graceful attempts tolerated before escalation.
pub const DEFAULT_ESCALATE_AFTER: u32 = 3;

/// Pacing and escalation of the shutdown loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Pause between stop steps.
    pub interval: Duration,
    /// A forced stop is issued once the attempt counter exceeds this value.
    pub escalate_after: u32,
}

impl Default for ShutdownPolicy {
    /// 3s between steps, escalation after 3 graceful attempts.
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            escalate_after: DEFAULT_ESCALATE_AFTER,
        }
    }
}

impl ShutdownPolicy {
    /// Returns `true` once `attempts` is past the escalation threshold.
    #[inline]
    pub fn should_escalate(&self, attempts: u32) -> bool {
        attempts > self.escalate_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalates_only_past_threshold() {
        let policy = ShutdownPolicy::default();
        assert!(!policy.should_escalate(0));
        assert!(!policy.should_escalate(3));
        assert!(policy.should_escalate(4));
    }

    #[test]
    fn test_zero_threshold_escalates_after_first_attempt() {
        let policy = ShutdownPolicy {
            escalate_after: 0,
            ..ShutdownPolicy::default()
        };
        assert!(!policy.should_escalate(0));
        assert!(policy.should_escalate(1));
    }
}
