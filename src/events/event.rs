//! # Session events emitted by the controller and the session.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Lifecycle events**: state transitions and start outcome
//! - **Shutdown events**: graceful requests, skips, failures, escalation
//! - **Session events**: descriptor readiness, abandonment, completion
//!
//! Subscriber overflow and panics are not events; [`SubscriberSet`](crate::SubscriberSet)
//! logs them through `tracing` directly.
//!
//! The [`Event`] struct carries additional metadata such as timestamps, state,
//! attempt counters, backoff delays and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use vmvisor::{Event, EventKind, MachineState};
//!
//! let ev = Event::new(EventKind::StateChanged)
//!     .with_transition(MachineState::Running, MachineState::Stopping);
//!
//! assert_eq!(ev.kind, EventKind::StateChanged);
//! assert_eq!(ev.state, Some(MachineState::Stopping));
//! assert_eq!(ev.previous, Some(MachineState::Running));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::Phase;
use crate::platform::MachineState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of session events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Session events ===
    /// Descriptor assembled and validated.
    ///
    /// Sets:
    /// - `reason`: one-line device summary
    DescriptorReady,

    /// Caller cancelled the session before shutdown began.
    SessionAbandoned,

    /// Session returned.
    ///
    /// Sets:
    /// - `reason`: error label, absent on success
    SessionFinished,

    // === Lifecycle events ===
    /// Controller moved between states.
    ///
    /// Sets:
    /// - `previous`: state left
    /// - `state`: state entered
    StateChanged,

    /// Start issued to the platform.
    StartRequested,

    /// Start completion arrived without error.
    StartCompleted,

    /// Start completion carried an error (fatal).
    ///
    /// Sets:
    /// - `reason`: platform error
    StartFailed,

    /// Platform reported its error state.
    ///
    /// Sets:
    /// - `state`: controller state when it was reported
    GuestError,

    // === Shutdown events ===
    /// Graceful stop requested by the caller (stop handle or OS signal).
    ShutdownRequested,

    /// Graceful stop request delivered.
    ///
    /// Sets:
    /// - `attempt`: attempt number (1-based)
    StopRequested,

    /// `can_request_stop` answered false; attempt skipped.
    StopSkipped,

    /// A graceful attempt or the forced stop failed (non-fatal).
    ///
    /// Sets:
    /// - `attempt`: attempt number, if any
    /// - `phase`: `Stop`
    /// - `reason`: error text
    StopAttemptFailed,

    /// Forced stop issued after the escalation threshold.
    ///
    /// Sets:
    /// - `attempt`: attempt counter at escalation
    ForcedStopIssued,

    /// Next stop step scheduled.
    ///
    /// Sets:
    /// - `attempt`: attempts so far
    /// - `delay_ms`: delay before the next step
    BackoffScheduled,

    /// A second terminal signal was observed after convergence.
    ///
    /// Sets:
    /// - `state`: state the session converged to
    /// - `reason`: the late signal
    ReconciliationAnomaly,
}

impl EventKind {
    /// Returns a short stable label (kebab-case) for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DescriptorReady => "descriptor-ready",
            EventKind::SessionAbandoned => "session-abandoned",
            EventKind::SessionFinished => "session-finished",
            EventKind::StateChanged => "state-changed",
            EventKind::StartRequested => "start-requested",
            EventKind::StartCompleted => "start-completed",
            EventKind::StartFailed => "start-failed",
            EventKind::GuestError => "guest-error",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::StopRequested => "stop-requested",
            EventKind::StopSkipped => "stop-skipped",
            EventKind::StopAttemptFailed => "stop-attempt-failed",
            EventKind::ForcedStopIssued => "forced-stop-issued",
            EventKind::BackoffScheduled => "backoff-scheduled",
            EventKind::ReconciliationAnomaly => "reconciliation-anomaly",
        }
    }
}

/// Session event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// State entered (or current state for non-transition events).
    pub state: Option<MachineState>,
    /// State left, for [`EventKind::StateChanged`].
    pub previous: Option<MachineState>,
    /// Completion phase the event relates to.
    pub phase: Option<Phase>,
    /// Stop attempt counter (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay before the next stop step in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            state: None,
            previous: None,
            phase: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_state(mut self, state: MachineState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches both ends of a transition.
    #[inline]
    pub fn with_transition(mut self, from: MachineState, to: MachineState) -> Self {
        self.previous = Some(from);
        self.state = Some(to);
        self
    }

    #[inline]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// True for events that report a shutdown step that did not go through.
    #[inline]
    pub fn is_stop_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::StopAttemptFailed | EventKind::StopSkipped
        )
    }
}
