//! # LogWriter - tracing-backed event printer
//!
//! A subscriber that renders every [`Event`] through `tracing` with structured
//! fields. Severity follows the kind: failures at `error`, shutdown hiccups at
//! `warn`, transitions at `info`, pacing at `debug`.
//!
//! ## Example output
//! ```text
//! INFO  vmvisor: state-changed from=starting to=running
//! INFO  vmvisor: stop-requested attempt=1
//! DEBUG vmvisor: backoff-scheduled attempt=1 delay_ms=3000
//! WARN  vmvisor: forced-stop-issued attempt=4
//! INFO  vmvisor: state-changed from=stopping to=stopped
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let kind = e.kind.as_str();
        let reason = e.reason.as_deref().unwrap_or_default();
        let state = e.state.map(|s| s.as_str()).unwrap_or_default();
        match e.kind {
            EventKind::StateChanged => {
                let from = e.previous.map(|s| s.as_str()).unwrap_or_default();
                info!(seq = e.seq, from, to = state, "{kind}");
            }
            EventKind::DescriptorReady
            | EventKind::StartRequested
            | EventKind::StartCompleted
            | EventKind::ShutdownRequested => {
                info!(seq = e.seq, reason, "{kind}");
            }
            EventKind::StopRequested => {
                info!(seq = e.seq, attempt = e.attempt, "{kind}");
            }
            EventKind::BackoffScheduled => {
                debug!(seq = e.seq, attempt = e.attempt, delay_ms = e.delay_ms, "{kind}");
            }
            EventKind::StopSkipped => {
                debug!(seq = e.seq, "{kind}");
            }
            EventKind::StopAttemptFailed | EventKind::ForcedStopIssued => {
                warn!(seq = e.seq, attempt = e.attempt, reason, "{kind}");
            }
            EventKind::SessionAbandoned => {
                warn!(seq = e.seq, reason, "{kind}");
            }
            EventKind::StartFailed | EventKind::GuestError | EventKind::ReconciliationAnomaly => {
                error!(seq = e.seq, state, reason, "{kind}");
            }
            EventKind::SessionFinished => match e.reason.as_deref() {
                Some(label) => error!(seq = e.seq, error = label, "{kind}"),
                None => info!(seq = e.seq, "{kind}"),
            },
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
