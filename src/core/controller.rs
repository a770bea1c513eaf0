//! # LifecycleController: start, supervise and shut down one machine.
//!
//! Owns the machine's [`MachineState`] and the shutdown [`StopAttempt`]
//! counter. Both are mutated only inside [`LifecycleController::run`], a
//! single merge loop that waits on whichever of these fires first:
//!
//! ```text
//!                ┌──────────────── select! ────────────────┐
//!  EventBridge ──┤ completion / state signal               │
//!  StopHandle  ──┤ graceful stop requested (once)          ├──► transition / stop step
//!  deadline    ──┤ backoff elapsed (while stopping)        │
//!  ctx         ──┤ cancelled (only before Stopping)        │
//!                └─────────────────────────────────────────┘
//! ```
//!
//! ## Transitions
//! ```text
//! Created ─start()─► Starting ─Running─► Running ─stop requested─► Stopping ─Stopped─► Stopped
//!                       │  └──────── Stopping/Stopped notification ──►┘
//!                       └─ start completion error ─► Error
//! ```
//!
//! An `Error` notification on the feed is published as
//! [`EventKind::GuestError`] and never moves the state.
//!
//! ## Shutdown loop (one step per backoff interval)
//! ```text
//! step:
//!   ├─► attempts > escalate_after and not yet forced? ─► Machine::stop (once), done
//!   ├─► !can_request_stop()  ─► StopSkipped (legal race), done
//!   └─► attempts += 1; request_stop()
//!         ├─ Ok(true)        ─► StopRequested
//!         └─ Ok(false)/Err   ─► StopAttemptFailed (absorbed)
//! schedule next step after policy.interval
//! ```
//!
//! ## Rules
//! - The first terminal signal from either source wins; the loop exits on it.
//! - Signals still buffered after convergence are drained and, if terminal,
//!   reported as [`EventKind::ReconciliationAnomaly`]. They never change the result.
//! - A start-phase failure is fatal and returned immediately.
//! - Stop-phase failures never produce `Error`; they are published as events.
//! - Cancellation of `ctx` is honoured only before Stopping is entered.

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        bridge::{CompletionSignal, EventBridge, Phase, Signal},
        stop::{StopAttempt, StopHandle},
    },
    error::{StopAttemptError, VmError},
    events::{Bus, Event, EventKind},
    platform::{Machine, MachineState},
    policies::ShutdownPolicy,
};

/// Drives one machine from `start()` to a terminal state.
pub struct LifecycleController<M: Machine> {
    machine: M,
    policy: ShutdownPolicy,
    bus: Bus,
    bridge: EventBridge,
    stop: StopHandle,
    state: MachineState,
    attempts: StopAttempt,
}

impl<M: Machine> LifecycleController<M> {
    /// Creates a controller in [`MachineState::Created`].
    pub fn new(machine: M, policy: ShutdownPolicy, bus: Bus, stop: StopHandle) -> Self {
        Self {
            machine,
            policy,
            bus,
            bridge: EventBridge::new(),
            stop,
            state: MachineState::Created,
            attempts: StopAttempt::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Handle that triggers the graceful shutdown of this controller.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Starts the machine and supervises it until a terminal state.
    ///
    /// Returns `Ok(())` once Stopped is reached, the start error when
    /// Error is reached, or [`VmError::Canceled`] if `ctx` is cancelled before
    /// shutdown begins.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<(), VmError> {
        let bridge = self.bridge.clone();
        let stop = self.stop.clone();

        self.machine.state_changed_notify(bridge.notifier());
        self.bus.publish(Event::new(EventKind::StartRequested));
        self.machine.start(bridge.completion(Phase::Start));
        self.transition(MachineState::Starting);

        let mut next_step: Option<time::Instant> = None;

        let outcome = loop {
            let abandonable = matches!(
                self.state,
                MachineState::Created | MachineState::Starting | MachineState::Running
            );
            let shutdown_armed = next_step.is_none();
            let deadline = next_step.unwrap_or_else(time::Instant::now);

            select! {
                biased;
                signal = bridge.recv() => {
                    if let Some(outcome) = self.on_signal(signal) {
                        break outcome;
                    }
                }
                _ = stop.requested(), if shutdown_armed => {
                    self.begin_shutdown();
                    next_step = Some(time::Instant::now());
                }
                _ = time::sleep_until(deadline), if !shutdown_armed => {
                    self.stop_step();
                    let delay = self.policy.interval;
                    self.bus.publish(
                        Event::new(EventKind::BackoffScheduled)
                            .with_attempt(self.attempts.count())
                            .with_delay(delay),
                    );
                    next_step = Some(time::Instant::now() + delay);
                }
                _ = ctx.cancelled(), if abandonable => {
                    self.bus.publish(
                        Event::new(EventKind::SessionAbandoned).with_state(self.state),
                    );
                    return Err(VmError::Canceled);
                }
            }
        };

        self.drain_late_signals();
        outcome
    }

    fn on_signal(&mut self, signal: Signal) -> Option<Result<(), VmError>> {
        match signal {
            Signal::State(reported) => self.on_state(reported),
            Signal::Completion(done) => self.on_completion(done),
        }
    }

    fn on_state(&mut self, reported: MachineState) -> Option<Result<(), VmError>> {
        match reported {
            MachineState::Created | MachineState::Starting => None,
            MachineState::Running => {
                if self.state == MachineState::Starting {
                    self.transition(MachineState::Running);
                }
                None
            }
            MachineState::Stopping => {
                if self.state != MachineState::Stopping {
                    self.transition(MachineState::Stopping);
                }
                None
            }
            MachineState::Stopped => Some(self.converge_stopped()),
            // Only a start completion decides Error; the feed is just recorded.
            MachineState::Error => {
                self.bus.publish(
                    Event::new(EventKind::GuestError)
                        .with_state(self.state)
                        .with_reason("platform reported error state"),
                );
                None
            }
        }
    }

    fn on_completion(&mut self, done: CompletionSignal) -> Option<Result<(), VmError>> {
        match (done.phase, done.result) {
            (Phase::Start, Ok(())) => {
                self.bus.publish(Event::new(EventKind::StartCompleted));
                None
            }
            (Phase::Start, Err(e)) => {
                self.bus.publish(
                    Event::new(EventKind::StartFailed)
                        .with_phase(Phase::Start)
                        .with_reason(e.to_string()),
                );
                self.transition(MachineState::Error);
                Some(Err(VmError::Start(e)))
            }
            (Phase::Stop, Ok(())) => Some(self.converge_stopped()),
            (Phase::Stop, Err(e)) => {
                let err = StopAttemptError::ForcedStop(e);
                self.bus.publish(
                    Event::new(EventKind::StopAttemptFailed)
                        .with_phase(Phase::Stop)
                        .with_attempt(self.attempts.count())
                        .with_reason(format!("{}: {err}", err.as_label())),
                );
                None
            }
        }
    }

    /// Graceful stop requested by the caller.
    fn begin_shutdown(&mut self) {
        self.attempts.reset();
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_state(self.state));
        if matches!(self.state, MachineState::Starting | MachineState::Running) {
            self.transition(MachineState::Stopping);
        }
    }

    /// One iteration of the graceful-then-forced protocol.
    fn stop_step(&mut self) {
        if self.attempts.should_escalate(&self.policy) {
            self.attempts.mark_forced();
            let since_last = self
                .attempts
                .last_at()
                .map(|at| at.elapsed())
                .unwrap_or_default();
            self.bus.publish(
                Event::new(EventKind::ForcedStopIssued)
                    .with_attempt(self.attempts.count())
                    .with_reason(format!("no terminal state {since_last:?} after last request")),
            );
            self.machine.stop(self.bridge.completion(Phase::Stop));
            return;
        }

        if !self.machine.can_request_stop() {
            self.bus.publish(Event::new(EventKind::StopSkipped));
            return;
        }

        let attempt = self.attempts.record(time::Instant::now());
        let failure = match self.machine.request_stop() {
            Ok(true) => None,
            Ok(false) => Some(StopAttemptError::Declined { attempt }),
            Err(source) => Some(StopAttemptError::Platform { attempt, source }),
        };
        match failure {
            None => self
                .bus
                .publish(Event::new(EventKind::StopRequested).with_attempt(attempt)),
            Some(err) => {
                let escalated = if self.attempts.forced() { " (after escalation)" } else { "" };
                self.bus.publish(
                    Event::new(EventKind::StopAttemptFailed)
                        .with_attempt(attempt)
                        .with_reason(format!("{}: {err}{escalated}", err.as_label())),
                );
            }
        }
    }

    /// Terminal success, entered through Stopping when needed.
    fn converge_stopped(&mut self) -> Result<(), VmError> {
        if self.state != MachineState::Stopping {
            self.transition(MachineState::Stopping);
        }
        self.transition(MachineState::Stopped);
        Ok(())
    }

    fn transition(&mut self, next: MachineState) {
        if !self.state.can_transition_to(next) {
            tracing::debug!(from = %self.state, to = %next, "ignored transition");
            return;
        }
        let prev = std::mem::replace(&mut self.state, next);
        self.bus
            .publish(Event::new(EventKind::StateChanged).with_transition(prev, next));
    }

    fn drain_late_signals(&mut self) {
        while let Some(late) = self.bridge.try_recv() {
            if late.is_terminal() {
                self.bus.publish(
                    Event::new(EventKind::ReconciliationAnomaly)
                        .with_state(self.state)
                        .with_reason(format!("{late:?}")),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Completion, StateNotifier};
    use crate::platform::PlatformError;
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    /// Machine whose callbacks are fired by the test itself.
    #[derive(Default)]
    struct Manual {
        notifier: Mutex<Option<StateNotifier>>,
        start: Mutex<Option<Completion>>,
        forced: Mutex<Option<Completion>>,
        hold_forced: bool,
        requests: AtomicU32,
    }

    impl Machine for std::sync::Arc<Manual> {
        fn start(&self, on_complete: Completion) {
            *self.start.lock().unwrap() = Some(on_complete);
        }
        fn state_changed_notify(&self, notifier: StateNotifier) {
            *self.notifier.lock().unwrap() = Some(notifier);
        }
        fn can_request_stop(&self) -> bool {
            true
        }
        fn request_stop(&self) -> Result<bool, PlatformError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Err(PlatformError::new("guest busy"))
        }
        fn stop(&self, on_complete: Completion) {
            if self.hold_forced {
                *self.forced.lock().unwrap() = Some(on_complete);
            } else {
                on_complete.complete(Ok(()));
            }
        }
    }

    impl Manual {
        fn notify(&self, state: MachineState) {
            self.notifier.lock().unwrap().as_ref().unwrap().notify(state);
        }
        fn complete_start(&self, result: Result<(), PlatformError>) {
            self.start.lock().unwrap().take().unwrap().complete(result);
        }
        fn complete_forced(&self, result: Result<(), PlatformError>) {
            self.forced.lock().unwrap().take().unwrap().complete(result);
        }
    }

    fn count(events: &[Event], kind: EventKind) -> usize {
        events.iter().filter(|e| e.kind == kind).count()
    }

    fn collect(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn transitions(events: &[Event]) -> Vec<MachineState> {
        events
            .iter()
            .filter(|e| e.kind == EventKind::StateChanged)
            .filter_map(|e| e.state)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_error_is_fatal() {
        let machine = std::sync::Arc::new(Manual::default());
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let ctl = LifecycleController::new(
            machine.clone(),
            ShutdownPolicy::default(),
            bus,
            StopHandle::new(),
        );
        let run = tokio::spawn(ctl.run(CancellationToken::new()));
        tokio::task::yield_now().await;

        machine.complete_start(Err(PlatformError::new("no entitlement")));
        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, VmError::Start(ref e) if e.message() == "no entitlement"));
        assert_eq!(
            transitions(&collect(&mut rx)),
            vec![MachineState::Starting, MachineState::Error]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_start_error_does_not_override_stopped() {
        let machine = std::sync::Arc::new(Manual::default());
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let ctl = LifecycleController::new(
            machine.clone(),
            ShutdownPolicy::default(),
            bus,
            StopHandle::new(),
        );
        let run = tokio::spawn(ctl.run(CancellationToken::new()));
        tokio::task::yield_now().await;

        machine.notify(MachineState::Stopped);
        assert!(run.await.unwrap().is_ok());
        machine.complete_start(Err(PlatformError::new("too late")));

        let events = collect(&mut rx);
        assert_eq!(
            transitions(&events),
            vec![
                MachineState::Starting,
                MachineState::Stopping,
                MachineState::Stopped
            ]
        );
        assert!(events.iter().all(|e| e.kind != EventKind::StartFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_errors_escalate_without_failing() {
        let machine = std::sync::Arc::new(Manual::default());
        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let stop = StopHandle::new();
        let ctl = LifecycleController::new(
            machine.clone(),
            ShutdownPolicy::default(),
            bus,
            stop.clone(),
        );
        let run = tokio::spawn(ctl.run(CancellationToken::new()));
        tokio::task::yield_now().await;
        machine.complete_start(Ok(()));
        machine.notify(MachineState::Running);
        tokio::task::yield_now().await;

        stop.request_graceful_stop();
        assert!(run.await.unwrap().is_ok());

        let events = collect(&mut rx);
        assert_eq!(machine.requests.load(Ordering::SeqCst), 4);
        let failed = events
            .iter()
            .filter(|e| e.kind == EventKind::StopAttemptFailed)
            .count();
        assert_eq!(failed, 4);
        let forced = events
            .iter()
            .filter(|e| e.kind == EventKind::ForcedStopIssued)
            .count();
        assert_eq!(forced, 1);
        assert_eq!(transitions(&events).last(), Some(&MachineState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_stopping_abandons() {
        let machine = std::sync::Arc::new(Manual::default());
        let ctx = CancellationToken::new();
        let ctl = LifecycleController::new(
            machine.clone(),
            ShutdownPolicy::default(),
            Bus::new(16),
            StopHandle::new(),
        );
        let run = tokio::spawn(ctl.run(ctx.clone()));
        tokio::task::yield_now().await;
        machine.notify(MachineState::Running);
        tokio::task::yield_now().await;

        ctx.cancel();
        assert!(run.await.unwrap().unwrap_err().is_canceled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_report_while_starting_defers_to_completion() {
        let machine = std::sync::Arc::new(Manual::default());
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let ctl = LifecycleController::new(
            machine.clone(),
            ShutdownPolicy::default(),
            bus,
            StopHandle::new(),
        );
        let run = tokio::spawn(ctl.run(CancellationToken::new()));
        tokio::task::yield_now().await;

        machine.complete_start(Ok(()));
        tokio::task::yield_now().await;
        machine.notify(MachineState::Error);
        tokio::task::yield_now().await;
        assert!(!run.is_finished());

        machine.notify(MachineState::Stopped);
        assert!(run.await.unwrap().is_ok());

        let events = collect(&mut rx);
        assert_eq!(count(&events, EventKind::GuestError), 1);
        assert_eq!(count(&events, EventKind::StartFailed), 0);
        assert_eq!(
            transitions(&events),
            vec![
                MachineState::Starting,
                MachineState::Stopping,
                MachineState::Stopped
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_report_while_running_is_not_terminal() {
        let machine = std::sync::Arc::new(Manual::default());
        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let stop = StopHandle::new();
        let ctl = LifecycleController::new(
            machine.clone(),
            ShutdownPolicy::default(),
            bus,
            stop.clone(),
        );
        let run = tokio::spawn(ctl.run(CancellationToken::new()));
        tokio::task::yield_now().await;
        machine.complete_start(Ok(()));
        machine.notify(MachineState::Running);
        tokio::task::yield_now().await;

        machine.notify(MachineState::Error);
        tokio::task::yield_now().await;
        assert!(!run.is_finished());

        stop.request_graceful_stop();
        assert!(run.await.unwrap().is_ok());

        let events = collect(&mut rx);
        assert_eq!(count(&events, EventKind::GuestError), 1);
        let states = transitions(&events);
        assert!(!states.contains(&MachineState::Error));
        assert_eq!(states.last(), Some(&MachineState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_error_after_running_is_fatal() {
        let machine = std::sync::Arc::new(Manual::default());
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let ctl = LifecycleController::new(
            machine.clone(),
            ShutdownPolicy::default(),
            bus,
            StopHandle::new(),
        );
        let run = tokio::spawn(ctl.run(CancellationToken::new()));
        tokio::task::yield_now().await;
        machine.notify(MachineState::Running);
        tokio::task::yield_now().await;

        machine.complete_start(Err(PlatformError::new("lost entitlement")));
        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, VmError::Start(ref e) if e.message() == "lost entitlement"));
        assert_eq!(
            transitions(&collect(&mut rx)),
            vec![
                MachineState::Starting,
                MachineState::Running,
                MachineState::Error
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_terminal_signal_is_reported_not_applied() {
        let machine = std::sync::Arc::new(Manual {
            hold_forced: true,
            ..Manual::default()
        });
        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let stop = StopHandle::new();
        let ctl = LifecycleController::new(
            machine.clone(),
            ShutdownPolicy::default(),
            bus,
            stop.clone(),
        );
        let run = tokio::spawn(ctl.run(CancellationToken::new()));
        tokio::task::yield_now().await;
        machine.complete_start(Ok(()));
        machine.notify(MachineState::Running);
        tokio::task::yield_now().await;

        stop.request_graceful_stop();
        while machine.forced.lock().unwrap().is_none() {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }

        // Both buffered before the loop polls again.
        machine.complete_forced(Ok(()));
        machine.notify(MachineState::Stopped);
        assert!(run.await.unwrap().is_ok());

        let events = collect(&mut rx);
        assert_eq!(count(&events, EventKind::ReconciliationAnomaly), 1);
        let states = transitions(&events);
        assert_eq!(states.last(), Some(&MachineState::Stopped));
        assert_eq!(
            states.iter().filter(|s| **s == MachineState::Stopped).count(),
            1
        );
    }
}
