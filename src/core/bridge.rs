//! # EventBridge: two capacity-1 signal sources.
//!
//! The platform delivers lifecycle information two ways: a one-shot
//! completion callback per start/stop request, and a continuous push feed of
//! state changes. The bridge turns both into consumable sources.
//!
//! ```text
//!  Machine::start(Completion)  ─► Completion::complete(res) ─► [slot: CompletionSignal] ─┐
//!  Machine::stop(Completion)   ─► Completion::complete(res) ─┘                           ├─► recv() ─► controller
//!  StateNotifier::notify(state) ───────────────────────────► [slot: MachineState] ───────┘
//! ```
//!
//! ## Rules
//! - Each slot holds **at most one** unread value; producers never block.
//! - A newer value replaces an unread one, **except** that an unread terminal
//!   value is never replaced by a non-terminal one.
//! - Order is preserved within a source; none is promised across sources.
//! - [`EventBridge::recv`] is cancel-safe: an unconsumed value stays in its slot.
//!
//! A slot is a `Mutex<Option<T>>` plus a [`Notify`] rather than a
//! `watch` or `mpsc(1)` channel: `watch` always keeps the newest value and
//! `mpsc` either blocks the producer or drops the newest one, while a slot
//! has to keep an unread terminal value against any later non-terminal one.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::platform::{MachineState, PlatformError};

/// Which request a completion answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `Machine::start`.
    Start,
    /// `Machine::stop` (forced).
    Stop,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Stop => "stop",
        }
    }
}

/// Outcome of one start or forced-stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSignal {
    pub phase: Phase,
    pub result: Result<(), PlatformError>,
}

/// Value observed by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Completion(CompletionSignal),
    State(MachineState),
}

/// Values that end a session once observed.
trait Terminal {
    fn is_terminal(&self) -> bool;
}

impl Terminal for MachineState {
    /// Only `Stopped` settles a session; an `Error` report is recorded and passed over.
    fn is_terminal(&self) -> bool {
        matches!(self, MachineState::Stopped)
    }
}

impl Terminal for CompletionSignal {
    /// A failed start and a successful forced stop both settle the session.
    fn is_terminal(&self) -> bool {
        matches!(
            (self.phase, &self.result),
            (Phase::Start, Err(_)) | (Phase::Stop, Ok(()))
        )
    }
}

impl Terminal for Signal {
    fn is_terminal(&self) -> bool {
        match self {
            Signal::Completion(c) => c.is_terminal(),
            Signal::State(s) => Terminal::is_terminal(s),
        }
    }
}

impl Signal {
    /// True when observing this signal settles the session.
    pub fn is_terminal(&self) -> bool {
        Terminal::is_terminal(self)
    }
}

struct SlotInner<T> {
    value: Mutex<Option<T>>,
    ready: Notify,
}

/// Single-value mailbox shared by one consumer and any number of producers.
struct Slot<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Terminal> Slot<T> {
    fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                value: Mutex::new(None),
                ready: Notify::new(),
            }),
        }
    }

    /// Stores `value`, returning `false` when it was discarded in favour of an unread terminal.
    fn put(&self, value: T) -> bool {
        let mut guard = self
            .inner
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(unread) = guard.as_ref() {
            if unread.is_terminal() && !value.is_terminal() {
                return false;
            }
        }
        *guard = Some(value);
        drop(guard);
        self.inner.ready.notify_one();
        true
    }

    fn take(&self) -> Option<T> {
        self.inner
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn recv(&self) -> T {
        loop {
            if let Some(v) = self.take() {
                return v;
            }
            self.inner.ready.notified().await;
        }
    }
}

/// One-shot completion handle handed to [`Machine::start`](crate::Machine::start)
/// and [`Machine::stop`](crate::Machine::stop).
///
/// Consumed by [`Completion::complete`]; dropping it unused delivers nothing.
pub struct Completion {
    phase: Phase,
    slot: Slot<CompletionSignal>,
}

impl Completion {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Delivers the outcome of the request.
    pub fn complete(self, result: Result<(), PlatformError>) {
        let signal = CompletionSignal {
            phase: self.phase,
            result,
        };
        if !self.slot.put(signal) {
            tracing::debug!(phase = self.phase.as_str(), "completion dropped behind unread terminal");
        }
    }
}

/// Push handle for the platform's state-change feed. Cheap to clone.
#[derive(Clone)]
pub struct StateNotifier {
    slot: Slot<MachineState>,
}

impl StateNotifier {
    /// Publishes a state change.
    pub fn notify(&self, state: MachineState) {
        if !self.slot.put(state) {
            tracing::debug!(state = state.as_str(), "state dropped behind unread terminal");
        }
    }
}

/// Both signal sources of one machine.
#[derive(Clone)]
pub struct EventBridge {
    completions: Slot<CompletionSignal>,
    states: Slot<MachineState>,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            completions: Slot::new(),
            states: Slot::new(),
        }
    }

    /// Creates the completion handle for one request.
    pub fn completion(&self, phase: Phase) -> Completion {
        Completion {
            phase,
            slot: self.completions.clone(),
        }
    }

    /// Creates a producer handle for the state feed.
    pub fn notifier(&self) -> StateNotifier {
        StateNotifier {
            slot: self.states.clone(),
        }
    }

    /// Waits for the next signal from either source.
    pub async fn recv(&self) -> Signal {
        tokio::select! {
            biased;
            c = self.completions.recv() => Signal::Completion(c),
            s = self.states.recv() => Signal::State(s),
        }
    }

    /// Takes an already-buffered signal without waiting.
    pub fn try_recv(&self) -> Option<Signal> {
        self.completions
            .take()
            .map(Signal::Completion)
            .or_else(|| self.states.take().map(Signal::State))
    }
}
