//! # Scripted in-process platform.
//!
//! [`SimulatedPlatform`] implements [`Platform`] and [`Machine`] from a
//! [`SimScript`]. Callbacks are delivered from spawned tokio tasks after
//! scripted delays, the way a real hypervisor calls back from its own queue.
//!
//! ```text
//! start(c)        ── boot_delay ──► c.complete(start_error?) ─► Running? ─► Stopped? (exit_on_boot)
//! request_stop()  ── n-th call ≥ accept_stop_after ─► shutdown_delay ─► Stopping ─► Stopped
//! stop(c)         ── shutdown_delay ──► c.complete(forced_stop_error?)
//! can_request_stop() ─► can_request_stop[(checks - 1) % len]   (always true when empty)
//! ```

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use crate::{
    core::{Completion, StateNotifier},
    descriptor::{IdentityKind, MachineDescriptor, ValidatedDescriptor},
    planner::{GIB, MIB},
    platform::{Bounds, Machine, MachineState, Platform, PlatformBounds, PlatformError},
};

/// Scripted answer of [`Platform::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Validation {
    #[default]
    Accept,
    /// `(false, Some(error))`.
    Reject(String),
    /// `(false, None)`.
    RejectSilently,
}

/// Behaviour of the simulated platform and its machine.
#[derive(Debug, Clone)]
pub struct SimScript {
    pub bounds: PlatformBounds,
    /// Delay between `start` and its completion.
    pub boot_delay: Duration,
    /// Completes `start` with this error.
    pub start_error: Option<String>,
    /// Push `Running` after a successful start.
    pub report_running: bool,
    /// Push `Stopped` right after boot, as if the guest powered off by itself.
    pub exit_on_boot: bool,
    /// Cyclic answers of `can_request_stop`; empty means always `true`.
    pub can_request_stop: Vec<bool>,
    /// The guest shuts down on the n-th delivered request; `None` ignores all requests.
    pub accept_stop_after: Option<u32>,
    /// Delay between an accepted request (or a forced stop) and its effect.
    pub shutdown_delay: Duration,
    /// Completes the forced stop with this error.
    pub forced_stop_error: Option<String>,
    pub validation: Validation,
}

impl Default for SimScript {
    /// A well-behaved guest: boots in 1s, reports Running, accepts the first
    /// stop request and powers off 500ms later.
    fn default() -> Self {
        Self {
            bounds: PlatformBounds {
                cpu: Bounds::new(1, 8),
                memory: Bounds::new(512 * MIB, 8 * GIB),
            },
            boot_delay: Duration::from_secs(1),
            start_error: None,
            report_running: true,
            exit_on_boot: false,
            can_request_stop: Vec::new(),
            accept_stop_after: Some(1),
            shutdown_delay: Duration::from_millis(500),
            forced_stop_error: None,
            validation: Validation::Accept,
        }
    }
}

/// Call counters shared by the platform and its machines.
#[derive(Debug, Default)]
pub struct SimCounters {
    stop_requests: AtomicU32,
    forced_stops: AtomicU32,
    permission_checks: AtomicU32,
    identities_created: AtomicU32,
}

impl SimCounters {
    /// Graceful requests delivered through `request_stop`.
    pub fn stop_requests(&self) -> u32 {
        self.stop_requests.load(Ordering::SeqCst)
    }

    pub fn forced_stops(&self) -> u32 {
        self.forced_stops.load(Ordering::SeqCst)
    }

    /// Calls to `can_request_stop`.
    pub fn permission_checks(&self) -> u32 {
        self.permission_checks.load(Ordering::SeqCst)
    }

    pub fn identities_created(&self) -> u32 {
        self.identities_created.load(Ordering::SeqCst)
    }
}

/// Scripted [`Platform`].
pub struct SimulatedPlatform {
    script: Arc<SimScript>,
    counters: Arc<SimCounters>,
}

impl SimulatedPlatform {
    pub fn new(script: SimScript) -> Self {
        Self {
            script: Arc::new(script),
            counters: Arc::new(SimCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<SimCounters> {
        Arc::clone(&self.counters)
    }
}

impl Platform for SimulatedPlatform {
    type Machine = SimulatedMachine;

    fn bounds(&self) -> PlatformBounds {
        self.script.bounds
    }

    fn create_identity(&self, kind: IdentityKind) -> Result<Vec<u8>, PlatformError> {
        let n = self.counters.identities_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("sim:{}:{n}", kind.as_str()).into_bytes())
    }

    fn validate(&self, _descriptor: &MachineDescriptor) -> (bool, Option<PlatformError>) {
        match &self.script.validation {
            Validation::Accept => (true, None),
            Validation::Reject(msg) => (false, Some(PlatformError::new(msg.as_str()))),
            Validation::RejectSilently => (false, None),
        }
    }

    fn create_machine(
        &self,
        descriptor: ValidatedDescriptor,
    ) -> Result<SimulatedMachine, PlatformError> {
        tracing::debug!(descriptor = %descriptor.summary(), "simulated machine created");
        Ok(SimulatedMachine {
            inner: Arc::new(MachineInner {
                script: Arc::clone(&self.script),
                counters: Arc::clone(&self.counters),
                notifier: Mutex::new(None),
                shutting_down: AtomicBool::new(false),
                _descriptor: descriptor,
            }),
        })
    }
}

struct MachineInner {
    script: Arc<SimScript>,
    counters: Arc<SimCounters>,
    notifier: Mutex<Option<StateNotifier>>,
    shutting_down: AtomicBool,
    _descriptor: ValidatedDescriptor,
}

impl MachineInner {
    fn notify(&self, state: MachineState) {
        let guard = self.notifier.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(notifier) = guard.as_ref() {
            notifier.notify(state);
        }
    }
}

/// Scripted [`Machine`].
pub struct SimulatedMachine {
    inner: Arc<MachineInner>,
}

impl Machine for SimulatedMachine {
    fn start(&self, on_complete: Completion) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.script.boot_delay).await;
            if let Some(msg) = &inner.script.start_error {
                on_complete.complete(Err(PlatformError::new(msg.as_str())));
                return;
            }
            on_complete.complete(Ok(()));
            if inner.script.report_running {
                inner.notify(MachineState::Running);
            }
            if inner.script.exit_on_boot {
                inner.notify(MachineState::Stopped);
            }
        });
    }

    fn state_changed_notify(&self, notifier: StateNotifier) {
        *self
            .inner
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(notifier);
    }

    fn can_request_stop(&self) -> bool {
        let n = self.inner.counters.permission_checks.fetch_add(1, Ordering::SeqCst);
        let answers = &self.inner.script.can_request_stop;
        if answers.is_empty() {
            return true;
        }
        answers[n as usize % answers.len()]
    }

    fn request_stop(&self) -> Result<bool, PlatformError> {
        let n = self.inner.counters.stop_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let accepted = self.inner.script.accept_stop_after.is_some_and(|k| n >= k);
        if accepted && !self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.script.shutdown_delay).await;
                inner.notify(MachineState::Stopping);
                tokio::task::yield_now().await;
                inner.notify(MachineState::Stopped);
            });
        }
        Ok(true)
    }

    fn stop(&self, on_complete: Completion) {
        self.inner.counters.forced_stops.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.script.shutdown_delay).await;
            let result = match &inner.script.forced_stop_error {
                Some(msg) => Err(PlatformError::new(msg.as_str())),
                None => Ok(()),
            };
            on_complete.complete(result);
        });
    }
}
