//! # Hypervisor platform seam.
//!
//! The hypervisor itself is an external collaborator. vmvisor only sees it
//! through two traits:
//! - [`Platform`] reports resource bounds, mints identity blobs, creates disk
//!   images, validates descriptors and instantiates machines;
//! - [`Machine`] exposes the callback-style lifecycle surface of one instance.
//!
//! ```text
//!   Machine::start(Completion)            ──► one-shot callback ──┐
//!   Machine::stop(Completion)   (forced)  ──► one-shot callback ──┤
//!   Machine::state_changed_notify(StateNotifier)                  ├──► EventBridge
//!           └─► push feed: notifier.notify(state) ... ────────────┘
//!   Machine::can_request_stop() / request_stop()   (synchronous)
//! ```
//!
//! [`sim`] provides a scripted in-process implementation used by the binary
//! and the tests.

pub mod sim;

use std::{fmt, io, path::Path, sync::Arc};

use thiserror::Error;

use crate::core::{Completion, StateNotifier};
use crate::descriptor::{IdentityKind, MachineDescriptor, ValidatedDescriptor, disk};

/// Lifecycle state of one machine.
///
/// The same vocabulary is used for the platform's notification feed and for
/// the controller's own tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl MachineState {
    /// `Stopped` and `Error` end a session.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, MachineState::Stopped | MachineState::Error)
    }

    /// Returns whether the controller may move from `self` to `next`.
    ///
    /// Progression is monotonic toward a terminal state. `Running → Stopping`
    /// is the expected shutdown edge; `Starting → Stopping` covers a stop that
    /// races ahead of the first `Running` notification. The controller takes
    /// the edges into `Error` only on a failed start completion, which may
    /// arrive after either feed has moved the state on.
    pub fn can_transition_to(&self, next: MachineState) -> bool {
        use MachineState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Error)
                | (Running, Stopping)
                | (Running, Error)
                | (Stopping, Stopped)
                | (Stopping, Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Created => "created",
            MachineState::Starting => "starting",
            MachineState::Running => "running",
            MachineState::Stopping => "stopping",
            MachineState::Stopped => "stopped",
            MachineState::Error => "error",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive `[min, max]` range reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    #[inline]
    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }
}

/// CPU and memory limits for one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformBounds {
    pub cpu: Bounds<u32>,
    /// Memory in bytes.
    pub memory: Bounds<u64>,
}

/// Opaque failure reported by the hypervisor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PlatformError {
    message: Arc<str>,
}

impl PlatformError {
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Factory and validator side of the hypervisor.
pub trait Platform: Send + Sync + 'static {
    /// Machine type produced by [`Platform::create_machine`].
    type Machine: Machine;

    /// Platform-legal CPU and memory ranges.
    fn bounds(&self) -> PlatformBounds;

    /// Mints a fresh identity blob of the given kind.
    ///
    /// Only called when no persisted artifact exists yet.
    fn create_identity(&self, kind: IdentityKind) -> Result<Vec<u8>, PlatformError>;

    /// Creates a block-storage image of `size` bytes at `path`.
    ///
    /// Must fail with [`io::ErrorKind::AlreadyExists`] (and leave the file
    /// untouched) when `path` exists. The default creates a sparse file.
    fn create_disk_image(&self, path: &Path, size: u64) -> io::Result<()> {
        disk::create_sparse_image(path, size)
    }

    /// Validates a fully assembled descriptor.
    ///
    /// Mirrors the platform contract: `(valid, error)`. The pair
    /// `(false, None)` is a contradiction the assembler surfaces explicitly.
    fn validate(&self, descriptor: &MachineDescriptor) -> (bool, Option<PlatformError>);

    /// Instantiates a machine. Called exactly once per session.
    fn create_machine(&self, descriptor: ValidatedDescriptor)
    -> Result<Self::Machine, PlatformError>;
}

/// Lifecycle surface of one machine instance.
///
/// All methods are non-blocking. Completion and state delivery happen through
/// the handles passed in, from whatever context the platform uses.
pub trait Machine: Send + Sync + 'static {
    /// Starts the machine; `on_complete` fires once with the outcome.
    fn start(&self, on_complete: Completion);

    /// Registers the push feed of state changes.
    fn state_changed_notify(&self, notifier: StateNotifier);

    /// Whether a graceful stop request is currently permissible.
    ///
    /// Owned by the platform; may toggle at any time.
    fn can_request_stop(&self) -> bool;

    /// Asks the guest to shut down. `Ok(false)` means the request was not accepted.
    fn request_stop(&self) -> Result<bool, PlatformError>;

    /// Forced, non-negotiated stop; `on_complete` fires once with the outcome.
    fn stop(&self, on_complete: Completion);
}
