//! Error types used by the vmvisor session, its assembler and its controller.
//!
//! - [`VmError`] - the single terminal result of [`Session::run`](crate::Session::run).
//! - [`ConfigError`] - descriptor assembly failures, tagged with the failing [`ConfigStage`].
//! - [`ResourceBoundsError`] - platform bounds with `min > max`.
//! - [`StopAttemptError`] - non-fatal shutdown failures; rendered into events, never returned.
//!
//! Every type provides `as_label` (stable snake_case) for logs.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::descriptor::DeviceCategory;
use crate::platform::PlatformError;

/// Pipeline stage at which descriptor assembly failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStage {
    /// Reading or parsing the configuration file.
    Load,
    /// Preparing the bundle directory that holds the artifacts.
    Bundle,
    AuxiliaryStorage,
    HardwareModel,
    MachineIdentifier,
    DiskImage,
    Device,
    /// CPU/memory outside the platform-reported bounds.
    Resources,
    /// Platform-side descriptor validation.
    Validation,
    /// Instantiating the machine from a validated descriptor.
    Machine,
}

impl ConfigStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStage::Load => "load",
            ConfigStage::Bundle => "bundle",
            ConfigStage::AuxiliaryStorage => "auxiliary_storage",
            ConfigStage::HardwareModel => "hardware_model",
            ConfigStage::MachineIdentifier => "machine_identifier",
            ConfigStage::DiskImage => "disk_image",
            ConfigStage::Device => "device",
            ConfigStage::Resources => "resources",
            ConfigStage::Validation => "validation",
            ConfigStage::Machine => "machine",
        }
    }
}

impl fmt::Display for ConfigStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource kind named by bound errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Cpu,
    Memory,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Cpu => f.write_str("cpu"),
            Resource::Memory => f.write_str("memory"),
        }
    }
}

/// Platform reported an inverted `[min, max]` range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {resource} bounds: min {min} > max {max}")]
pub struct ResourceBoundsError {
    pub resource: Resource,
    pub min: u64,
    pub max: u64,
}

/// # Errors produced while building a machine descriptor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid TOML for [`Config`](crate::Config).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Filesystem failure while loading or creating an artifact.
    #[error("{stage}: {source}")]
    Io {
        stage: ConfigStage,
        #[source]
        source: io::Error,
    },

    /// Platform refused to create an artifact, validate, or instantiate.
    #[error("{stage}: {source}")]
    Platform {
        stage: ConfigStage,
        #[source]
        source: PlatformError,
    },

    /// A device fragment failed its own validation.
    #[error("{category} device invalid: {reason}")]
    Device {
        category: DeviceCategory,
        reason: String,
    },

    /// Planned resources escaped the platform bounds.
    #[error("{resource} value {value} outside platform bounds [{min}, {max}]")]
    OutOfBounds {
        resource: Resource,
        value: u64,
        min: u64,
        max: u64,
    },

    /// Validation reported `false` without supplying an error.
    #[error("invalid configuration")]
    InvalidConfiguration,
}

impl ConfigError {
    /// Returns the stage that failed.
    pub fn stage(&self) -> ConfigStage {
        match self {
            ConfigError::Read { .. } | ConfigError::Parse(_) => ConfigStage::Load,
            ConfigError::Io { stage, .. } | ConfigError::Platform { stage, .. } => *stage,
            ConfigError::Device { .. } => ConfigStage::Device,
            ConfigError::OutOfBounds { .. } => ConfigStage::Resources,
            ConfigError::InvalidConfiguration => ConfigStage::Validation,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Io { .. } => "config_io",
            ConfigError::Platform { .. } => "config_platform",
            ConfigError::Device { .. } => "config_device",
            ConfigError::OutOfBounds { .. } => "config_out_of_bounds",
            ConfigError::InvalidConfiguration => "invalid_configuration",
        }
    }

    pub(crate) fn io(stage: ConfigStage, source: io::Error) -> Self {
        ConfigError::Io { stage, source }
    }

    pub(crate) fn platform(stage: ConfigStage, source: PlatformError) -> Self {
        ConfigError::Platform { stage, source }
    }
}

/// # Non-fatal failures of a single shutdown step.
///
/// The controller absorbs these: before escalation they are retried, after
/// escalation they are only recorded as events.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StopAttemptError {
    /// The guest declined the graceful request (`request_stop` returned `false`).
    #[error("stop request {attempt} declined by guest")]
    Declined { attempt: u32 },

    /// The platform failed to deliver the graceful request.
    #[error("stop request {attempt} failed: {source}")]
    Platform {
        attempt: u32,
        #[source]
        source: PlatformError,
    },

    /// The forced stop completed with an error.
    #[error("forced stop failed: {0}")]
    ForcedStop(#[source] PlatformError),
}

impl StopAttemptError {
    pub fn as_label(&self) -> &'static str {
        match self {
            StopAttemptError::Declined { .. } => "stop_declined",
            StopAttemptError::Platform { .. } => "stop_request_failed",
            StopAttemptError::ForcedStop(_) => "forced_stop_failed",
        }
    }
}

/// # Terminal errors of a session.
///
/// Exactly one of these (or success) is reported per [`Session::run`](crate::Session::run).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum VmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bounds(#[from] ResourceBoundsError),

    /// The start completion carried an error. Fatal, never retried.
    #[error("failed to start vm: {0}")]
    Start(#[source] PlatformError),

    /// The caller cancelled the session before shutdown began.
    #[error("session cancelled")]
    Canceled,

    /// Install mode was requested but no installer is wired in.
    #[error("install mode requested but no installer is configured")]
    InstallUnavailable,

    #[error("install failed: {0}")]
    Install(String),
}

impl VmError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use vmvisor::VmError;
    ///
    /// assert_eq!(VmError::Canceled.as_label(), "session_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            VmError::Config(e) => e.as_label(),
            VmError::Bounds(_) => "resource_bounds",
            VmError::Start(_) => "start_failed",
            VmError::Canceled => "session_canceled",
            VmError::InstallUnavailable => "install_unavailable",
            VmError::Install(_) => "install_failed",
        }
    }

    /// True when the session was abandoned rather than failed.
    pub fn is_canceled(&self) -> bool {
        matches!(self, VmError::Canceled)
    }
}
