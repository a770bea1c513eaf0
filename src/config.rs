//! # Session configuration.
//!
//! Provides [`Config`] centralized settings for one vmvisor session.
//!
//! Config is used in two ways:
//! 1. **Session creation**: `Session::builder(config, platform)`
//! 2. **Descriptor assembly**: artifact paths, disk size and display mode feed the assembler.
//!
//! Every field has a default, so a TOML file only needs the keys it overrides:
//! ```toml
//! disk_size = 34359738368
//!
//! [resources]
//! cpu_count = 4
//!
//! [shutdown]
//! backoff_ms = 3000
//! escalate_after = 3
//! ```
//!
//! ## Sentinel values
//! - `resources.cpu_count = None` → host cores − 1 (min 1)
//! - `resources.memory_size = None` → 4 GiB
//! - `bus_capacity = 0` → clamped to 1 by the bus

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::planner::GIB;
use crate::policies::ShutdownPolicy;

/// Default bundle directory holding the disk image and identity artifacts.
pub const DEFAULT_BUNDLE_DIR: &str = "VM.bundle";

/// Global configuration for a session.
///
/// ## Field semantics
/// - `resources`: requested CPU/memory, clamped later by the planner
/// - `artifacts`: filesystem locations of the disk image and identity blobs
/// - `disk_size`: capacity used when the disk image is first created
/// - `display`: the single display mode of the graphics device
/// - `shutdown`: graceful-stop backoff and escalation threshold
/// - `bus_capacity`: event bus ring buffer size
/// - `handle_signals`: request a graceful stop on SIGINT/SIGTERM/SIGQUIT
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Disk image capacity in bytes.
    pub disk_size: u64,
    /// Capacity of the event bus broadcast channel.
    ///
    /// Slow receivers lagging behind more than `bus_capacity` events skip the oldest.
    pub bus_capacity: usize,
    pub handle_signals: bool,
    pub resources: ResourceRequest,
    pub artifacts: ArtifactPaths,
    pub display: DisplayMode,
    pub shutdown: ShutdownConfig,
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - artifacts under `VM.bundle/`
    /// - `disk_size = 64 GiB`
    /// - display 1920×1200 at 80 ppi
    /// - shutdown backoff 3s, escalation after 3 attempts
    /// - `bus_capacity = 1024`
    /// - `handle_signals = true`
    fn default() -> Self {
        Self {
            disk_size: 64 * GIB,
            bus_capacity: 1024,
            handle_signals: true,
            resources: ResourceRequest::default(),
            artifacts: ArtifactPaths::default(),
            display: DisplayMode::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Config {
    /// Parses a TOML document.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Serializes to a TOML string.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Returns the shutdown policy derived from [`Config::shutdown`].
    #[inline]
    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.shutdown.policy()
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

/// Requested resources before clamping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequest {
    pub cpu_count: Option<u32>,
    /// Memory in bytes.
    pub memory_size: Option<u64>,
}

/// Filesystem locations of persisted artifacts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub disk_image: PathBuf,
    pub auxiliary_storage: PathBuf,
    pub hardware_model: PathBuf,
    pub machine_identifier: PathBuf,
}

impl ArtifactPaths {
    /// Derives all four paths from one bundle directory.
    pub fn in_bundle(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            disk_image: dir.join("Disk.img"),
            auxiliary_storage: dir.join("AuxiliaryStorage"),
            hardware_model: dir.join("HardwareModel"),
            machine_identifier: dir.join("MachineIdentifier"),
        }
    }

    pub(crate) fn all(&self) -> [&Path; 4] {
        [
            &self.disk_image,
            &self.auxiliary_storage,
            &self.hardware_model,
            &self.machine_identifier,
        ]
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_bundle(DEFAULT_BUNDLE_DIR)
    }
}

/// Display resolution and pixel density.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub pixels_per_inch: u32,
}

impl Default for DisplayMode {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1200,
            pixels_per_inch: 80,
        }
    }
}

/// File-facing form of [`ShutdownPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Fixed interval between graceful stop attempts.
    pub backoff_ms: u64,
    /// Attempts after which one forced stop is issued.
    pub escalate_after: u32,
}

impl ShutdownConfig {
    pub fn policy(&self) -> ShutdownPolicy {
        ShutdownPolicy {
            interval: Duration::from_millis(self.backoff_ms),
            escalate_after: self.escalate_after,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        let policy = ShutdownPolicy::default();
        Self {
            backoff_ms: u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
            escalate_after: policy.escalate_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_bundle_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.artifacts.disk_image, Path::new("VM.bundle/Disk.img"));
        assert_eq!(cfg.disk_size, 64 * GIB);
        assert_eq!(cfg.shutdown.backoff_ms, 3000);
        assert_eq!(cfg.shutdown.escalate_after, 3);
        assert_eq!(cfg.shutdown_policy(), ShutdownPolicy::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
            handle_signals = false

            [resources]
            cpu_count = 2

            [shutdown]
            backoff_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.resources.cpu_count, Some(2));
        assert_eq!(cfg.resources.memory_size, None);
        assert!(!cfg.handle_signals);
        assert_eq!(cfg.shutdown.escalate_after, 3);
        assert_eq!(cfg.shutdown_policy().interval, Duration::from_millis(500));
        assert_eq!(cfg.display, DisplayMode::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut cfg = Config::default();
        cfg.artifacts = ArtifactPaths::in_bundle("/var/lib/vm");
        let back = Config::from_toml(&cfg.to_toml()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_malformed_toml_is_a_load_error() {
        let err = Config::from_toml("disk_size = \"big\"").unwrap_err();
        assert_eq!(err.stage(), crate::error::ConfigStage::Load);
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let err = Config::load("/nonexistent/vmvisor.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_bus_capacity_clamped() {
        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
