//! # Resource planner.
//!
//! Pure functions mapping requested CPU/memory onto the platform-legal range.
//!
//! ```text
//! requested ──► clamp(min, max) ──► planned
//!   cpu:    None → max(host_cores - 1, 1)
//!   memory: None → 4 GiB
//! ```
//!
//! Clamping is `max(min, min(value, max))`, so it is idempotent. Inverted
//! bounds are the only failure.

use crate::config::ResourceRequest;
use crate::error::{Resource, ResourceBoundsError};
use crate::platform::{Bounds, PlatformBounds};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Memory used when the caller does not request a size.
pub const DEFAULT_MEMORY_SIZE: u64 = 4 * GIB;

/// Clamps `requested` into `[min, max]`.
///
/// # Example
/// ```
/// use vmvisor::clamp_cpu;
///
/// assert_eq!(clamp_cpu(4, 1, 8), Ok(4));
/// assert_eq!(clamp_cpu(12, 1, 8), Ok(8));
/// assert!(clamp_cpu(2, 8, 1).is_err());
/// ```
pub fn clamp_cpu(requested: u32, min: u32, max: u32) -> Result<u32, ResourceBoundsError> {
    if min > max {
        return Err(ResourceBoundsError {
            resource: Resource::Cpu,
            min: u64::from(min),
            max: u64::from(max),
        });
    }
    Ok(requested.min(max).max(min))
}

/// Clamps a memory size in bytes into `[min, max]`.
pub fn clamp_memory(requested: u64, min: u64, max: u64) -> Result<u64, ResourceBoundsError> {
    if min > max {
        return Err(ResourceBoundsError {
            resource: Resource::Memory,
            min,
            max,
        });
    }
    Ok(requested.min(max).max(min))
}

/// Default vCPU heuristic: one core left for the host, never below one.
pub fn default_cpu_count(host_cores: usize) -> u32 {
    let cores = u32::try_from(host_cores).unwrap_or(u32::MAX);
    cores.saturating_sub(1).max(1)
}

/// Logical cores available to this process.
pub fn host_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Planned CPU count and memory size for one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePlan {
    pub cpu_count: u32,
    /// Memory in bytes.
    pub memory_size: u64,
}

impl ResourcePlan {
    /// Resolves defaults and clamps both resources into `bounds`.
    pub fn compute(
        request: &ResourceRequest,
        bounds: &PlatformBounds,
        host_cores: usize,
    ) -> Result<Self, ResourceBoundsError> {
        let Bounds { min, max } = bounds.cpu;
        let cpu = request
            .cpu_count
            .unwrap_or_else(|| default_cpu_count(host_cores));
        let cpu_count = clamp_cpu(cpu, min, max)?;

        let Bounds { min, max } = bounds.memory;
        let memory = request.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE);
        let memory_size = clamp_memory(memory, min, max)?;

        Ok(Self {
            cpu_count,
            memory_size,
        })
    }
}
