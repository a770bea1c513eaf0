//! # Machine descriptor and its assembly.
//!
//! A [`MachineDescriptor`] is the full description of one machine: resources,
//! boot loader, platform identity and devices. The [`Assembler`] builds it from
//! a [`Config`](crate::Config) and a [`ResourcePlan`](crate::ResourcePlan), then
//! has the platform validate it. Only a [`ValidatedDescriptor`] can be turned
//! into a machine; it is immutable and cheap to share.
//!
//! ```text
//! ResourcePlan ─┐
//! Config ───────┼─► Assembler::build
//!               │     ├─ bundle dirs
//!               │     ├─ identity::load_or_create × 3
//!               │     ├─ disk::ensure_disk_image
//!               │     ├─ DeviceSet::standard + validate
//!               │     ├─ resources within bounds
//!               │     └─ Platform::validate ─► map_validation
//!               └──────────────────────────────────► ValidatedDescriptor
//! ```

mod assembler;
pub mod devices;
pub mod disk;
mod identity;

use std::{ops::Deref, sync::Arc};

pub use assembler::{Assembler, map_validation};
pub use devices::{Device, DeviceCategory, DeviceConfig, DeviceSet};
pub use identity::{IdentityBlob, IdentityKind, load_or_create};

/// Boot loader used to start the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootLoader {
    /// The platform's own operating-system boot loader.
    PlatformOs,
}

/// Identity artifacts that make the machine the same machine across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIdentity {
    pub auxiliary_storage: IdentityBlob,
    pub hardware_model: IdentityBlob,
    pub machine_identifier: IdentityBlob,
}

/// Complete description of one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineDescriptor {
    cpu_count: u32,
    memory_size: u64,
    boot_loader: BootLoader,
    identity: PlatformIdentity,
    devices: DeviceSet,
}

impl MachineDescriptor {
    pub fn new(
        cpu_count: u32,
        memory_size: u64,
        boot_loader: BootLoader,
        identity: PlatformIdentity,
        devices: DeviceSet,
    ) -> Self {
        Self {
            cpu_count,
            memory_size,
            boot_loader,
            identity,
            devices,
        }
    }

    pub fn cpu_count(&self) -> u32 {
        self.cpu_count
    }

    /// Memory in bytes.
    pub fn memory_size(&self) -> u64 {
        self.memory_size
    }

    pub fn boot_loader(&self) -> BootLoader {
        self.boot_loader
    }

    pub fn identity(&self) -> &PlatformIdentity {
        &self.identity
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "cpus={} memory={}MiB {}",
            self.cpu_count,
            self.memory_size / crate::planner::MIB,
            self.devices.describe()
        )
    }
}

/// A descriptor the platform accepted. Read-only from here on.
#[derive(Debug, Clone)]
pub struct ValidatedDescriptor(Arc<MachineDescriptor>);

impl ValidatedDescriptor {
    pub(crate) fn new(descriptor: MachineDescriptor) -> Self {
        Self(Arc::new(descriptor))
    }
}

impl Deref for ValidatedDescriptor {
    type Target = MachineDescriptor;

    fn deref(&self) -> &MachineDescriptor {
        &self.0
    }
}
