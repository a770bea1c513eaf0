//! Builds and validates a [`MachineDescriptor`].

use std::fs;

use crate::{
    config::Config,
    descriptor::{
        BootLoader, DeviceSet, MachineDescriptor, PlatformIdentity, ValidatedDescriptor, disk,
        identity::{IdentityKind, load_or_create},
    },
    error::{ConfigError, ConfigStage, Resource},
    planner::ResourcePlan,
    platform::{Platform, PlatformError},
};

/// Turns a platform `validate()` outcome into a result.
///
/// An error always wins. `(false, None)` is a contradiction and is reported as
/// [`ConfigError::InvalidConfiguration`].
pub fn map_validation(outcome: (bool, Option<PlatformError>)) -> Result<(), ConfigError> {
    match outcome {
        (_, Some(e)) => Err(ConfigError::platform(ConfigStage::Validation, e)),
        (false, None) => Err(ConfigError::InvalidConfiguration),
        (true, None) => Ok(()),
    }
}

/// Composes the descriptor for one session.
pub struct Assembler<'a, P: Platform> {
    platform: &'a P,
    cfg: &'a Config,
}

impl<'a, P: Platform> Assembler<'a, P> {
    pub fn new(platform: &'a P, cfg: &'a Config) -> Self {
        Self { platform, cfg }
    }

    /// Loads or creates every artifact, composes the descriptor and validates it.
    ///
    /// Artifacts are prepared in a fixed order; the first failure aborts with
    /// its stage and later artifacts are not touched.
    pub fn build(&self, plan: ResourcePlan) -> Result<ValidatedDescriptor, ConfigError> {
        let paths = &self.cfg.artifacts;
        self.prepare_bundle()?;

        let identity = PlatformIdentity {
            auxiliary_storage: load_or_create(
                self.platform,
                IdentityKind::AuxiliaryStorage,
                &paths.auxiliary_storage,
            )?,
            hardware_model: load_or_create(
                self.platform,
                IdentityKind::HardwareModel,
                &paths.hardware_model,
            )?,
            machine_identifier: load_or_create(
                self.platform,
                IdentityKind::MachineIdentifier,
                &paths.machine_identifier,
            )?,
        };

        disk::ensure_disk_image(self.platform, &paths.disk_image, self.cfg.disk_size)?;

        let devices = DeviceSet::standard(&paths.disk_image, self.cfg.display);
        devices.validate()?;

        self.check_bounds(plan)?;

        let descriptor = MachineDescriptor::new(
            plan.cpu_count,
            plan.memory_size,
            BootLoader::PlatformOs,
            identity,
            devices,
        );
        map_validation(self.platform.validate(&descriptor))?;
        Ok(ValidatedDescriptor::new(descriptor))
    }

    fn prepare_bundle(&self) -> Result<(), ConfigError> {
        for path in self.cfg.artifacts.all() {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|e| ConfigError::io(ConfigStage::Bundle, e))?;
            }
        }
        Ok(())
    }

    fn check_bounds(&self, plan: ResourcePlan) -> Result<(), ConfigError> {
        let bounds = self.platform.bounds();
        if !bounds.cpu.contains(plan.cpu_count) {
            return Err(ConfigError::OutOfBounds {
                resource: Resource::Cpu,
                value: u64::from(plan.cpu_count),
                min: u64::from(bounds.cpu.min),
                max: u64::from(bounds.cpu.max),
            });
        }
        if !bounds.memory.contains(plan.memory_size) {
            return Err(ConfigError::OutOfBounds {
                resource: Resource::Memory,
                value: plan.memory_size,
                min: bounds.memory.min,
                max: bounds.memory.max,
            });
        }
        Ok(())
    }
}
