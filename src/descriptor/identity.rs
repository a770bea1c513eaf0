//! # Persisted platform identity artifacts.
//!
//! Auxiliary storage, hardware model and machine identifier are opaque blobs.
//! Each one is read from its path if present, otherwise minted by the platform
//! and written there, so later sessions boot the same machine.
//!
//! ```text
//! load_or_create(kind, path)
//!   ├─ read(path) ok, non-empty ─► blob
//!   ├─ NotFound ─► platform.create_identity(kind) ─► write (create_new) ─► blob
//!   └─ other    ─► ConfigError { stage: kind.stage() }
//! ```

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::{ConfigError, ConfigStage};
use crate::platform::Platform;

/// Which identity artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    AuxiliaryStorage,
    HardwareModel,
    MachineIdentifier,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        self.stage().as_str()
    }

    /// Stage reported when this artifact fails.
    pub fn stage(&self) -> ConfigStage {
        match self {
            IdentityKind::AuxiliaryStorage => ConfigStage::AuxiliaryStorage,
            IdentityKind::HardwareModel => ConfigStage::HardwareModel,
            IdentityKind::MachineIdentifier => ConfigStage::MachineIdentifier,
        }
    }
}

/// Loaded identity artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityBlob {
    pub kind: IdentityKind,
    pub path: PathBuf,
    pub data: Arc<[u8]>,
}

/// Reads the artifact at `path`, creating it through `platform` when absent.
pub fn load_or_create<P: Platform>(
    platform: &P,
    kind: IdentityKind,
    path: &Path,
) -> Result<IdentityBlob, ConfigError> {
    let stage = kind.stage();
    let data = match fs::read(path) {
        Ok(data) if data.is_empty() => {
            return Err(ConfigError::io(
                stage,
                io::Error::new(io::ErrorKind::InvalidData, "identity artifact is empty"),
            ));
        }
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let data = platform
                .create_identity(kind)
                .map_err(|e| ConfigError::platform(stage, e))?;
            persist(path, &data).map_err(|e| ConfigError::io(stage, e))?;
            tracing::info!(kind = kind.as_str(), path = %path.display(), "identity created");
            data
        }
        Err(e) => return Err(ConfigError::io(stage, e)),
    };

    Ok(IdentityBlob {
        kind,
        path: path.to_path_buf(),
        data: data.into(),
    })
}

fn persist(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.write_all(data).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}
