//! # Device fragments keyed by category.
//!
//! Each device class is one [`Device`] variant. All variants expose the same
//! capability set through [`DeviceConfig`] (`category`, `describe`,
//! `validate`), so the assembler walks a [`DeviceSet`] generically instead of
//! branching per type.
//!
//! ```text
//! DeviceSet (BTreeMap<DeviceCategory, Vec<Device>>)
//!   storage   ─► [virtio-blk  Disk.img rw]
//!   network   ─► [virtio-net  nat]
//!   graphics  ─► [display 1920x1200@80ppi]
//!   pointing  ─► [usb screen-coordinate]
//!   keyboard  ─► [usb]
//!   audio     ─► [virtio-sound host-in + host-out]
//! ```

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use crate::config::DisplayMode;
use crate::error::ConfigError;

/// Device class of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceCategory {
    Storage,
    Network,
    Graphics,
    Pointing,
    Keyboard,
    Audio,
}

impl DeviceCategory {
    pub const ALL: [DeviceCategory; 6] = [
        DeviceCategory::Storage,
        DeviceCategory::Network,
        DeviceCategory::Graphics,
        DeviceCategory::Pointing,
        DeviceCategory::Keyboard,
        DeviceCategory::Audio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::Storage => "storage",
            DeviceCategory::Network => "network",
            DeviceCategory::Graphics => "graphics",
            DeviceCategory::Pointing => "pointing",
            DeviceCategory::Keyboard => "keyboard",
            DeviceCategory::Audio => "audio",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform capability set of a device fragment.
pub trait DeviceConfig {
    fn category(&self) -> DeviceCategory;

    /// One-line human-readable summary.
    fn describe(&self) -> String;

    /// Checks the fragment in isolation. Returns the reason on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Block storage backed by a disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDevice {
    pub image: PathBuf,
    pub read_only: bool,
}

/// Network attachment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAttachment {
    Nat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointingKind {
    UsbScreenCoordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardKind {
    Usb,
}

/// Host side of one sound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStream {
    HostInput,
    HostOutput,
}

/// One device fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    Storage(StorageDevice),
    Network(NetworkAttachment),
    Graphics(Vec<DisplayMode>),
    Pointing(PointingKind),
    Keyboard(KeyboardKind),
    Audio(Vec<AudioStream>),
}

impl DeviceConfig for Device {
    fn category(&self) -> DeviceCategory {
        match self {
            Device::Storage(_) => DeviceCategory::Storage,
            Device::Network(_) => DeviceCategory::Network,
            Device::Graphics(_) => DeviceCategory::Graphics,
            Device::Pointing(_) => DeviceCategory::Pointing,
            Device::Keyboard(_) => DeviceCategory::Keyboard,
            Device::Audio(_) => DeviceCategory::Audio,
        }
    }

    fn describe(&self) -> String {
        match self {
            Device::Storage(s) => {
                let mode = if s.read_only { "ro" } else { "rw" };
                format!("virtio-blk {} {mode}", s.image.display())
            }
            Device::Network(NetworkAttachment::Nat) => "virtio-net nat".to_string(),
            Device::Graphics(displays) => displays
                .iter()
                .map(|d| format!("display {}x{}@{}ppi", d.width, d.height, d.pixels_per_inch))
                .collect::<Vec<_>>()
                .join(", "),
            Device::Pointing(PointingKind::UsbScreenCoordinate) => {
                "usb screen-coordinate pointer".to_string()
            }
            Device::Keyboard(KeyboardKind::Usb) => "usb keyboard".to_string(),
            Device::Audio(streams) => {
                let names: Vec<&str> = streams
                    .iter()
                    .map(|s| match s {
                        AudioStream::HostInput => "host-in",
                        AudioStream::HostOutput => "host-out",
                    })
                    .collect();
                format!("virtio-sound {}", names.join(" + "))
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Device::Storage(s) if s.image.as_os_str().is_empty() => {
                Err("disk image path is empty".to_string())
            }
            Device::Graphics(displays) if displays.is_empty() => {
                Err("at least one display is required".to_string())
            }
            Device::Graphics(displays) => displays
                .iter()
                .find(|d| d.width == 0 || d.height == 0 || d.pixels_per_inch == 0)
                .map_or(Ok(()), |d| {
                    Err(format!(
                        "display {}x{}@{}ppi has a zero dimension",
                        d.width, d.height, d.pixels_per_inch
                    ))
                }),
            Device::Audio(streams) if streams.is_empty() => {
                Err("sound device has no streams".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Device fragments grouped by category, iterated in category order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSet {
    by_category: BTreeMap<DeviceCategory, Vec<Device>>,
}

impl DeviceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard device list: disk, NAT network, one display, pointer, keyboard, duplex sound.
    pub fn standard(disk_image: &Path, display: DisplayMode) -> Self {
        let mut set = Self::new();
        set.push(Device::Storage(StorageDevice {
            image: disk_image.to_path_buf(),
            read_only: false,
        }));
        set.push(Device::Network(NetworkAttachment::Nat));
        set.push(Device::Graphics(vec![display]));
        set.push(Device::Pointing(PointingKind::UsbScreenCoordinate));
        set.push(Device::Keyboard(KeyboardKind::Usb));
        set.push(Device::Audio(vec![
            AudioStream::HostInput,
            AudioStream::HostOutput,
        ]));
        set
    }

    pub fn push(&mut self, device: Device) {
        self.by_category
            .entry(device.category())
            .or_default()
            .push(device);
    }

    /// Devices of one category; empty when none were added.
    pub fn get(&self, category: DeviceCategory) -> &[Device] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.by_category.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates every fragment; the first failure wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for device in self.iter() {
            device.validate().map_err(|reason| ConfigError::Device {
                category: device.category(),
                reason,
            })?;
        }
        Ok(())
    }

    /// `category: summary; ...` for logs.
    pub fn describe(&self) -> String {
        self.iter()
            .map(|d| format!("{}: {}", d.category(), d.describe()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigStage;

    #[test]
    fn test_standard_set_covers_every_category() {
        let set = DeviceSet::standard(Path::new("VM.bundle/Disk.img"), DisplayMode::default());
        for category in DeviceCategory::ALL {
            assert_eq!(set.get(category).len(), 1, "{category}");
        }
        assert_eq!(set.len(), 6);
        assert!(set.validate().is_ok());
        assert!(set.describe().contains("graphics: display 1920x1200@80ppi"));
    }

    #[test]
    fn test_invalid_fragment_names_its_category() {
        let mut set = DeviceSet::new();
        set.push(Device::Graphics(vec![DisplayMode {
            width: 0,
            ..DisplayMode::default()
        }]));
        let err = set.validate().unwrap_err();
        assert_eq!(err.stage(), ConfigStage::Device);
        assert!(matches!(
            err,
            ConfigError::Device { category: DeviceCategory::Graphics, .. }
        ));
    }

    #[test]
    fn test_iteration_follows_category_order() {
        let mut set = DeviceSet::new();
        set.push(Device::Keyboard(KeyboardKind::Usb));
        set.push(Device::Network(NetworkAttachment::Nat));
        let order: Vec<_> = set.iter().map(|d| d.category()).collect();
        assert_eq!(order, vec![DeviceCategory::Network, DeviceCategory::Keyboard]);
    }
}
