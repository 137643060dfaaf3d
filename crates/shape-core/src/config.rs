//! Boot configurations and their device slots.
//!
//! A boot configuration always has exactly eight device slots, `sda` through
//! `sdh`. [`DeviceMap`] stores them as a fixed array indexed by
//! [`DeviceSlot`], so a slot can be empty but never missing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::ids::{ConfigId, DiskId, VolumeId};

/// A boot configuration as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootConfig {
    /// Provider-assigned identifier.
    pub id: ConfigId,
    /// Label, unique within the owning instance.
    pub label: String,
    /// Kernel identifier (e.g. `linode/latest-64bit`).
    pub kernel: String,
    /// Init run level.
    #[serde(default)]
    pub run_level: RunLevel,
    /// Virtualization mode.
    #[serde(default)]
    pub virt_mode: VirtMode,
    /// Root device path (e.g. `/dev/sda`).
    #[serde(default)]
    pub root_device: String,
    /// Free-form notes.
    #[serde(default)]
    pub comments: String,
    /// Memory limit in MB, zero for the plan maximum.
    #[serde(default)]
    pub memory_limit: u64,
    /// Boot helper toggles.
    #[serde(default)]
    pub helpers: ConfigHelpers,
    /// The eight device slots.
    #[serde(default)]
    pub devices: DeviceMap,
}

/// Init run levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunLevel {
    /// Normal multi-user boot.
    #[default]
    Default,
    /// Single-user mode.
    Single,
    /// Boot straight into `/bin/bash`.
    Binbash,
}

impl RunLevel {
    /// Wire name of the run level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Single => "single",
            Self::Binbash => "binbash",
        }
    }
}

/// Virtualization modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VirtMode {
    /// Paravirtualized devices.
    #[default]
    Paravirt,
    /// Fully virtualized devices.
    Fullvirt,
}

impl VirtMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paravirt => "paravirt",
            Self::Fullvirt => "fullvirt",
        }
    }
}

/// Boot helpers the provider can apply to a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ConfigHelpers {
    /// Disable the `updatedb` cron job.
    #[serde(default = "enabled")]
    pub updatedb_disabled: bool,
    /// Apply distribution-specific fixes.
    #[serde(default = "enabled")]
    pub distro: bool,
    /// Generate `modules.dep` for the booted kernel.
    #[serde(default = "enabled")]
    pub modules_dep: bool,
    /// Configure networking automatically.
    #[serde(default = "enabled")]
    pub network: bool,
    /// Mount `devtmpfs` at boot.
    #[serde(default = "enabled")]
    pub devtmpfs_automount: bool,
}

const fn enabled() -> bool {
    true
}

impl Default for ConfigHelpers {
    fn default() -> Self {
        Self {
            updatedb_disabled: true,
            distro: true,
            modules_dep: true,
            network: true,
            devtmpfs_automount: true,
        }
    }
}

/// The eight device slot names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSlot {
    /// `/dev/sda`
    Sda,
    /// `/dev/sdb`
    Sdb,
    /// `/dev/sdc`
    Sdc,
    /// `/dev/sdd`
    Sdd,
    /// `/dev/sde`
    Sde,
    /// `/dev/sdf`
    Sdf,
    /// `/dev/sdg`
    Sdg,
    /// `/dev/sdh`
    Sdh,
}

impl DeviceSlot {
    /// Number of slots in every boot configuration.
    pub const COUNT: usize = 8;

    /// All slots in order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Sda,
        Self::Sdb,
        Self::Sdc,
        Self::Sdd,
        Self::Sde,
        Self::Sdf,
        Self::Sdg,
        Self::Sdh,
    ];

    /// Position of the slot in [`DeviceSlot::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Slot name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sda => "sda",
            Self::Sdb => "sdb",
            Self::Sdc => "sdc",
            Self::Sdd => "sdd",
            Self::Sde => "sde",
            Self::Sdf => "sdf",
            Self::Sdg => "sdg",
            Self::Sdh => "sdh",
        }
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceSlot {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.as_str() == s)
            .ok_or_else(|| CoreError::UnknownSlot(s.to_string()))
    }
}

/// What a non-empty device slot points at.
///
/// A slot references a disk of the same instance or an external volume,
/// never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceTarget {
    /// A disk owned by the instance.
    Disk(DiskId),
    /// An external block-storage volume.
    Volume(VolumeId),
}

impl DeviceTarget {
    /// The disk ID, if this slot holds a disk.
    #[must_use]
    pub const fn disk_id(self) -> Option<DiskId> {
        match self {
            Self::Disk(id) => Some(id),
            Self::Volume(_) => None,
        }
    }

    /// The volume ID, if this slot holds a volume.
    #[must_use]
    pub const fn volume_id(self) -> Option<VolumeId> {
        match self {
            Self::Volume(id) => Some(id),
            Self::Disk(_) => None,
        }
    }
}

/// The fixed set of eight device slots of a boot configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceMap {
    slots: [Option<DeviceTarget>; DeviceSlot::COUNT],
}

impl DeviceMap {
    /// Target attached to a slot.
    #[must_use]
    pub const fn get(&self, slot: DeviceSlot) -> Option<DeviceTarget> {
        self.slots[slot.index()]
    }

    /// Attach (or clear, with `None`) a slot.
    pub fn set(&mut self, slot: DeviceSlot, target: Option<DeviceTarget>) {
        self.slots[slot.index()] = target;
    }

    /// Iterate all eight slots in order, including empty ones.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceSlot, Option<DeviceTarget>)> + '_ {
        DeviceSlot::ALL.into_iter().map(|slot| (slot, self.get(slot)))
    }
}

#[derive(Serialize, Deserialize)]
struct WireDevice {
    #[serde(default)]
    disk_id: Option<DiskId>,
    #[serde(default)]
    volume_id: Option<VolumeId>,
}

impl WireDevice {
    fn into_target(self) -> Option<DeviceTarget> {
        // The provider gives the disk precedence when both are set.
        match (self.disk_id, self.volume_id) {
            (Some(disk), _) if disk.get() != 0 => Some(DeviceTarget::Disk(disk)),
            (_, Some(volume)) if volume.get() != 0 => Some(DeviceTarget::Volume(volume)),
            _ => None,
        }
    }

    fn from_target(target: DeviceTarget) -> Self {
        Self {
            disk_id: target.disk_id(),
            volume_id: target.volume_id(),
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct WireDevices {
    sda: Option<WireDevice>,
    sdb: Option<WireDevice>,
    sdc: Option<WireDevice>,
    sdd: Option<WireDevice>,
    sde: Option<WireDevice>,
    sdf: Option<WireDevice>,
    sdg: Option<WireDevice>,
    sdh: Option<WireDevice>,
}

impl Serialize for DeviceMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = |slot: DeviceSlot| self.get(slot).map(WireDevice::from_target);
        WireDevices {
            sda: wire(DeviceSlot::Sda),
            sdb: wire(DeviceSlot::Sdb),
            sdc: wire(DeviceSlot::Sdc),
            sdd: wire(DeviceSlot::Sdd),
            sde: wire(DeviceSlot::Sde),
            sdf: wire(DeviceSlot::Sdf),
            sdg: wire(DeviceSlot::Sdg),
            sdh: wire(DeviceSlot::Sdh),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DeviceMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireDevices::deserialize(deserializer)?;
        let slots = [
            wire.sda, wire.sdb, wire.sdc, wire.sdd, wire.sde, wire.sdf, wire.sdg, wire.sdh,
        ]
        .map(|dev| dev.and_then(WireDevice::into_target));
        Ok(Self { slots })
    }
}
