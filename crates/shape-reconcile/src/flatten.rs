//! Flattening provider state into the declarative attribute shape.
//!
//! Everything here is a pure function of provider objects already in hand:
//! no provider calls, no failure modes. The result is what drift detection
//! compares against the desired shape.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use shape_core::{
    BootConfig, ConfigHelpers, DeviceMap, DeviceSlot, DeviceTarget, Disk, DiskId, Filesystem,
    Instance, InstanceAlerts, InstanceId, InstanceSpecs, InstanceStatus, RunLevel, VirtMode,
};

pub use shape_core::secret::{authorized_keys_state, hash_secret};

use crate::accounting::total_disk_size;

/// A disk as recorded in state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatDisk {
    /// Provider-assigned identifier.
    pub id: DiskId,
    /// Label.
    pub label: String,
    /// Filesystem kind.
    pub filesystem: Filesystem,
    /// Size in MB.
    pub size: u64,
    /// Digest of the root password the disk was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_pass: Option<String>,
    /// Digest of the authorized keys the disk was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_keys: Option<String>,
}

/// One device slot as recorded in state. Empty slots are `0/0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatDevice {
    /// Disk ID, or zero.
    pub disk_id: u64,
    /// Volume ID, or zero.
    pub volume_id: u64,
}

impl From<Option<DeviceTarget>> for FlatDevice {
    fn from(target: Option<DeviceTarget>) -> Self {
        match target {
            Some(DeviceTarget::Disk(id)) => Self {
                disk_id: id.get(),
                volume_id: 0,
            },
            Some(DeviceTarget::Volume(id)) => Self {
                disk_id: 0,
                volume_id: id.get(),
            },
            None => Self::default(),
        }
    }
}

/// A boot configuration as recorded in state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatConfig {
    /// Label.
    pub label: String,
    /// Kernel identifier.
    pub kernel: String,
    /// Init run level.
    pub run_level: RunLevel,
    /// Virtualization mode.
    pub virt_mode: VirtMode,
    /// Root device path.
    pub root_device: String,
    /// Free-form notes.
    pub comments: String,
    /// Memory limit in MB.
    pub memory_limit: u64,
    /// Boot helper toggles.
    pub helpers: ConfigHelpers,
    /// All eight slots.
    pub devices: BTreeMap<DeviceSlot, FlatDevice>,
}

/// The flattened state of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Instance ID.
    pub id: InstanceId,
    /// Display label.
    pub label: String,
    /// Plan identifier.
    #[serde(rename = "type")]
    pub type_id: String,
    /// Region.
    pub region: String,
    /// Status at the time of the read.
    pub status: InstanceStatus,
    /// Display group.
    pub group: String,
    /// Plan resources.
    pub specs: InstanceSpecs,
    /// Alert thresholds.
    pub alerts: InstanceAlerts,
    /// Plan storage allowance in MB.
    pub storage: u64,
    /// Total size of all disks in MB.
    pub storage_utilized: u64,
    /// First public IPv4 address.
    pub ip_address: Option<Ipv4Addr>,
    /// First private IPv4 address.
    pub private_ip_address: Option<Ipv4Addr>,
    /// Disks in provider order.
    pub disks: Vec<FlatDisk>,
    /// Boot configurations in provider order.
    pub configs: Vec<FlatConfig>,
    /// Total size of swap disks in MB.
    pub swap_size: u64,
}

impl InstanceState {
    /// Find a disk by label.
    #[must_use]
    pub fn disk(&self, label: &str) -> Option<&FlatDisk> {
        self.disks.iter().find(|d| d.label == label)
    }

    /// Find a boot configuration by label.
    #[must_use]
    pub fn config(&self, label: &str) -> Option<&FlatConfig> {
        self.configs.iter().find(|c| c.label == label)
    }
}

/// Flatten disks, keeping provider order.
#[must_use]
pub fn flatten_disks(disks: &[Disk]) -> Vec<FlatDisk> {
    disks
        .iter()
        .map(|d| FlatDisk {
            id: d.id,
            label: d.label.clone(),
            filesystem: d.filesystem,
            size: d.size,
            root_pass: None,
            authorized_keys: None,
        })
        .collect()
}

/// Total size of swap disks in MB.
#[must_use]
pub fn swap_size(disks: &[Disk]) -> u64 {
    disks.iter().filter(|d| d.is_swap()).map(|d| d.size).sum()
}

/// Render all eight slots.
#[must_use]
pub fn flatten_devices(devices: &DeviceMap) -> BTreeMap<DeviceSlot, FlatDevice> {
    devices
        .iter()
        .map(|(slot, target)| (slot, FlatDevice::from(target)))
        .collect()
}

/// Flatten boot configurations, keeping provider order.
#[must_use]
pub fn flatten_configs(configs: &[BootConfig]) -> Vec<FlatConfig> {
    configs
        .iter()
        .map(|c| FlatConfig {
            label: c.label.clone(),
            kernel: c.kernel.clone(),
            run_level: c.run_level,
            virt_mode: c.virt_mode,
            root_device: c.root_device.clone(),
            comments: c.comments.clone(),
            memory_limit: c.memory_limit,
            helpers: c.helpers,
            devices: flatten_devices(&c.devices),
        })
        .collect()
}

/// Flatten an instance with its disks and boot configurations.
#[must_use]
pub fn flatten_instance(instance: &Instance, disks: &[Disk], configs: &[BootConfig]) -> InstanceState {
    InstanceState {
        id: instance.id,
        label: instance.label.clone(),
        type_id: instance.type_id.clone(),
        region: instance.region.clone(),
        status: instance.status,
        group: instance.group.clone(),
        specs: instance.specs,
        alerts: instance.alerts,
        storage: instance.specs.disk,
        storage_utilized: total_disk_size(disks),
        ip_address: instance.public_ipv4(),
        private_ip_address: instance.private_ipv4(),
        disks: flatten_disks(disks),
        configs: flatten_configs(configs),
        swap_size: swap_size(disks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shape_core::{ConfigId, DiskStatus, VolumeId};

    fn disk(id: u64, label: &str, filesystem: Filesystem, size: u64) -> Disk {
        Disk {
            id: DiskId::new(id),
            label: label.to_string(),
            filesystem,
            size,
            status: DiskStatus::Ready,
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    #[test]
    fn swap_size_sums_swap_disks() {
        let disks = [
            disk(1, "swap", Filesystem::Swap, 256),
            disk(2, "boot", Filesystem::Ext4, 3000),
        ];
        assert_eq!(swap_size(&disks), 256);
        assert_eq!(swap_size(&[disk(2, "boot", Filesystem::Ext4, 3000)]), 0);
    }

    #[test]
    fn disks_keep_provider_order() {
        let flat = flatten_disks(&[
            disk(2, "b", Filesystem::Ext4, 10),
            disk(1, "a", Filesystem::Raw, 20),
        ]);
        let labels: Vec<_> = flat.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["b", "a"]);
        assert_eq!(flat[1].filesystem, Filesystem::Raw);
    }

    #[test]
    fn devices_render_all_slots() {
        let mut devices = DeviceMap::default();
        devices.set(DeviceSlot::Sda, Some(DeviceTarget::Disk(DiskId::new(10))));
        devices.set(DeviceSlot::Sdc, Some(DeviceTarget::Volume(VolumeId::new(30))));

        let flat = flatten_devices(&devices);
        assert_eq!(flat.len(), 8);
        assert_eq!(flat[&DeviceSlot::Sda], FlatDevice { disk_id: 10, volume_id: 0 });
        assert_eq!(flat[&DeviceSlot::Sdb], FlatDevice::default());
        assert_eq!(flat[&DeviceSlot::Sdc], FlatDevice { disk_id: 0, volume_id: 30 });
        assert_eq!(flat[&DeviceSlot::Sdh], FlatDevice { disk_id: 0, volume_id: 0 });
    }

    #[test]
    fn config_fields_are_copied() {
        let config = BootConfig {
            id: ConfigId::new(5),
            label: "boot".into(),
            kernel: "linode/grub2".into(),
            run_level: RunLevel::Single,
            virt_mode: VirtMode::Fullvirt,
            root_device: "/dev/sdb".into(),
            comments: "rescue".into(),
            memory_limit: 512,
            helpers: ConfigHelpers {
                network: false,
                ..ConfigHelpers::default()
            },
            devices: DeviceMap::default(),
        };
        let flat = &flatten_configs(&[config])[0];
        assert_eq!(flat.kernel, "linode/grub2");
        assert_eq!(flat.run_level, RunLevel::Single);
        assert_eq!(flat.virt_mode, VirtMode::Fullvirt);
        assert_eq!(flat.memory_limit, 512);
        assert!(!flat.helpers.network);
        assert!(flat.helpers.distro);
    }

    #[test]
    fn instance_aggregates() {
        let instance: Instance = serde_json::from_value(serde_json::json!({
            "id": 7,
            "label": "web",
            "type": "g6-standard-1",
            "region": "us-east",
            "status": "running",
            "ipv4": ["192.168.1.5", "45.79.1.2"],
            "specs": {"disk": 51200, "memory": 2048, "vcpus": 1, "transfer": 2000},
            "created": "2024-01-01T00:00:00",
            "updated": "2024-01-01T00:00:00"
        }))
        .unwrap();
        let disks = [
            disk(1, "boot", Filesystem::Ext4, 50_688),
            disk(2, "swap", Filesystem::Swap, 512),
        ];

        let state = flatten_instance(&instance, &disks, &[]);
        assert_eq!(state.storage, 51_200);
        assert_eq!(state.storage_utilized, 51_200);
        assert_eq!(state.swap_size, 512);
        assert_eq!(state.ip_address, Some(Ipv4Addr::new(45, 79, 1, 2)));
        assert_eq!(state.private_ip_address, Some(Ipv4Addr::new(192, 168, 1, 5)));
        assert_eq!(state.disk("boot").unwrap().size, 50_688);
    }
}
