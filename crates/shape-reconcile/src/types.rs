//! Desired instance shape and reconciliation settings.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shape_core::{
    ConfigHelpers, DeviceMap, DeviceSlot, Filesystem, InstanceId, RunLevel, VirtMode,
};
use shape_provider::{ConfigOptions, CreateDiskOptions};

use crate::error::{ReconcileError, Result};
use crate::resolver::DeviceSpec;

/// Bounds on waits for asynchronous actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Bound for disk creation.
    #[serde(rename = "create_seconds", with = "seconds")]
    pub create: Duration,
    /// Bound for plan and disk resizes.
    #[serde(rename = "update_seconds", with = "seconds")]
    pub update: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(10 * 60),
            update: Duration::from_secs(20 * 60),
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// A disk the instance should have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredDisk {
    /// Label, unique within the instance.
    pub label: String,
    /// Size in MB.
    pub size: u64,
    /// Filesystem for a new disk.
    #[serde(default)]
    pub filesystem: Filesystem,
    /// Image to deploy onto a new disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Root password for a new disk's image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_pass: Option<String>,
    /// SSH keys for a new disk's image.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorized_keys: Vec<String>,
    /// StackScript for a new disk's image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stackscript_id: Option<u64>,
    /// StackScript user-defined fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stackscript_data: BTreeMap<String, String>,
}

impl DesiredDisk {
    /// A blank disk.
    #[must_use]
    pub fn new(label: impl Into<String>, filesystem: Filesystem, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            filesystem,
            image: None,
            root_pass: None,
            authorized_keys: Vec::new(),
            stackscript_id: None,
            stackscript_data: BTreeMap::new(),
        }
    }

    /// Provider options to create this disk.
    #[must_use]
    pub fn create_options(&self) -> CreateDiskOptions {
        CreateDiskOptions {
            label: self.label.clone(),
            filesystem: self.filesystem,
            size: self.size,
            image: self.image.clone(),
            root_pass: self.root_pass.clone(),
            authorized_keys: self.authorized_keys.clone(),
            stackscript_id: self.stackscript_id,
            stackscript_data: self.stackscript_data.clone(),
        }
    }
}

fn default_kernel() -> String {
    "linode/latest-64bit".to_string()
}

fn default_root_device() -> String {
    "/dev/sda".to_string()
}

/// A boot configuration the instance should have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSpec {
    /// Label, unique within the instance.
    pub label: String,
    /// Kernel identifier.
    #[serde(default = "default_kernel")]
    pub kernel: String,
    /// Init run level.
    #[serde(default)]
    pub run_level: RunLevel,
    /// Virtualization mode.
    #[serde(default)]
    pub virt_mode: VirtMode,
    /// Root device path.
    #[serde(default = "default_root_device")]
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
    /// Declared device slots; omitted slots are empty.
    #[serde(default)]
    pub devices: BTreeMap<DeviceSlot, DeviceSpec>,
}

impl ConfigSpec {
    /// A configuration with default settings and no devices.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kernel: default_kernel(),
            run_level: RunLevel::default(),
            virt_mode: VirtMode::default(),
            root_device: default_root_device(),
            comments: String::new(),
            memory_limit: 0,
            helpers: ConfigHelpers::default(),
            devices: BTreeMap::new(),
        }
    }

    /// Declare a slot.
    #[must_use]
    pub fn with_device(mut self, slot: DeviceSlot, spec: DeviceSpec) -> Self {
        self.devices.insert(slot, spec);
        self
    }

    /// Provider options for this configuration with already resolved devices.
    #[must_use]
    pub fn options(&self, devices: DeviceMap) -> ConfigOptions {
        ConfigOptions {
            label: self.label.clone(),
            kernel: self.kernel.clone(),
            run_level: self.run_level,
            virt_mode: self.virt_mode,
            root_device: self.root_device.clone(),
            comments: self.comments.clone(),
            memory_limit: self.memory_limit,
            helpers: self.helpers,
            devices,
        }
    }
}

/// The shape an instance should be reconciled to.
///
/// Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredInstance {
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Plan identifier.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    /// Grow the biggest disk into free allowance after a plan change.
    #[serde(default)]
    pub resize_disk: bool,
    /// Disks, addressed by label.
    #[serde(default)]
    pub disks: Vec<DesiredDisk>,
    /// Boot configurations, addressed by label.
    #[serde(default)]
    pub configs: Vec<ConfigSpec>,
}

impl DesiredInstance {
    /// Reject repeated disk or configuration labels.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::DuplicateLabel` for the first repeated label.
    pub fn check_labels(&self, instance_id: InstanceId) -> Result<()> {
        check_unique(instance_id, self.disks.iter().map(|d| d.label.as_str()))?;
        check_unique(instance_id, self.configs.iter().map(|c| c.label.as_str()))
    }

    /// Find a desired disk by label.
    #[must_use]
    pub fn disk(&self, label: &str) -> Option<&DesiredDisk> {
        self.disks.iter().find(|d| d.label == label)
    }
}

fn check_unique<'a>(
    instance_id: InstanceId,
    labels: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label) {
            return Err(ReconcileError::DuplicateLabel {
                instance_id,
                label: label.to_string(),
            });
        }
    }
    Ok(())
}
