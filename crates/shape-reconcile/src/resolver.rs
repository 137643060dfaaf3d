//! Device reference resolution.
//!
//! Boot configuration slots can be declared by disk label instead of disk ID,
//! because a disk's ID is unknown until the provider creates it. Labels are
//! resolved against a [`DiskLabelIndex`] built from the instance's current
//! disks immediately before resolving; the index is never cached across
//! mutations.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use shape_core::{
    DeviceMap, DeviceSlot, DeviceTarget, Disk, DiskId, InstanceId, VolumeId,
};

use crate::error::{ReconcileError, Result};

/// Label to disk ID lookup for one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskLabelIndex {
    by_label: HashMap<String, DiskId>,
}

impl DiskLabelIndex {
    /// Build the index from disks in provider order.
    ///
    /// If two disks share a label, the first one wins.
    #[must_use]
    pub fn build(disks: &[Disk]) -> Self {
        let mut by_label = HashMap::with_capacity(disks.len());
        for disk in disks {
            by_label.entry(disk.label.clone()).or_insert(disk.id);
        }
        Self { by_label }
    }

    /// Look up a disk by label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<DiskId> {
        self.by_label.get(label).copied()
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    /// Returns true when the instance has no disks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

/// Declared contents of one device slot.
///
/// Zero IDs count as absent, matching how unset numeric attributes arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Explicit disk ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<DiskId>,
    /// Explicit volume ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<VolumeId>,
    /// Label of a disk on the same instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_label: Option<String>,
}

impl DeviceSpec {
    /// Slot holding the disk with `label`.
    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            disk_label: Some(label.into()),
            ..Self::default()
        }
    }

    /// Slot holding disk `id`.
    #[must_use]
    pub fn disk(id: DiskId) -> Self {
        Self {
            disk_id: Some(id),
            ..Self::default()
        }
    }

    /// Slot holding volume `id`.
    #[must_use]
    pub fn volume(id: VolumeId) -> Self {
        Self {
            volume_id: Some(id),
            ..Self::default()
        }
    }
}

/// Resolve one slot.
///
/// An explicit non-zero disk ID wins over a volume ID, and either wins over a
/// label. A spec with none of them leaves the slot empty.
///
/// # Errors
///
/// Returns `ReconcileError::LabelNotFound` if the label is not in `index`.
pub fn resolve_slot(
    instance_id: InstanceId,
    config_label: &str,
    slot: DeviceSlot,
    spec: &DeviceSpec,
    index: &DiskLabelIndex,
) -> Result<Option<DeviceTarget>> {
    if let Some(id) = spec.disk_id.filter(|id| id.get() != 0) {
        return Ok(Some(DeviceTarget::Disk(id)));
    }
    if let Some(id) = spec.volume_id.filter(|id| id.get() != 0) {
        return Ok(Some(DeviceTarget::Volume(id)));
    }
    match spec.disk_label.as_deref().filter(|l| !l.is_empty()) {
        Some(label) => index
            .get(label)
            .map(|id| Some(DeviceTarget::Disk(id)))
            .ok_or_else(|| ReconcileError::LabelNotFound {
                instance_id,
                config_label: config_label.to_string(),
                slot,
                label: label.to_string(),
            }),
        None => Ok(None),
    }
}

/// Resolve every declared slot of a boot configuration.
///
/// Slots not present in `specs` are empty.
///
/// # Errors
///
/// Returns the first `ReconcileError::LabelNotFound`, in slot order.
pub fn resolve_devices(
    instance_id: InstanceId,
    config_label: &str,
    specs: &BTreeMap<DeviceSlot, DeviceSpec>,
    index: &DiskLabelIndex,
) -> Result<DeviceMap> {
    let mut devices = DeviceMap::default();
    for (slot, spec) in specs {
        let target = resolve_slot(instance_id, config_label, *slot, spec, index)?;
        devices.set(*slot, target);
    }
    Ok(devices)
}
