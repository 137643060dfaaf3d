//! Disk size accounting.
//!
//! The sum of an instance's disk sizes may never exceed its plan's storage
//! allowance. These helpers compute the aggregates and reject requests that
//! would break that rule or shrink a disk, before any provider call is made.

use shape_core::{Disk, DiskId, InstanceId};

use crate::error::{ReconcileError, Result};

/// Sum of all disk sizes in MB, swap included.
#[must_use]
pub fn total_disk_size(disks: &[Disk]) -> u64 {
    disks.iter().map(|d| d.size).sum()
}

/// The largest disk. Ties keep the first disk in provider order.
#[must_use]
pub fn biggest_disk(disks: &[Disk]) -> Option<&Disk> {
    disks.iter().fold(None, |biggest: Option<&Disk>, disk| match biggest {
        Some(b) if disk.size <= b.size => Some(b),
        _ => Some(disk),
    })
}

/// Reject a disk resize that would shrink the disk.
///
/// # Errors
///
/// Returns `ReconcileError::InvalidResize` if `requested_mb` is smaller than
/// the current size.
pub fn check_disk_resize(instance_id: InstanceId, disk: &Disk, requested_mb: u64) -> Result<()> {
    if requested_mb < disk.size {
        return Err(ReconcileError::InvalidResize {
            instance_id,
            disk_id: disk.id,
            current_mb: disk.size,
            requested_mb,
        });
    }
    Ok(())
}

/// Reject a disk layout that does not fit the plan.
///
/// # Errors
///
/// Returns `ReconcileError::InsufficientCapacity` if `required_mb` exceeds
/// `allowance_mb`.
pub fn check_capacity(
    instance_id: InstanceId,
    target_type: &str,
    allowance_mb: u64,
    required_mb: u64,
) -> Result<()> {
    if required_mb > allowance_mb {
        return Err(ReconcileError::InsufficientCapacity {
            instance_id,
            target_type: target_type.to_string(),
            allowance_mb,
            required_mb,
        });
    }
    Ok(())
}

/// A planned growth of one disk into free allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskExpansion {
    /// The disk to grow.
    pub disk_id: DiskId,
    /// Current size in MB.
    pub from_mb: u64,
    /// Size after growth in MB.
    pub to_mb: u64,
}

/// Plan growing the biggest disk by all free allowance.
///
/// Returns `None` when there are no disks or no free space.
#[must_use]
pub fn expansion_target(disks: &[Disk], allowance_mb: u64) -> Option<DiskExpansion> {
    let free = allowance_mb.checked_sub(total_disk_size(disks))?;
    if free == 0 {
        return None;
    }
    biggest_disk(disks).map(|disk| DiskExpansion {
        disk_id: disk.id,
        from_mb: disk.size,
        to_mb: disk.size + free,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shape_core::{DiskStatus, Filesystem};

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
    fn total_includes_swap() {
        let disks = [
            disk(1, "boot", Filesystem::Ext4, 25_088),
            disk(2, "swap", Filesystem::Swap, 512),
        ];
        assert_eq!(total_disk_size(&disks), 25_600);
        assert_eq!(total_disk_size(&[]), 0);
    }

    #[test]
    fn biggest_disk_ties_keep_first() {
        let disks = [
            disk(1, "a", Filesystem::Ext4, 1000),
            disk(2, "b", Filesystem::Ext4, 1000),
        ];
        assert_eq!(biggest_disk(&disks).unwrap().label, "a");

        let disks = [
            disk(1, "a", Filesystem::Ext4, 1000),
            disk(2, "b", Filesystem::Ext4, 1001),
        ];
        assert_eq!(biggest_disk(&disks).unwrap().label, "b");
        assert!(biggest_disk(&[]).is_none());
    }

    #[test]
    fn shrink_is_rejected() {
        let d = disk(3, "data", Filesystem::Ext4, 5000);
        let err = check_disk_resize(InstanceId::new(9), &d, 3000).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidResize {
                current_mb: 5000,
                requested_mb: 3000,
                ..
            }
        ));
        assert!(check_disk_resize(InstanceId::new(9), &d, 5000).is_ok());
        assert!(check_disk_resize(InstanceId::new(9), &d, 6000).is_ok());
    }

    #[test]
    fn capacity_check() {
        assert!(check_capacity(InstanceId::new(1), "g6-nanode-1", 25_600, 25_600).is_ok());
        let err = check_capacity(InstanceId::new(1), "g6-nanode-1", 25_600, 30_000).unwrap_err();
        assert!(matches!(err, ReconcileError::InsufficientCapacity { .. }));
    }

    #[test]
    fn single_disk_grows_to_allowance() {
        let disks = [disk(1, "boot", Filesystem::Ext4, 25_600)];
        let plan = expansion_target(&disks, 51_200).unwrap();
        assert_eq!(plan.disk_id, DiskId::new(1));
        assert_eq!(plan.to_mb, 51_200);
    }

    #[test]
    fn biggest_disk_takes_free_space_next_to_swap() {
        let disks = [
            disk(1, "boot", Filesystem::Ext4, 25_088),
            disk(2, "swap", Filesystem::Swap, 512),
        ];
        let plan = expansion_target(&disks, 51_200).unwrap();
        assert_eq!(plan.disk_id, DiskId::new(1));
        assert_eq!(plan.to_mb, 50_688);
    }

    #[test]
    fn no_expansion_without_free_space() {
        let disks = [disk(1, "boot", Filesystem::Ext4, 25_600)];
        assert!(expansion_target(&disks, 25_600).is_none());
        assert!(expansion_target(&disks, 20_000).is_none());
        assert!(expansion_target(&[], 51_200).is_none());
    }
}
