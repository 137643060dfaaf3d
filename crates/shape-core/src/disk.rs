//! Disks owned by an instance.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::DiskId;

/// A disk as reported by the provider.
///
/// Labels are unique within an instance; the reconciliation engine relies on
/// that to address disks declaratively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    /// Provider-assigned identifier.
    pub id: DiskId,
    /// Label, unique within the owning instance.
    pub label: String,
    /// Filesystem the disk was formatted with.
    pub filesystem: Filesystem,
    /// Size in MB.
    pub size: u64,
    /// Provider-side readiness.
    #[serde(default)]
    pub status: DiskStatus,
    /// Creation timestamp.
    #[serde(with = "crate::time::provider")]
    pub created: DateTime<Utc>,
    /// Last modification timestamp.
    #[serde(with = "crate::time::provider")]
    pub updated: DateTime<Utc>,
}

impl Disk {
    /// Returns true for swap disks.
    #[must_use]
    pub fn is_swap(&self) -> bool {
        self.filesystem == Filesystem::Swap
    }
}

/// Filesystem kinds a disk can be formatted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    /// Unformatted.
    Raw,
    /// Swap space; counted in storage but never bootable.
    Swap,
    /// ext3.
    Ext3,
    /// ext4.
    #[default]
    Ext4,
    /// Initial ramdisk image.
    Initrd,
}

impl Filesystem {
    /// Wire name of the filesystem.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Swap => "swap",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Initrd => "initrd",
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filesystem {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "swap" => Ok(Self::Swap),
            "ext3" => Ok(Self::Ext3),
            "ext4" => Ok(Self::Ext4),
            "initrd" => Ok(Self::Initrd),
            other => Err(CoreError::UnknownFilesystem(other.to_string())),
        }
    }
}

/// Provider-side readiness of a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DiskStatus {
    /// Usable.
    #[default]
    #[serde(rename = "ready")]
    Ready,
    /// Being created or resized.
    #[serde(rename = "not ready")]
    NotReady,
    /// Being deleted.
    #[serde(rename = "deleting")]
    Deleting,
}
