//! Compute instances and the plans they run on.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::InstanceId;

/// A compute instance as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider-assigned identifier.
    pub id: InstanceId,
    /// Display label, unique per account.
    pub label: String,
    /// Plan the instance runs on (e.g. `g6-nanode-1`).
    #[serde(rename = "type")]
    pub type_id: String,
    /// Datacenter region.
    pub region: String,
    /// Current power / lifecycle state.
    pub status: InstanceStatus,
    /// Free-form display group.
    #[serde(default)]
    pub group: String,
    /// Public and private IPv4 addresses.
    #[serde(default)]
    pub ipv4: Vec<Ipv4Addr>,
    /// Resources allocated by the current plan.
    pub specs: InstanceSpecs,
    /// Alert thresholds.
    #[serde(default)]
    pub alerts: InstanceAlerts,
    /// Creation timestamp.
    #[serde(with = "crate::time::provider")]
    pub created: DateTime<Utc>,
    /// Last modification timestamp.
    #[serde(with = "crate::time::provider")]
    pub updated: DateTime<Utc>,
}

impl Instance {
    /// First public IPv4 address, if any.
    #[must_use]
    pub fn public_ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4.iter().copied().find(|ip| !ip.is_private())
    }

    /// First RFC 1918 private IPv4 address, if any.
    #[must_use]
    pub fn private_ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4.iter().copied().find(Ipv4Addr::is_private)
    }
}

/// Resources allocated to an instance by its plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpecs {
    /// Storage allowance in MB.
    pub disk: u64,
    /// Memory in MB.
    pub memory: u64,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// Monthly network transfer quota in GB.
    pub transfer: u64,
}

/// Alert thresholds configured on an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAlerts {
    /// CPU usage percentage.
    pub cpu: u32,
    /// Disk IO operations per second.
    pub io: u32,
    /// Inbound traffic in Mbit/s.
    pub network_in: u32,
    /// Outbound traffic in Mbit/s.
    pub network_out: u32,
    /// Percentage of the transfer quota.
    pub transfer_quota: u32,
}

/// Power and lifecycle states of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Powered on.
    Running,
    /// Powered off.
    Offline,
    /// Boot in progress.
    Booting,
    /// Reboot in progress.
    Rebooting,
    /// Shutdown in progress.
    ShuttingDown,
    /// Initial provisioning in progress.
    Provisioning,
    /// Deletion in progress.
    Deleting,
    /// Host migration in progress.
    Migrating,
    /// Rebuild in progress.
    Rebuilding,
    /// Clone in progress.
    Cloning,
    /// Backup restore in progress.
    Restoring,
    /// Plan resize in progress.
    Resizing,
    /// Stopped by the provider.
    Stopped,
    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Returns true while the provider is running an operation that excludes
    /// other mutations of the same instance.
    #[must_use]
    pub const fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::Booting
                | Self::Rebooting
                | Self::ShuttingDown
                | Self::Provisioning
                | Self::Deleting
                | Self::Migrating
                | Self::Rebuilding
                | Self::Cloning
                | Self::Restoring
                | Self::Resizing
        )
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Offline => "offline",
            Self::Booting => "booting",
            Self::Rebooting => "rebooting",
            Self::ShuttingDown => "shutting_down",
            Self::Provisioning => "provisioning",
            Self::Deleting => "deleting",
            Self::Migrating => "migrating",
            Self::Rebuilding => "rebuilding",
            Self::Cloning => "cloning",
            Self::Restoring => "restoring",
            Self::Resizing => "resizing",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plan offered by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceType {
    /// Plan identifier (e.g. `g6-standard-1`).
    pub id: String,
    /// Human readable name.
    #[serde(default)]
    pub label: String,
    /// Storage allowance in MB.
    pub disk: u64,
    /// Memory in MB.
    pub memory: u64,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// Monthly network transfer quota in GB.
    #[serde(default)]
    pub transfer: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE_JSON: &str = r#"{
        "id": 123,
        "label": "web-1",
        "type": "g6-nanode-1",
        "region": "us-east",
        "status": "running",
        "group": "tf_test",
        "ipv4": ["45.79.1.2", "192.168.130.7"],
        "image": "linode/ubuntu18.04",
        "specs": {"disk": 25600, "memory": 1024, "vcpus": 1, "transfer": 1000, "gpus": 0},
        "alerts": {"cpu": 90, "io": 10000, "network_in": 10, "network_out": 10, "transfer_quota": 80},
        "created": "2018-01-01T00:01:01",
        "updated": "2018-01-02T00:01:01"
    }"#;

    #[test]
    fn deserializes_provider_payload() {
        let instance: Instance = serde_json::from_str(INSTANCE_JSON).unwrap();
        assert_eq!(instance.id, InstanceId::new(123));
        assert_eq!(instance.type_id, "g6-nanode-1");
        assert_eq!(instance.status, InstanceStatus::Running);
        assert_eq!(instance.specs.disk, 25600);
        assert_eq!(instance.alerts.transfer_quota, 80);
    }

    #[test]
    fn splits_public_and_private_addresses() {
        let instance: Instance = serde_json::from_str(INSTANCE_JSON).unwrap();
        assert_eq!(instance.public_ipv4(), Some(Ipv4Addr::new(45, 79, 1, 2)));
        assert_eq!(
            instance.private_ipv4(),
            Some(Ipv4Addr::new(192, 168, 130, 7))
        );
    }

    #[test]
    fn unknown_status_does_not_fail() {
        let status: InstanceStatus = serde_json::from_str("\"hibernating\"").unwrap();
        assert_eq!(status, InstanceStatus::Unknown);
    }

    #[test]
    fn transitional_states() {
        assert!(InstanceStatus::Resizing.is_transitional());
        assert!(InstanceStatus::Migrating.is_transitional());
        assert!(!InstanceStatus::Running.is_transitional());
        assert!(!InstanceStatus::Offline.is_transitional());
    }
}
