//! Error types for the reconciliation engine.
//!
//! Every variant names the entity it concerns and, through
//! [`ReconcileError::action`], the action that was being attempted.

use std::time::Duration;

use shape_core::{DeviceSlot, DiskId, EntityRef, EventAction, EventId, InstanceId, InstanceStatus};
use shape_provider::ProviderError;
use thiserror::Error;

use crate::phase::ResizePhase;

/// A result type using `ReconcileError`.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that can occur while reconciling an instance.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A device slot references a disk label the instance does not have.
    #[error(
        "instance {instance_id}: config {config_label:?} slot {slot} references unknown disk label {label:?}"
    )]
    LabelNotFound {
        /// The instance being reconciled.
        instance_id: InstanceId,
        /// Label of the boot configuration holding the slot.
        config_label: String,
        /// The slot being resolved.
        slot: DeviceSlot,
        /// The label that was not found.
        label: String,
    },

    /// A disk resize would shrink the disk.
    #[error(
        "instance {instance_id}: disk {disk_id} cannot shrink from {current_mb} MB to {requested_mb} MB"
    )]
    InvalidResize {
        /// The instance owning the disk.
        instance_id: InstanceId,
        /// The disk being resized.
        disk_id: DiskId,
        /// Current size in MB.
        current_mb: u64,
        /// Requested size in MB.
        requested_mb: u64,
    },

    /// The disks would not fit in the plan's storage allowance.
    #[error(
        "instance {instance_id}: plan {target_type} allows {allowance_mb} MB but disks need {required_mb} MB"
    )]
    InsufficientCapacity {
        /// The instance being reconciled.
        instance_id: InstanceId,
        /// The plan whose allowance was exceeded.
        target_type: String,
        /// Storage allowance of the plan in MB.
        allowance_mb: u64,
        /// Total disk size required in MB.
        required_mb: u64,
    },

    /// An asynchronous action did not finish in time.
    #[error("timed out after {timeout:?} waiting for {action} on {entity}")]
    AsyncTimeout {
        /// The entity the action was performed on.
        entity: EntityRef,
        /// The action that was awaited.
        action: EventAction,
        /// How long the wait lasted.
        timeout: Duration,
    },

    /// The provider reported an asynchronous action as failed.
    #[error("{action} on {entity} failed (event {event_id}): {message}")]
    ProviderOperationFailed {
        /// The entity the action was performed on.
        entity: EntityRef,
        /// The action that failed.
        action: EventAction,
        /// The failing event.
        event_id: EventId,
        /// Provider message, if any.
        message: String,
    },

    /// The instance is in the middle of another operation.
    #[error("instance {instance_id} is busy ({status})")]
    InstanceBusy {
        /// The busy instance.
        instance_id: InstanceId,
        /// Its current status.
        status: InstanceStatus,
    },

    /// Two desired disks or boot configurations share a label.
    #[error("instance {instance_id}: label {label:?} is used more than once")]
    DuplicateLabel {
        /// The instance being reconciled.
        instance_id: InstanceId,
        /// The repeated label.
        label: String,
    },

    /// The resize state machine was driven out of order.
    #[error("instance {instance_id}: invalid resize transition from {from} to {to}")]
    InvalidPhase {
        /// The instance being resized.
        instance_id: InstanceId,
        /// The current phase.
        from: ResizePhase,
        /// The requested phase.
        to: ResizePhase,
    },

    /// A provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl ReconcileError {
    /// Returns true if running the reconciliation again might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::AsyncTimeout { .. } | Self::InstanceBusy { .. } => true,
            Self::Provider(err) => err.is_retriable(),
            _ => false,
        }
    }

    /// The action that was being attempted, for log correlation.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::LabelNotFound { .. } => "device_resolve",
            Self::InvalidResize { .. } => "disk_resize",
            Self::InsufficientCapacity { .. } => "capacity_check",
            Self::AsyncTimeout { action, .. } | Self::ProviderOperationFailed { action, .. } => {
                action.as_str()
            }
            Self::InstanceBusy { .. } | Self::InvalidPhase { .. } => "linode_resize",
            Self::DuplicateLabel { .. } => "label_check",
            Self::Provider(_) => "provider_call",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_errors() {
        let timeout = ReconcileError::AsyncTimeout {
            entity: EntityRef::linode(1),
            action: EventAction::LinodeResize,
            timeout: Duration::from_secs(60),
        };
        assert!(timeout.is_retriable());

        let shrink = ReconcileError::InvalidResize {
            instance_id: InstanceId::new(1),
            disk_id: DiskId::new(2),
            current_mb: 5000,
            requested_mb: 3000,
        };
        assert!(!shrink.is_retriable());

        assert!(ReconcileError::Provider(ProviderError::Transport("reset".into())).is_retriable());
        assert!(!ReconcileError::Provider(ProviderError::NotFound("linode 1".into())).is_retriable());
    }

    #[test]
    fn actions_name_the_attempt() {
        let failed = ReconcileError::ProviderOperationFailed {
            entity: EntityRef::linode(1),
            action: EventAction::DiskResize,
            event_id: EventId::new(9),
            message: "disk busy".into(),
        };
        assert_eq!(failed.action(), "disk_resize");
        assert!(failed.to_string().contains("linode 1"));

        let busy = ReconcileError::InstanceBusy {
            instance_id: InstanceId::new(1),
            status: InstanceStatus::Migrating,
        };
        assert_eq!(busy.action(), "linode_resize");
    }

    #[test]
    fn messages_carry_entity_ids() {
        let err = ReconcileError::LabelNotFound {
            instance_id: InstanceId::new(42),
            config_label: "boot".into(),
            slot: DeviceSlot::Sdb,
            label: "data".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("sdb"));
        assert!(msg.contains("\"data\""));
    }
}
