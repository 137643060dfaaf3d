//! Provider events.
//!
//! Mutating calls such as a plan resize return immediately; the provider
//! reports their progress as events on the account event stream.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::EventId;

/// An account event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Provider-assigned identifier.
    pub id: EventId,
    /// What happened.
    pub action: EventAction,
    /// The entity the action was performed on.
    pub entity: Option<EntityRef>,
    /// A second entity involved in the action (e.g. the disk of a disk resize).
    #[serde(default)]
    pub secondary_entity: Option<EntityRef>,
    /// Progress of the action.
    pub status: EventStatus,
    /// Completion percentage, when reported.
    #[serde(default)]
    pub percent_complete: Option<u8>,
    /// Provider message, usually set on failure.
    #[serde(default)]
    pub message: Option<String>,
    /// When the event was created.
    #[serde(with = "crate::time::provider")]
    pub created: DateTime<Utc>,
}

/// Actions this client waits on. Everything else maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Plan resize of an instance.
    LinodeResize,
    /// Disk creation.
    DiskCreate,
    /// Disk resize.
    DiskResize,
    /// Instance boot.
    LinodeBoot,
    /// Instance shutdown.
    LinodeShutdown,
    /// Boot configuration creation.
    LinodeConfigCreate,
    /// Boot configuration update.
    LinodeConfigUpdate,
    /// Any other action.
    #[serde(other)]
    Unknown,
}

impl EventAction {
    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinodeResize => "linode_resize",
            Self::DiskCreate => "disk_create",
            Self::DiskResize => "disk_resize",
            Self::LinodeBoot => "linode_boot",
            Self::LinodeShutdown => "linode_shutdown",
            Self::LinodeConfigCreate => "linode_config_create",
            Self::LinodeConfigUpdate => "linode_config_update",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of entity an event can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A compute instance.
    Linode,
    /// A disk of an instance.
    Disk,
    /// A block-storage volume.
    Volume,
    /// Any other entity type.
    #[serde(other)]
    Unknown,
}

impl EntityKind {
    /// Wire name of the entity kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linode => "linode",
            Self::Disk => "disk",
            Self::Volume => "volume",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to an entity inside an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Numeric identifier of the entity.
    #[serde(deserialize_with = "numeric_or_string")]
    pub id: u64,
    /// Entity kind.
    #[serde(rename = "type")]
    pub kind: EntityKind,
}

impl EntityRef {
    /// Reference an instance.
    #[must_use]
    pub const fn linode(id: u64) -> Self {
        Self {
            id,
            kind: EntityKind::Linode,
        }
    }

    /// Reference a disk.
    #[must_use]
    pub const fn disk(id: u64) -> Self {
        Self {
            id,
            kind: EntityKind::Disk,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

// Some entity types use string identifiers; those never match the numeric
// entities this client waits on, so they collapse to zero.
fn numeric_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s.parse().unwrap_or(0),
    })
}

/// Progress of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Queued.
    Scheduled,
    /// In progress.
    Started,
    /// Completed successfully.
    Finished,
    /// Completed unsuccessfully.
    Failed,
    /// Informational only.
    Notification,
    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl EventStatus {
    /// Returns true once the action has stopped running.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_disk_resize_event() {
        let event: Event = serde_json::from_str(
            r#"{
                "id": 123,
                "action": "disk_resize",
                "created": "2018-01-01T00:01:01",
                "entity": {"id": 11111, "label": "web-1", "type": "linode", "url": "/v4/linode/instances/11111"},
                "secondary_entity": {"id": "22222", "label": "boot", "type": "disk"},
                "percent_complete": 100,
                "status": "finished",
                "read": false,
                "seen": false
            }"#,
        )
        .unwrap();

        assert_eq!(event.action, EventAction::DiskResize);
        assert_eq!(event.entity, Some(EntityRef::linode(11111)));
        assert_eq!(event.secondary_entity, Some(EntityRef::disk(22222)));
        assert_eq!(event.status, EventStatus::Finished);
    }

    #[test]
    fn unknown_action_and_entity_are_tolerated() {
        let event: Event = serde_json::from_str(
            r#"{
                "id": 1,
                "action": "lke_node_create",
                "created": "2018-01-01T00:01:01",
                "entity": {"id": "abc", "type": "lkecluster"},
                "status": "started"
            }"#,
        )
        .unwrap();

        assert_eq!(event.action, EventAction::Unknown);
        assert_eq!(
            event.entity,
            Some(EntityRef {
                id: 0,
                kind: EntityKind::Unknown
            })
        );
        assert!(!event.status.is_terminal());
    }
}
