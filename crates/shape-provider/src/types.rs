//! Request payloads and query types for provider operations.

use std::collections::BTreeMap;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use shape_core::{
    BootConfig, ConfigHelpers, DeviceMap, EntityRef, Event, EventAction, Filesystem, RunLevel,
    VirtMode,
};

/// Options for creating a disk on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDiskOptions {
    /// Label, unique within the instance.
    pub label: String,
    /// Filesystem to format the disk with.
    pub filesystem: Filesystem,
    /// Size in MB.
    pub size: u64,
    /// Image to deploy onto the disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Root password for the deployed image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_pass: Option<String>,
    /// SSH public keys installed for root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorized_keys: Vec<String>,
    /// StackScript to run on first boot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stackscript_id: Option<u64>,
    /// User-defined fields for the StackScript.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stackscript_data: BTreeMap<String, String>,
}

impl CreateDiskOptions {
    /// Options for an empty disk with no image.
    #[must_use]
    pub fn blank(label: impl Into<String>, filesystem: Filesystem, size: u64) -> Self {
        Self {
            label: label.into(),
            filesystem,
            size,
            image: None,
            root_pass: None,
            authorized_keys: Vec::new(),
            stackscript_id: None,
            stackscript_data: BTreeMap::new(),
        }
    }
}

/// Options for creating or replacing a boot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOptions {
    /// Label, unique within the instance.
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
    /// Memory limit in MB, zero for the plan maximum.
    pub memory_limit: u64,
    /// Boot helper toggles.
    pub helpers: ConfigHelpers,
    /// Resolved device slots.
    pub devices: DeviceMap,
}

impl ConfigOptions {
    /// Returns true when applying these options would leave `config` unchanged.
    #[must_use]
    pub fn matches(&self, config: &BootConfig) -> bool {
        self.label == config.label
            && self.kernel == config.kernel
            && self.run_level == config.run_level
            && self.virt_mode == config.virt_mode
            && self.root_device == config.root_device
            && self.comments == config.comments
            && self.memory_limit == config.memory_limit
            && self.helpers == config.helpers
            && self.devices == config.devices
    }
}

impl From<&BootConfig> for ConfigOptions {
    fn from(config: &BootConfig) -> Self {
        Self {
            label: config.label.clone(),
            kernel: config.kernel.clone(),
            run_level: config.run_level,
            virt_mode: config.virt_mode,
            root_device: config.root_device.clone(),
            comments: config.comments.clone(),
            memory_limit: config.memory_limit,
            helpers: config.helpers,
            devices: config.devices,
        }
    }
}

/// Selects the events produced by one asynchronous action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    /// Entity the action was performed on.
    pub entity: EntityRef,
    /// Action kind.
    pub action: EventAction,
    /// Secondary entity the event must carry, when it carries one.
    pub secondary: Option<EntityRef>,
    /// Earliest creation time, truncated to the provider's one-second
    /// resolution.
    pub since: DateTime<Utc>,
}

impl EventFilter {
    /// Filter for `action` on `entity`, created at or after `since`.
    #[must_use]
    pub fn new(entity: EntityRef, action: EventAction, since: DateTime<Utc>) -> Self {
        Self {
            entity,
            action,
            secondary: None,
            since: since
                .duration_trunc(TimeDelta::seconds(1))
                .unwrap_or(since),
        }
    }

    /// Also require the given secondary entity.
    #[must_use]
    pub const fn with_secondary(mut self, secondary: EntityRef) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Returns true when `event` belongs to the action this filter selects.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if event.action != self.action || event.entity != Some(self.entity) {
            return false;
        }
        if event.created < self.since {
            return false;
        }
        match (self.secondary, event.secondary_entity) {
            (Some(want), Some(got)) => want == got,
            _ => true,
        }
    }

    /// The `X-Filter` header value the provider understands.
    #[must_use]
    pub fn to_x_filter(&self) -> serde_json::Value {
        json!({
            "entity.id": self.entity.id,
            "entity.type": self.entity.kind.as_str(),
            "action": self.action.as_str(),
            "created": { "+gte": shape_core::time::format(&self.since) },
            "+order_by": "created",
            "+order": "desc",
        })
    }
}

/// One page of a paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Current page number, starting at one.
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
    /// Total number of items across all pages.
    #[serde(default)]
    pub results: u32,
}
