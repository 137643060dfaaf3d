//! Core types and utilities for instance-shape.
//!
//! This crate provides the domain model shared by the provider client and the
//! reconciliation engine:
//!
//! - **Identifiers**: strongly-typed numeric IDs for instances, disks, boot
//!   configurations, volumes and events
//! - **Instances and plans**: [`Instance`], [`InstanceType`] and their specs
//! - **Storage**: [`Disk`] and its [`Filesystem`] kind
//! - **Boot configurations**: [`BootConfig`] with its fixed eight-slot
//!   [`DeviceMap`]
//! - **Events**: [`Event`] records reported for asynchronous provider actions
//! - **Secret state**: digests for credentials that cannot be read back
//!
//! The types deserialize directly from Linode API v4 payloads.
//!
//! # Example
//!
//! ```
//! use shape_core::{DeviceMap, DeviceSlot, DeviceTarget, DiskId};
//!
//! let mut devices = DeviceMap::default();
//! devices.set(DeviceSlot::Sda, Some(DeviceTarget::Disk(DiskId::new(42))));
//!
//! assert_eq!(devices.get(DeviceSlot::Sda), Some(DeviceTarget::Disk(DiskId::new(42))));
//! assert!(devices.get(DeviceSlot::Sdb).is_none());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod disk;
pub mod error;
pub mod event;
pub mod ids;
pub mod instance;
pub mod secret;
pub mod time;

pub use config::{BootConfig, ConfigHelpers, DeviceMap, DeviceSlot, DeviceTarget, RunLevel, VirtMode};
pub use disk::{Disk, DiskStatus, Filesystem};
pub use error::{CoreError, Result};
pub use event::{EntityKind, EntityRef, Event, EventAction, EventStatus};
pub use ids::{ConfigId, DiskId, EventId, IdError, InstanceId, VolumeId};
pub use instance::{Instance, InstanceAlerts, InstanceSpecs, InstanceStatus, InstanceType};
