//! The compute provider abstraction.
//!
//! Everything the reconciliation engine needs from the provider goes through
//! [`ComputeProvider`], so the engine can run against the HTTP client in
//! production and an in-memory mock in tests.

use async_trait::async_trait;
use shape_core::{
    BootConfig, ConfigId, Disk, DiskId, Event, Instance, InstanceId, InstanceType,
};

use crate::error::Result;
use crate::types::{ConfigOptions, CreateDiskOptions, EventFilter};

/// Operations on instances, their disks, boot configurations and events.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Fetch an instance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the instance does not exist.
    async fn get_instance(&self, id: InstanceId) -> Result<Instance>;

    /// Change an instance's display label.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the label.
    async fn update_instance_label(&self, id: InstanceId, label: &str) -> Result<Instance>;

    /// Fetch a plan by identifier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan.
    async fn get_instance_type(&self, type_id: &str) -> Result<InstanceType>;

    /// Move an instance to another plan.
    ///
    /// Returns once the provider accepts the request. Completion is reported
    /// by a `linode_resize` event.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the resize.
    async fn resize_instance(&self, id: InstanceId, type_id: &str) -> Result<()>;

    /// List all disks of an instance, in provider order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn list_disks(&self, id: InstanceId) -> Result<Vec<Disk>>;

    /// Create a disk.
    ///
    /// Completion is reported by a `disk_create` event.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the disk.
    async fn create_disk(&self, id: InstanceId, options: &CreateDiskOptions) -> Result<Disk>;

    /// Grow or shrink a disk to `size` MB.
    ///
    /// Completion is reported by a `disk_resize` event.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the resize.
    async fn resize_disk(&self, id: InstanceId, disk_id: DiskId, size: u64) -> Result<()>;

    /// List all boot configurations of an instance, in provider order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn list_configs(&self, id: InstanceId) -> Result<Vec<BootConfig>>;

    /// Create a boot configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the configuration.
    async fn create_config(&self, id: InstanceId, options: &ConfigOptions) -> Result<BootConfig>;

    /// Replace a boot configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the configuration.
    async fn update_config(
        &self,
        id: InstanceId,
        config_id: ConfigId,
        options: &ConfigOptions,
    ) -> Result<BootConfig>;

    /// List events matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>>;
}
