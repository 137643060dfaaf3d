//! Reconciling an instance to its desired shape.
//!
//! One pass reads provider state, validates the desired shape against it,
//! then issues mutations strictly one at a time, waiting for each
//! asynchronous action before the next call:
//!
//! 1. rename
//! 2. plan change, with optional disk expansion
//! 3. create missing disks, grow disks declared larger
//! 4. with `resize_disk`, grow the biggest disk into allowance still free,
//!    which picks up an expansion an earlier pass did not finish
//! 5. create or update boot configurations, with device labels resolved
//!    against a fresh disk list
//! 6. re-read and flatten
//!
//! Errors end the pass. Nothing is retried; running the pass again picks up
//! from whatever state the provider reports.

use std::time::Duration;

use shape_core::{Disk, EntityRef, EventAction, Instance, InstanceType};
use shape_provider::ComputeProvider;

use crate::accounting::{check_capacity, check_disk_resize, expansion_target, total_disk_size};
use crate::error::Result;
use crate::flatten::{authorized_keys_state, flatten_instance, hash_secret, InstanceState};
use crate::orchestrator::{ResizeOrchestrator, ResizeRequest};
use crate::resolver::{resolve_devices, DiskLabelIndex};
use crate::types::{DesiredInstance, Timeouts};
use crate::waiter::{issue_floor, PendingAction, Waiter};

/// Reconciles instances against a provider.
pub struct Reconciler<'a, P: ?Sized> {
    provider: &'a P,
    poll_interval: Duration,
}

impl<'a, P: ComputeProvider + ?Sized> Reconciler<'a, P> {
    /// Create a reconciler polling events every `poll_interval`.
    pub const fn new(provider: &'a P, poll_interval: Duration) -> Self {
        Self {
            provider,
            poll_interval,
        }
    }

    /// Bring `current` to the `desired` shape and return the resulting state.
    ///
    /// # Errors
    ///
    /// - `DuplicateLabel`, `InvalidResize` or `InsufficientCapacity` when the
    ///   desired shape is invalid; nothing is issued in that case
    /// - `InstanceBusy` if a plan change is needed while the instance is busy
    /// - `LabelNotFound` for a device label no disk carries
    /// - `AsyncTimeout` or `ProviderOperationFailed` when an action does not
    ///   finish
    /// - `Provider` for rejected calls
    pub async fn reconcile(
        &self,
        desired: &DesiredInstance,
        current: &Instance,
        timeouts: &Timeouts,
    ) -> Result<InstanceState> {
        let instance_id = current.id;
        tracing::info!(instance_id = %instance_id, "Reconciling instance");

        // Validate everything before the first mutation
        desired.check_labels(instance_id)?;
        let disks = self.provider.list_disks(instance_id).await?;
        let target_type = desired.type_id.as_deref().unwrap_or(&current.type_id);
        let plan = self.provider.get_instance_type(target_type).await?;
        let required = required_storage(desired, current, &disks)?;
        check_capacity(instance_id, &plan.id, plan.disk, required)?;

        let mut instance = current.clone();

        if let Some(label) = desired.label.as_deref().filter(|l| *l != current.label) {
            instance = self
                .provider
                .update_instance_label(instance_id, label)
                .await?;
        }

        if instance.type_id != plan.id {
            let request = ResizeRequest::new(plan.id.clone(), timeouts.update)
                .auto_expand(desired.resize_disk)
                .reserve(required.saturating_sub(total_disk_size(&disks)));
            let outcome = ResizeOrchestrator::new(self.provider, self.poll_interval)
                .resize(&instance, &request)
                .await?;
            instance = outcome.instance;
        }

        self.apply_disks(desired, &instance, timeouts).await?;
        if desired.resize_disk && desired.type_id.is_some() {
            self.fill_allowance(&instance, &plan, timeouts).await?;
        }
        self.apply_configs(desired, &instance).await?;

        let instance = self.provider.get_instance(instance_id).await?;
        let disks = self.provider.list_disks(instance_id).await?;
        let configs = self.provider.list_configs(instance_id).await?;
        let mut state = flatten_instance(&instance, &disks, &configs);
        record_secrets(&mut state, desired);

        tracing::info!(
            instance_id = %instance_id,
            type_id = %state.type_id,
            storage_utilized = state.storage_utilized,
            "Instance reconciled"
        );
        Ok(state)
    }

    async fn apply_disks(
        &self,
        desired: &DesiredInstance,
        instance: &Instance,
        timeouts: &Timeouts,
    ) -> Result<()> {
        let instance_id = instance.id;
        let entity = EntityRef::linode(instance_id.get());
        let waiter = Waiter::new(self.provider, self.poll_interval);
        let disks = self.provider.list_disks(instance_id).await?;
        let index = DiskLabelIndex::build(&disks);

        for want in &desired.disks {
            match index
                .get(&want.label)
                .and_then(|id| disks.iter().find(|d| d.id == id))
            {
                Some(disk) if want.size > disk.size => {
                    tracing::info!(
                        instance_id = %instance_id,
                        disk_id = %disk.id,
                        from_mb = disk.size,
                        to_mb = want.size,
                        "Growing disk"
                    );
                    let since = issue_floor();
                    self.provider
                        .resize_disk(instance_id, disk.id, want.size)
                        .await?;
                    waiter
                        .wait_for(
                            &PendingAction::new(
                                entity,
                                EventAction::DiskResize,
                                since,
                                timeouts.update,
                            )
                            .with_secondary(EntityRef::disk(disk.id.get())),
                        )
                        .await?;
                }
                // Disk already at or above the declared size
                Some(_) => {}
                None => {
                    let created = self
                        .provider
                        .create_disk(instance_id, &want.create_options())
                        .await?;
                    waiter
                        .wait_for(
                            &PendingAction::new(
                                entity,
                                EventAction::DiskCreate,
                                created.created,
                                timeouts.create,
                            )
                            .with_secondary(EntityRef::disk(created.id.get())),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn fill_allowance(
        &self,
        instance: &Instance,
        plan: &InstanceType,
        timeouts: &Timeouts,
    ) -> Result<()> {
        let instance_id = instance.id;
        let disks = self.provider.list_disks(instance_id).await?;
        let Some(target) = expansion_target(&disks, plan.disk) else {
            return Ok(());
        };

        tracing::info!(
            instance_id = %instance_id,
            disk_id = %target.disk_id,
            from_mb = target.from_mb,
            to_mb = target.to_mb,
            "Growing disk into free allowance"
        );
        let since = issue_floor();
        self.provider
            .resize_disk(instance_id, target.disk_id, target.to_mb)
            .await?;
        Waiter::new(self.provider, self.poll_interval)
            .wait_for(
                &PendingAction::new(
                    EntityRef::linode(instance_id.get()),
                    EventAction::DiskResize,
                    since,
                    timeouts.update,
                )
                .with_secondary(EntityRef::disk(target.disk_id.get())),
            )
            .await?;
        Ok(())
    }

    async fn apply_configs(&self, desired: &DesiredInstance, instance: &Instance) -> Result<()> {
        if desired.configs.is_empty() {
            return Ok(());
        }
        let instance_id = instance.id;

        // Disks may have been created above; resolve against what exists now
        let disks = self.provider.list_disks(instance_id).await?;
        let index = DiskLabelIndex::build(&disks);
        let configs = self.provider.list_configs(instance_id).await?;

        for spec in &desired.configs {
            let devices = resolve_devices(instance_id, &spec.label, &spec.devices, &index)?;
            let options = spec.options(devices);
            match configs.iter().find(|c| c.label == spec.label) {
                Some(existing) if options.matches(existing) => {
                    tracing::debug!(
                        instance_id = %instance_id,
                        config_id = %existing.id,
                        "Boot config up to date"
                    );
                }
                Some(existing) => {
                    self.provider
                        .update_config(instance_id, existing.id, &options)
                        .await?;
                }
                None => {
                    self.provider.create_config(instance_id, &options).await?;
                }
            }
        }
        Ok(())
    }
}

/// Total disk size once the desired disks are in place.
///
/// Disks not named in the desired shape keep their size. Declared
/// existing disks may only grow; with `resize_disk` the declared size is a
/// floor, so a disk expanded past it keeps its size.
fn required_storage(
    desired: &DesiredInstance,
    current: &Instance,
    disks: &[Disk],
) -> Result<u64> {
    let index = DiskLabelIndex::build(disks);
    let mut required = 0;
    for disk in disks {
        let size = match desired.disk(&disk.label) {
            // Only the disk a label resolves to is managed by it
            Some(want) if index.get(&disk.label) == Some(disk.id) => {
                if desired.resize_disk && disk.size > want.size {
                    disk.size
                } else {
                    check_disk_resize(current.id, disk, want.size)?;
                    want.size
                }
            }
            _ => disk.size,
        };
        required += size;
    }
    required += desired
        .disks
        .iter()
        .filter(|d| index.get(&d.label).is_none())
        .map(|d| d.size)
        .sum::<u64>();
    Ok(required)
}

fn record_secrets(state: &mut InstanceState, desired: &DesiredInstance) {
    for disk in &mut state.disks {
        if let Some(want) = desired.disk(&disk.label) {
            disk.root_pass = want.root_pass.as_deref().map(hash_secret);
            if !want.authorized_keys.is_empty() {
                disk.authorized_keys = Some(authorized_keys_state(&want.authorized_keys));
            }
        }
    }
}
