//! Plan resizes of running instances.
//!
//! A resize is two asynchronous steps that must never overlap: the plan
//! change, then optionally growing the biggest disk into the new allowance.
//! The second step is decided only after the first has finished, against the
//! disks as they are then and the allowance of the target plan.

use std::time::Duration;

use shape_core::{EntityRef, EventAction, Instance};
use shape_provider::ComputeProvider;

use crate::accounting::{check_capacity, expansion_target, total_disk_size, DiskExpansion};
use crate::error::{ReconcileError, Result};
use crate::phase::{PhaseTracker, ResizePhase};
use crate::waiter::{issue_floor, PendingAction, Waiter};

/// A request to move an instance to another plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeRequest {
    /// Plan to move to.
    pub target_type: String,
    /// Grow the biggest disk into free allowance afterwards.
    pub auto_expand: bool,
    /// Allowance to leave free for disks created or grown later, in MB.
    pub reserved_mb: u64,
    /// Bound for each asynchronous step.
    pub timeout: Duration,
}

impl ResizeRequest {
    /// Resize to `target_type` without disk expansion.
    #[must_use]
    pub fn new(target_type: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target_type: target_type.into(),
            auto_expand: false,
            reserved_mb: 0,
            timeout,
        }
    }

    /// Enable or disable disk expansion.
    #[must_use]
    pub const fn auto_expand(mut self, enabled: bool) -> Self {
        self.auto_expand = enabled;
        self
    }

    /// Leave `mb` of the new allowance unused by the expansion.
    #[must_use]
    pub const fn reserve(mut self, mb: u64) -> Self {
        self.reserved_mb = mb;
        self
    }
}

/// What a resize did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeOutcome {
    /// The instance after the resize.
    pub instance: Instance,
    /// False when the instance already was on the target plan.
    pub resized: bool,
    /// The disk growth performed, if any.
    pub expansion: Option<DiskExpansion>,
}

/// Drives resizes through their phases, one asynchronous step at a time.
pub struct ResizeOrchestrator<'a, P: ?Sized> {
    provider: &'a P,
    waiter: Waiter<'a, P>,
}

impl<'a, P: ComputeProvider + ?Sized> ResizeOrchestrator<'a, P> {
    /// Create an orchestrator polling events every `poll_interval`.
    pub const fn new(provider: &'a P, poll_interval: Duration) -> Self {
        Self {
            provider,
            waiter: Waiter::new(provider, poll_interval),
        }
    }

    /// Resize `current` as requested.
    ///
    /// Nothing is issued when the instance is already on the target plan,
    /// including the expansion. An expansion that failed after the plan
    /// change is left to the caller; [`Reconciler`](crate::Reconciler) grows
    /// the disk on a later pass when `resize_disk` is set.
    ///
    /// # Errors
    ///
    /// - `InstanceBusy` if the instance is mid-operation
    /// - `InsufficientCapacity` if the current disks exceed the target plan
    /// - `AsyncTimeout` or `ProviderOperationFailed` if a step does not finish
    /// - `Provider` for rejected calls
    pub async fn resize(&self, current: &Instance, request: &ResizeRequest) -> Result<ResizeOutcome> {
        let instance_id = current.id;

        if current.type_id == request.target_type {
            tracing::debug!(
                instance_id = %instance_id,
                target_type = %request.target_type,
                "Instance already on target plan"
            );
            return Ok(ResizeOutcome {
                instance: current.clone(),
                resized: false,
                expansion: None,
            });
        }

        if current.status.is_transitional() {
            return Err(ReconcileError::InstanceBusy {
                instance_id,
                status: current.status,
            });
        }

        let plan = self.provider.get_instance_type(&request.target_type).await?;
        let disks = self.provider.list_disks(instance_id).await?;
        check_capacity(
            instance_id,
            &plan.id,
            plan.disk,
            total_disk_size(&disks) + request.reserved_mb,
        )?;

        let mut tracker = PhaseTracker::new(instance_id);
        let entity = EntityRef::linode(instance_id.get());

        tracker.advance(ResizePhase::TypeResizeRequested)?;
        tracing::info!(
            instance_id = %instance_id,
            from = %current.type_id,
            to = %plan.id,
            "Resizing instance"
        );
        let since = issue_floor();
        self.provider.resize_instance(instance_id, &plan.id).await?;
        tracker.advance(ResizePhase::TypeResizeWaiting)?;
        self.waiter
            .wait_for(&PendingAction::new(
                entity,
                EventAction::LinodeResize,
                since,
                request.timeout,
            ))
            .await?;

        let mut expansion = None;
        if request.auto_expand {
            let disks = self.provider.list_disks(instance_id).await?;
            let allowance = plan.disk.saturating_sub(request.reserved_mb);
            if let Some(target) = expansion_target(&disks, allowance) {
                tracker.advance(ResizePhase::DiskExpansionRequested)?;
                tracing::info!(
                    instance_id = %instance_id,
                    disk_id = %target.disk_id,
                    from_mb = target.from_mb,
                    to_mb = target.to_mb,
                    "Expanding disk into new allowance"
                );
                let since = issue_floor();
                self.provider
                    .resize_disk(instance_id, target.disk_id, target.to_mb)
                    .await?;
                tracker.advance(ResizePhase::DiskExpansionWaiting)?;
                self.waiter
                    .wait_for(
                        &PendingAction::new(
                            entity,
                            EventAction::DiskResize,
                            since,
                            request.timeout,
                        )
                        .with_secondary(EntityRef::disk(target.disk_id.get())),
                    )
                    .await?;
                expansion = Some(target);
            }
        }
        tracker.advance(ResizePhase::Idle)?;

        let instance = self.provider.get_instance(instance_id).await?;
        Ok(ResizeOutcome {
            instance,
            resized: true,
            expansion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shape_core::{Filesystem, InstanceStatus, InstanceType};
    use shape_provider::mock::fixtures;
    use shape_provider::{ActionBehavior, MockProvider, ProviderCall};

    const POLL: Duration = Duration::from_millis(300);
    const TIMEOUT: Duration = Duration::from_secs(60);

    fn setup(plan: &InstanceType) -> (MockProvider, Instance) {
        let provider = MockProvider::new();
        let instance = fixtures::instance(1, plan);
        provider.add_instance(instance.clone());
        (provider, instance)
    }

    #[tokio::test(start_paused = true)]
    async fn resize_then_expand_in_order() {
        let (provider, instance) = setup(&fixtures::nanode());
        let boot = provider.add_disk(instance.id, "boot", Filesystem::Ext4, 25_088);
        provider.add_disk(instance.id, "swap", Filesystem::Swap, 512);
        provider.clear_calls();

        let outcome = ResizeOrchestrator::new(&provider, POLL)
            .resize(
                &instance,
                &ResizeRequest::new("g6-standard-1", TIMEOUT).auto_expand(true),
            )
            .await
            .unwrap();

        assert!(outcome.resized);
        assert_eq!(outcome.instance.type_id, "g6-standard-1");
        assert_eq!(
            outcome.expansion,
            Some(DiskExpansion {
                disk_id: boot,
                from_mb: 25_088,
                to_mb: 50_688,
            })
        );

        let calls = provider.calls();
        let resize_at = calls
            .iter()
            .position(|c| matches!(c, ProviderCall::ResizeInstance(..)))
            .unwrap();
        let wait_at = calls
            .iter()
            .position(|c| *c == ProviderCall::ListEvents(EventAction::LinodeResize))
            .unwrap();
        let disk_at = calls
            .iter()
            .position(|c| matches!(c, ProviderCall::ResizeDisk(..)))
            .unwrap();
        assert!(resize_at < wait_at && wait_at < disk_at);
        assert_eq!(
            provider.mutating_calls(),
            vec![
                ProviderCall::ResizeInstance(instance.id, "g6-standard-1".into()),
                ProviderCall::ResizeDisk(instance.id, boot, 50_688),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_expansion_unless_requested() {
        let (provider, instance) = setup(&fixtures::nanode());
        provider.add_disk(instance.id, "boot", Filesystem::Ext4, 25_600);

        let outcome = ResizeOrchestrator::new(&provider, POLL)
            .resize(&instance, &ResizeRequest::new("g6-standard-1", TIMEOUT))
            .await
            .unwrap();
        assert!(outcome.expansion.is_none());
        assert_eq!(provider.disks(instance.id)[0].size, 25_600);
    }

    #[tokio::test(start_paused = true)]
    async fn reserved_space_is_left_free() {
        let (provider, instance) = setup(&fixtures::nanode());
        provider.add_disk(instance.id, "boot", Filesystem::Ext4, 25_600);

        let outcome = ResizeOrchestrator::new(&provider, POLL)
            .resize(
                &instance,
                &ResizeRequest::new("g6-standard-1", TIMEOUT)
                    .auto_expand(true)
                    .reserve(1_024),
            )
            .await
            .unwrap();
        assert_eq!(outcome.expansion.unwrap().to_mb, 50_176);
    }

    #[tokio::test(start_paused = true)]
    async fn same_plan_is_a_no_op() {
        let (provider, instance) = setup(&fixtures::nanode());
        provider.clear_calls();
        let outcome = ResizeOrchestrator::new(&provider, POLL)
            .resize(&instance, &ResizeRequest::new("g6-nanode-1", TIMEOUT))
            .await
            .unwrap();
        assert!(!outcome.resized);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn downsize_below_usage_is_rejected_before_any_call() {
        let (provider, instance) = setup(&fixtures::standard_1());
        provider.add_disk(instance.id, "boot", Filesystem::Ext4, 40_000);

        let err = ResizeOrchestrator::new(&provider, POLL)
            .resize(&instance, &ResizeRequest::new("g6-nanode-1", TIMEOUT))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InsufficientCapacity {
                allowance_mb: 25_600,
                required_mb: 40_000,
                ..
            }
        ));
        assert!(provider.mutating_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn busy_instance_is_refused() {
        let (provider, mut instance) = setup(&fixtures::nanode());
        instance.status = InstanceStatus::Migrating;

        let err = ResizeOrchestrator::new(&provider, POLL)
            .resize(&instance, &ResizeRequest::new("g6-standard-1", TIMEOUT))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InstanceBusy { .. }));
        assert!(provider.mutating_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn type_resize_timeout_stops_before_disk_step() {
        let (provider, instance) = setup(&fixtures::nanode());
        provider.add_disk(instance.id, "boot", Filesystem::Ext4, 25_600);
        provider.set_behavior(EventAction::LinodeResize, ActionBehavior::Never);

        let err = ResizeOrchestrator::new(&provider, POLL)
            .resize(
                &instance,
                &ResizeRequest::new("g6-standard-1", Duration::from_secs(10)).auto_expand(true),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::AsyncTimeout {
                action: EventAction::LinodeResize,
                ..
            }
        ));
        assert!(!provider
            .calls()
            .iter()
            .any(|c| matches!(c, ProviderCall::ResizeDisk(..))));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_disk_expansion_surfaces_disk_action() {
        let (provider, instance) = setup(&fixtures::nanode());
        provider.add_disk(instance.id, "boot", Filesystem::Ext4, 25_600);
        provider.set_behavior(
            EventAction::DiskResize,
            ActionBehavior::Fail("resize failed".into()),
        );

        let err = ResizeOrchestrator::new(&provider, POLL)
            .resize(
                &instance,
                &ResizeRequest::new("g6-standard-1", TIMEOUT).auto_expand(true),
            )
            .await
            .unwrap_err();
        assert_eq!(err.action(), "disk_resize");
        // The plan change stands; the failed expansion left the disk alone
        assert_eq!(provider.instance(instance.id).unwrap().type_id, "g6-standard-1");
        assert_eq!(provider.disks(instance.id)[0].size, 25_600);
    }
}
