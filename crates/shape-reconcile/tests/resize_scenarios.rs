//! End-to-end resize scenarios against the in-memory provider.

use std::time::Duration;

use shape_core::{EventAction, Filesystem, InstanceId};
use shape_provider::mock::fixtures;
use shape_provider::{ActionBehavior, MockProvider, ProviderCall};
use shape_reconcile::{
    ConfigSpec, DesiredDisk, DesiredInstance, DeviceSpec, ReconcileError, Reconciler, Timeouts,
};

const POLL: Duration = Duration::from_millis(300);

fn nanode_with_boot_disk() -> (MockProvider, InstanceId) {
    let provider = MockProvider::new();
    provider.add_instance(fixtures::instance(1, &fixtures::nanode()));
    let id = InstanceId::new(1);
    provider.add_disk(id, "boot", Filesystem::Ext4, 25_600);
    provider.clear_calls();
    (provider, id)
}

fn upgrade(resize_disk: bool) -> DesiredInstance {
    DesiredInstance {
        type_id: Some("g6-standard-1".to_string()),
        resize_disk,
        ..DesiredInstance::default()
    }
}

#[tokio::test(start_paused = true)]
async fn upgrade_with_auto_expand_fills_new_allowance() {
    let (provider, id) = nanode_with_boot_disk();
    provider.set_behavior(EventAction::LinodeResize, ActionBehavior::FinishAfterPolls(4));
    provider.set_behavior(EventAction::DiskResize, ActionBehavior::FinishAfterPolls(2));
    let current = provider.instance(id).unwrap();

    let state = Reconciler::new(&provider, POLL)
        .reconcile(&upgrade(true), &current, &Timeouts::default())
        .await
        .unwrap();

    assert_eq!(state.type_id, "g6-standard-1");
    assert_eq!(state.storage, 51_200);
    assert_eq!(state.disk("boot").unwrap().size, 51_200);
    assert_eq!(state.storage_utilized, 51_200);
}

#[tokio::test(start_paused = true)]
async fn disk_resize_is_issued_only_after_type_resize_completes() {
    let (provider, id) = nanode_with_boot_disk();
    provider.set_behavior(EventAction::LinodeResize, ActionBehavior::FinishAfterPolls(3));
    let current = provider.instance(id).unwrap();

    Reconciler::new(&provider, POLL)
        .reconcile(&upgrade(true), &current, &Timeouts::default())
        .await
        .unwrap();

    let calls = provider.calls();
    let resize_at = calls
        .iter()
        .position(|c| matches!(c, ProviderCall::ResizeInstance(..)))
        .unwrap();
    let disk_at = calls
        .iter()
        .position(|c| matches!(c, ProviderCall::ResizeDisk(..)))
        .unwrap();
    let resize_polls = calls[resize_at..disk_at]
        .iter()
        .filter(|c| **c == ProviderCall::ListEvents(EventAction::LinodeResize))
        .count();
    // Three polls see `started`, the fourth sees `finished`
    assert_eq!(resize_polls, 4);
}

#[tokio::test(start_paused = true)]
async fn upgrade_without_auto_expand_keeps_disks() {
    let (provider, id) = nanode_with_boot_disk();
    let current = provider.instance(id).unwrap();

    let state = Reconciler::new(&provider, POLL)
        .reconcile(&upgrade(false), &current, &Timeouts::default())
        .await
        .unwrap();

    assert_eq!(state.storage, 51_200);
    assert_eq!(state.storage_utilized, 25_600);
    assert_eq!(
        provider.mutating_calls(),
        vec![ProviderCall::ResizeInstance(id, "g6-standard-1".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn resize_timeout_surfaces_and_stops() {
    let (provider, id) = nanode_with_boot_disk();
    provider.set_behavior(EventAction::LinodeResize, ActionBehavior::Never);
    let current = provider.instance(id).unwrap();
    let timeouts = Timeouts {
        update: Duration::from_secs(30),
        ..Timeouts::default()
    };

    let desired = DesiredInstance {
        configs: vec![ConfigSpec::new("default").with_device(
            shape_core::DeviceSlot::Sda,
            DeviceSpec::label("boot"),
        )],
        ..upgrade(true)
    };
    let err = Reconciler::new(&provider, POLL)
        .reconcile(&desired, &current, &timeouts)
        .await
        .unwrap_err();

    match &err {
        ReconcileError::AsyncTimeout {
            entity,
            action,
            timeout,
        } => {
            assert_eq!(entity.id, 1);
            assert_eq!(*action, EventAction::LinodeResize);
            assert_eq!(*timeout, Duration::from_secs(30));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retriable());
    // Nothing after the resize request
    assert_eq!(
        provider.mutating_calls(),
        vec![ProviderCall::ResizeInstance(id, "g6-standard-1".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn new_disk_space_is_reserved_during_expansion() {
    let (provider, id) = nanode_with_boot_disk();
    let current = provider.instance(id).unwrap();
    let desired = DesiredInstance {
        disks: vec![DesiredDisk::new("swap", Filesystem::Swap, 512)],
        configs: vec![ConfigSpec::new("default")
            .with_device(shape_core::DeviceSlot::Sda, DeviceSpec::label("boot"))
            .with_device(shape_core::DeviceSlot::Sdb, DeviceSpec::label("swap"))],
        ..upgrade(true)
    };

    let state = Reconciler::new(&provider, POLL)
        .reconcile(&desired, &current, &Timeouts::default())
        .await
        .unwrap();

    assert_eq!(state.disk("boot").unwrap().size, 50_688);
    assert_eq!(state.swap_size, 512);
    assert_eq!(state.storage_utilized, 51_200);
    let config = state.config("default").unwrap();
    assert_eq!(
        config.devices[&shape_core::DeviceSlot::Sdb].disk_id,
        state.disk("swap").unwrap().id.get()
    );
}

#[tokio::test(start_paused = true)]
async fn busy_instance_is_not_resized() {
    let (provider, id) = nanode_with_boot_disk();
    provider.set_status(id, shape_core::InstanceStatus::Resizing);
    let current = provider.instance(id).unwrap();

    let err = Reconciler::new(&provider, POLL)
        .reconcile(&upgrade(true), &current, &Timeouts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InstanceBusy { .. }));
    assert!(provider.mutating_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn expanded_disk_above_declared_size_is_stable_across_passes() {
    let (provider, id) = nanode_with_boot_disk();
    let desired = DesiredInstance {
        disks: vec![DesiredDisk::new("boot", Filesystem::Ext4, 25_600)],
        ..upgrade(true)
    };
    let reconciler = Reconciler::new(&provider, POLL);

    let first = reconciler
        .reconcile(&desired, &provider.instance(id).unwrap(), &Timeouts::default())
        .await
        .unwrap();
    assert_eq!(first.disk("boot").unwrap().size, 51_200);

    provider.clear_calls();
    let second = reconciler
        .reconcile(&desired, &provider.instance(id).unwrap(), &Timeouts::default())
        .await
        .unwrap();
    assert_eq!(second.disk("boot").unwrap().size, 51_200);
    assert!(provider.mutating_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_expansion_is_completed_by_next_pass() {
    let (provider, id) = nanode_with_boot_disk();
    provider.set_behavior(
        EventAction::DiskResize,
        ActionBehavior::Fail("disk busy".to_string()),
    );
    let reconciler = Reconciler::new(&provider, POLL);

    let err = reconciler
        .reconcile(&upgrade(true), &provider.instance(id).unwrap(), &Timeouts::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::ProviderOperationFailed {
            action: EventAction::DiskResize,
            ..
        }
    ));
    assert_eq!(provider.disks(id)[0].size, 25_600);

    provider.set_behavior(EventAction::DiskResize, ActionBehavior::Finish);
    provider.clear_calls();
    let state = reconciler
        .reconcile(&upgrade(true), &provider.instance(id).unwrap(), &Timeouts::default())
        .await
        .unwrap();

    assert_eq!(state.disk("boot").unwrap().size, 51_200);
    assert!(matches!(
        provider.mutating_calls().as_slice(),
        [ProviderCall::ResizeDisk(_, _, 51_200)]
    ));
}

#[tokio::test(start_paused = true)]
async fn provider_clock_behind_local_clock_still_completes() {
    let (provider, id) = nanode_with_boot_disk();
    provider.set_clock_offset(-10);
    let timeouts = Timeouts {
        update: Duration::from_secs(30),
        ..Timeouts::default()
    };

    let state = Reconciler::new(&provider, POLL)
        .reconcile(&upgrade(true), &provider.instance(id).unwrap(), &timeouts)
        .await
        .unwrap();
    assert_eq!(state.disk("boot").unwrap().size, 51_200);
}
