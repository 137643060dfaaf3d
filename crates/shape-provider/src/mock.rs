//! In-memory provider for tests.
//!
//! [`MockProvider`] keeps instances, plans, disks and boot configurations in
//! memory and emits events for asynchronous actions. How each action's event
//! progresses is controlled per action with [`ActionBehavior`]. Every call is
//! recorded so tests can assert on call order.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use shape_core::{
    BootConfig, ConfigId, DeviceMap, Disk, DiskId, DiskStatus, EntityRef, Event, EventAction,
    EventId, EventStatus, Filesystem, Instance, InstanceId, InstanceStatus, InstanceType,
};

use crate::error::{ProviderError, Result};
use crate::provider::ComputeProvider;
use crate::types::{ConfigOptions, CreateDiskOptions, EventFilter};

/// How the event of an asynchronous action progresses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionBehavior {
    /// The first poll sees the event finished.
    #[default]
    Finish,
    /// The event reports `started` for this many polls, then finishes.
    FinishAfterPolls(u32),
    /// The event fails with the given message. The action has no effect.
    Fail(String),
    /// The event never reaches a terminal state.
    Never,
}

/// A recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `get_instance`.
    GetInstance(InstanceId),
    /// `update_instance_label`.
    UpdateInstanceLabel(InstanceId, String),
    /// `get_instance_type`.
    GetInstanceType(String),
    /// `resize_instance`.
    ResizeInstance(InstanceId, String),
    /// `list_disks`.
    ListDisks(InstanceId),
    /// `create_disk` with label and size.
    CreateDisk(InstanceId, String, u64),
    /// `resize_disk`.
    ResizeDisk(InstanceId, DiskId, u64),
    /// `list_configs`.
    ListConfigs(InstanceId),
    /// `create_config` with label.
    CreateConfig(InstanceId, String),
    /// `update_config`.
    UpdateConfig(InstanceId, ConfigId),
    /// `list_events`.
    ListEvents(EventAction),
}

impl ProviderCall {
    /// Returns true for calls that change provider state.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::UpdateInstanceLabel(..)
                | Self::ResizeInstance(..)
                | Self::CreateDisk(..)
                | Self::ResizeDisk(..)
                | Self::CreateConfig(..)
                | Self::UpdateConfig(..)
        )
    }
}

struct PendingEvent {
    event: Event,
    polls_left: u32,
    outcome: Option<(EventStatus, Option<String>)>,
}

impl PendingEvent {
    fn poll(&mut self) -> Event {
        if self.polls_left > 0 {
            self.polls_left -= 1;
        } else if let Some((status, message)) = &self.outcome {
            self.event.status = *status;
            self.event.message.clone_from(message);
            if *status == EventStatus::Finished {
                self.event.percent_complete = Some(100);
            }
        }
        self.event.clone()
    }
}

#[derive(Default)]
struct MockState {
    instances: HashMap<InstanceId, Instance>,
    types: HashMap<String, InstanceType>,
    disks: HashMap<InstanceId, Vec<Disk>>,
    configs: HashMap<InstanceId, Vec<BootConfig>>,
    events: Vec<PendingEvent>,
    behaviors: HashMap<EventAction, ActionBehavior>,
    calls: Vec<ProviderCall>,
    next_id: u64,
    clock_offset_secs: i64,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Provider-side time.
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + TimeDelta::seconds(self.clock_offset_secs)
    }

    fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances
            .get(&id)
            .ok_or_else(|| ProviderError::NotFound(format!("linode {id}")))
    }

    fn behavior(&self, action: EventAction) -> ActionBehavior {
        self.behaviors.get(&action).cloned().unwrap_or_default()
    }

    fn total_disk_size(&self, id: InstanceId) -> u64 {
        self.disks
            .get(&id)
            .map_or(0, |disks| disks.iter().map(|d| d.size).sum())
    }

    fn ensure_idle(&self, id: InstanceId) -> Result<()> {
        if self.instance(id)?.status.is_transitional() {
            return Err(rejected("Linode busy."));
        }
        Ok(())
    }

    fn emit(
        &mut self,
        action: EventAction,
        entity: EntityRef,
        secondary: Option<EntityRef>,
        behavior: &ActionBehavior,
    ) {
        let (polls_left, outcome) = match behavior {
            ActionBehavior::Finish => (0, Some((EventStatus::Finished, None))),
            ActionBehavior::FinishAfterPolls(n) => (*n, Some((EventStatus::Finished, None))),
            ActionBehavior::Fail(message) => (0, Some((EventStatus::Failed, Some(message.clone())))),
            ActionBehavior::Never => (0, None),
        };
        let id = EventId::new(self.next_id());
        self.events.push(PendingEvent {
            event: Event {
                id,
                action,
                entity: Some(entity),
                secondary_entity: secondary,
                status: EventStatus::Started,
                percent_complete: Some(0),
                message: None,
                created: self.now(),
            },
            polls_left,
            outcome,
        });
    }
}

fn rejected(reason: &str) -> ProviderError {
    ProviderError::Api {
        status: 400,
        reasons: reason.to_string(),
    }
}

/// An in-memory [`ComputeProvider`].
///
/// Starts with the plans from [`fixtures`] registered.
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a mock with the standard plans and no instances.
    #[must_use]
    pub fn new() -> Self {
        let mut state = MockState {
            next_id: 1000,
            ..MockState::default()
        };
        for plan in [fixtures::nanode(), fixtures::standard_1(), fixtures::standard_2()] {
            state.types.insert(plan.id.clone(), plan);
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// Register a plan.
    pub fn add_type(&self, plan: InstanceType) {
        self.state.lock().types.insert(plan.id.clone(), plan);
    }

    /// Register an instance with no disks or configs.
    pub fn add_instance(&self, instance: Instance) {
        let mut state = self.state.lock();
        state.disks.entry(instance.id).or_default();
        state.configs.entry(instance.id).or_default();
        state.instances.insert(instance.id, instance);
    }

    /// Attach a ready disk to an instance and return its id.
    pub fn add_disk(
        &self,
        instance: InstanceId,
        label: &str,
        filesystem: Filesystem,
        size: u64,
    ) -> DiskId {
        let mut state = self.state.lock();
        let id = DiskId::new(state.next_id());
        let now = Utc::now();
        state.disks.entry(instance).or_default().push(Disk {
            id,
            label: label.to_string(),
            filesystem,
            size,
            status: DiskStatus::Ready,
            created: now,
            updated: now,
        });
        id
    }

    /// Attach a boot configuration to an instance and return its id.
    pub fn add_config(&self, instance: InstanceId, label: &str, devices: DeviceMap) -> ConfigId {
        let mut state = self.state.lock();
        let id = ConfigId::new(state.next_id());
        state
            .configs
            .entry(instance)
            .or_default()
            .push(fixtures::config(id, label, devices));
        id
    }

    /// Control how events for `action` progress.
    pub fn set_behavior(&self, action: EventAction, behavior: ActionBehavior) {
        self.state.lock().behaviors.insert(action, behavior);
    }

    /// Run the provider clock `seconds` ahead of the local one; negative
    /// values put it behind.
    pub fn set_clock_offset(&self, seconds: i64) {
        self.state.lock().clock_offset_secs = seconds;
    }

    /// Force an instance into a status.
    pub fn set_status(&self, id: InstanceId, status: InstanceStatus) {
        if let Some(instance) = self.state.lock().instances.get_mut(&id) {
            instance.status = status;
        }
    }

    /// All calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().calls.clone()
    }

    /// Calls that changed provider state, in order.
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<ProviderCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Current state of an instance.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<Instance> {
        self.state.lock().instances.get(&id).cloned()
    }

    /// Current disks of an instance.
    #[must_use]
    pub fn disks(&self, id: InstanceId) -> Vec<Disk> {
        self.state.lock().disks.get(&id).cloned().unwrap_or_default()
    }

    /// Current boot configurations of an instance.
    #[must_use]
    pub fn configs(&self, id: InstanceId) -> Vec<BootConfig> {
        self.state.lock().configs.get(&id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ComputeProvider for MockProvider {
    async fn get_instance(&self, id: InstanceId) -> Result<Instance> {
        let mut state = self.state.lock();
        state.calls.push(ProviderCall::GetInstance(id));
        state.instance(id).cloned()
    }

    async fn update_instance_label(&self, id: InstanceId, label: &str) -> Result<Instance> {
        let mut state = self.state.lock();
        state
            .calls
            .push(ProviderCall::UpdateInstanceLabel(id, label.to_string()));
        let instance = state
            .instances
            .get_mut(&id)
            .ok_or_else(|| ProviderError::NotFound(format!("linode {id}")))?;
        instance.label = label.to_string();
        instance.updated = Utc::now();
        Ok(instance.clone())
    }

    async fn get_instance_type(&self, type_id: &str) -> Result<InstanceType> {
        let mut state = self.state.lock();
        state
            .calls
            .push(ProviderCall::GetInstanceType(type_id.to_string()));
        state
            .types
            .get(type_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("type {type_id}")))
    }

    async fn resize_instance(&self, id: InstanceId, type_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(ProviderCall::ResizeInstance(id, type_id.to_string()));
        state.ensure_idle(id)?;
        let plan = state
            .types
            .get(type_id)
            .cloned()
            .ok_or_else(|| rejected("A valid plan type by that ID was not found"))?;
        if state.total_disk_size(id) > plan.disk {
            return Err(rejected(
                "Linode has allocated more disk than the new service plan allows",
            ));
        }

        let behavior = state.behavior(EventAction::LinodeResize);
        if !matches!(behavior, ActionBehavior::Fail(_)) {
            if let Some(instance) = state.instances.get_mut(&id) {
                instance.type_id = plan.id.clone();
                instance.specs.disk = plan.disk;
                instance.specs.memory = plan.memory;
                instance.specs.vcpus = plan.vcpus;
                instance.specs.transfer = plan.transfer;
                instance.updated = Utc::now();
            }
        }
        state.emit(
            EventAction::LinodeResize,
            EntityRef::linode(id.get()),
            None,
            &behavior,
        );
        Ok(())
    }

    async fn list_disks(&self, id: InstanceId) -> Result<Vec<Disk>> {
        let mut state = self.state.lock();
        state.calls.push(ProviderCall::ListDisks(id));
        state.instance(id)?;
        Ok(state.disks.get(&id).cloned().unwrap_or_default())
    }

    async fn create_disk(&self, id: InstanceId, options: &CreateDiskOptions) -> Result<Disk> {
        let mut state = self.state.lock();
        state.calls.push(ProviderCall::CreateDisk(
            id,
            options.label.clone(),
            options.size,
        ));
        state.ensure_idle(id)?;
        let allowance = state.instance(id)?.specs.disk;
        if state.total_disk_size(id) + options.size > allowance {
            return Err(rejected("Insufficient space for requested disk"));
        }

        let behavior = state.behavior(EventAction::DiskCreate);
        let now = state.now();
        let disk = Disk {
            id: DiskId::new(state.next_id()),
            label: options.label.clone(),
            filesystem: options.filesystem,
            size: options.size,
            status: DiskStatus::Ready,
            created: now,
            updated: now,
        };
        if !matches!(behavior, ActionBehavior::Fail(_)) {
            state.disks.entry(id).or_default().push(disk.clone());
        }
        state.emit(
            EventAction::DiskCreate,
            EntityRef::linode(id.get()),
            Some(EntityRef::disk(disk.id.get())),
            &behavior,
        );
        Ok(disk)
    }

    async fn resize_disk(&self, id: InstanceId, disk_id: DiskId, size: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ProviderCall::ResizeDisk(id, disk_id, size));
        state.ensure_idle(id)?;
        let allowance = state.instance(id)?.specs.disk;
        let total = state.total_disk_size(id);
        let current = state
            .disks
            .get(&id)
            .and_then(|disks| disks.iter().find(|d| d.id == disk_id))
            .map(|d| d.size)
            .ok_or_else(|| ProviderError::NotFound(format!("disk {disk_id}")))?;
        if total - current + size > allowance {
            return Err(rejected("Insufficient space for requested disk size"));
        }

        let behavior = state.behavior(EventAction::DiskResize);
        if !matches!(behavior, ActionBehavior::Fail(_)) {
            if let Some(disk) = state
                .disks
                .get_mut(&id)
                .and_then(|disks| disks.iter_mut().find(|d| d.id == disk_id))
            {
                disk.size = size;
                disk.updated = Utc::now();
            }
        }
        state.emit(
            EventAction::DiskResize,
            EntityRef::linode(id.get()),
            Some(EntityRef::disk(disk_id.get())),
            &behavior,
        );
        Ok(())
    }

    async fn list_configs(&self, id: InstanceId) -> Result<Vec<BootConfig>> {
        let mut state = self.state.lock();
        state.calls.push(ProviderCall::ListConfigs(id));
        state.instance(id)?;
        Ok(state.configs.get(&id).cloned().unwrap_or_default())
    }

    async fn create_config(&self, id: InstanceId, options: &ConfigOptions) -> Result<BootConfig> {
        let mut state = self.state.lock();
        state
            .calls
            .push(ProviderCall::CreateConfig(id, options.label.clone()));
        state.instance(id)?;
        check_devices(&state, id, &options.devices)?;

        let config = apply_options(ConfigId::new(state.next_id()), options);
        state.configs.entry(id).or_default().push(config.clone());
        Ok(config)
    }

    async fn update_config(
        &self,
        id: InstanceId,
        config_id: ConfigId,
        options: &ConfigOptions,
    ) -> Result<BootConfig> {
        let mut state = self.state.lock();
        state.calls.push(ProviderCall::UpdateConfig(id, config_id));
        state.instance(id)?;
        check_devices(&state, id, &options.devices)?;

        let config = state
            .configs
            .get_mut(&id)
            .and_then(|configs| configs.iter_mut().find(|c| c.id == config_id))
            .ok_or_else(|| ProviderError::NotFound(format!("config {config_id}")))?;
        *config = apply_options(config_id, options);
        Ok(config.clone())
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut state = self.state.lock();
        state.calls.push(ProviderCall::ListEvents(filter.action));
        let mut events: Vec<Event> = state
            .events
            .iter_mut()
            .filter(|pending| filter.matches(&pending.event))
            .map(PendingEvent::poll)
            .collect();
        events.reverse();
        Ok(events)
    }
}

fn check_devices(state: &MockState, id: InstanceId, devices: &DeviceMap) -> Result<()> {
    let disks = state.disks.get(&id).map_or(&[][..], Vec::as_slice);
    for (slot, target) in devices.iter() {
        if let Some(disk_id) = target.and_then(|t| t.disk_id()) {
            if !disks.iter().any(|d| d.id == disk_id) {
                return Err(ProviderError::Api {
                    status: 400,
                    reasons: format!("[devices.{slot}.disk_id] Disk {disk_id} not found"),
                });
            }
        }
    }
    Ok(())
}

fn apply_options(id: ConfigId, options: &ConfigOptions) -> BootConfig {
    BootConfig {
        id,
        label: options.label.clone(),
        kernel: options.kernel.clone(),
        run_level: options.run_level,
        virt_mode: options.virt_mode,
        root_device: options.root_device.clone(),
        comments: options.comments.clone(),
        memory_limit: options.memory_limit,
        helpers: options.helpers,
        devices: options.devices,
    }
}

/// Ready-made plans and objects.
pub mod fixtures {
    use std::net::Ipv4Addr;

    use chrono::Utc;
    use shape_core::{
        BootConfig, ConfigHelpers, ConfigId, DeviceMap, Instance, InstanceAlerts, InstanceId,
        InstanceSpecs, InstanceStatus, InstanceType, RunLevel, VirtMode,
    };

    /// `g6-nanode-1`: 25 GB, 1 GB RAM.
    #[must_use]
    pub fn nanode() -> InstanceType {
        plan("g6-nanode-1", "Nanode 1GB", 25_600, 1_024, 1, 1_000)
    }

    /// `g6-standard-1`: 50 GB, 2 GB RAM.
    #[must_use]
    pub fn standard_1() -> InstanceType {
        plan("g6-standard-1", "Linode 2GB", 51_200, 2_048, 1, 2_000)
    }

    /// `g6-standard-2`: 80 GB, 4 GB RAM.
    #[must_use]
    pub fn standard_2() -> InstanceType {
        plan("g6-standard-2", "Linode 4GB", 81_920, 4_096, 2, 4_000)
    }

    fn plan(id: &str, label: &str, disk: u64, memory: u64, vcpus: u32, transfer: u64) -> InstanceType {
        InstanceType {
            id: id.to_string(),
            label: label.to_string(),
            disk,
            memory,
            vcpus,
            transfer,
        }
    }

    /// A running instance on `plan`.
    #[must_use]
    pub fn instance(id: u64, plan: &InstanceType) -> Instance {
        let now = Utc::now();
        Instance {
            id: InstanceId::new(id),
            label: format!("linode{id}"),
            type_id: plan.id.clone(),
            region: "us-east".to_string(),
            status: InstanceStatus::Running,
            group: String::new(),
            ipv4: vec![Ipv4Addr::new(45, 79, 0, 10), Ipv4Addr::new(192, 168, 128, 10)],
            specs: InstanceSpecs {
                disk: plan.disk,
                memory: plan.memory,
                vcpus: plan.vcpus,
                transfer: plan.transfer,
            },
            alerts: InstanceAlerts::default(),
            created: now,
            updated: now,
        }
    }

    /// A boot configuration with default settings.
    #[must_use]
    pub fn config(id: ConfigId, label: &str, devices: DeviceMap) -> BootConfig {
        BootConfig {
            id,
            label: label.to_string(),
            kernel: "linode/latest-64bit".to_string(),
            run_level: RunLevel::Default,
            virt_mode: VirtMode::Paravirt,
            root_device: "/dev/sda".to_string(),
            comments: String::new(),
            memory_limit: 0,
            helpers: ConfigHelpers::default(),
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use shape_core::{DeviceSlot, DeviceTarget};

    fn setup() -> (MockProvider, InstanceId) {
        let provider = MockProvider::new();
        provider.add_instance(fixtures::instance(1, &fixtures::nanode()));
        (provider, InstanceId::new(1))
    }

    fn filter(action: EventAction) -> EventFilter {
        EventFilter::new(
            EntityRef::linode(1),
            action,
            Utc::now() - TimeDelta::seconds(5),
        )
    }

    #[tokio::test]
    async fn resize_updates_plan_and_emits_event() {
        let (provider, id) = setup();
        provider.resize_instance(id, "g6-standard-1").await.unwrap();

        let instance = provider.get_instance(id).await.unwrap();
        assert_eq!(instance.type_id, "g6-standard-1");
        assert_eq!(instance.specs.disk, 51_200);

        let events = provider
            .list_events(&filter(EventAction::LinodeResize))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Finished);
    }

    #[tokio::test]
    async fn resize_rejects_busy_instance() {
        let (provider, id) = setup();
        provider.set_status(id, InstanceStatus::Resizing);
        let err = provider.resize_instance(id, "g6-standard-1").await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn resize_rejects_plan_smaller_than_disks() {
        let provider = MockProvider::new();
        provider.add_instance(fixtures::instance(1, &fixtures::standard_1()));
        let id = InstanceId::new(1);
        provider.add_disk(id, "boot", Filesystem::Ext4, 30_000);

        assert!(provider.resize_instance(id, "g6-nanode-1").await.is_err());
        assert_eq!(provider.instance(id).unwrap().type_id, "g6-standard-1");
    }

    #[tokio::test]
    async fn events_progress_per_behavior() {
        let (provider, id) = setup();
        let disk = provider.add_disk(id, "boot", Filesystem::Ext4, 20_000);
        provider.set_behavior(EventAction::DiskResize, ActionBehavior::FinishAfterPolls(2));
        provider.resize_disk(id, disk, 25_000).await.unwrap();

        let f = filter(EventAction::DiskResize);
        for _ in 0..2 {
            let events = provider.list_events(&f).await.unwrap();
            assert_eq!(events[0].status, EventStatus::Started);
        }
        let events = provider.list_events(&f).await.unwrap();
        assert_eq!(events[0].status, EventStatus::Finished);
        assert_eq!(events[0].secondary_entity, Some(EntityRef::disk(disk.get())));
    }

    #[tokio::test]
    async fn failed_action_leaves_state_untouched() {
        let (provider, id) = setup();
        provider.set_behavior(
            EventAction::LinodeResize,
            ActionBehavior::Fail("host out of capacity".to_string()),
        );
        provider.resize_instance(id, "g6-standard-1").await.unwrap();
        assert_eq!(provider.instance(id).unwrap().type_id, "g6-nanode-1");

        let events = provider
            .list_events(&filter(EventAction::LinodeResize))
            .await
            .unwrap();
        assert_eq!(events[0].status, EventStatus::Failed);
        assert_eq!(events[0].message.as_deref(), Some("host out of capacity"));
    }

    #[tokio::test]
    async fn config_devices_must_reference_existing_disks() {
        let (provider, id) = setup();
        let mut devices = DeviceMap::default();
        devices.set(DeviceSlot::Sda, Some(DeviceTarget::Disk(DiskId::new(424_242))));
        let options = ConfigOptions::from(&fixtures::config(ConfigId::new(1), "boot", devices));

        assert!(provider.create_config(id, &options).await.is_err());
    }

    #[tokio::test]
    async fn records_mutating_calls() {
        let (provider, id) = setup();
        provider.get_instance(id).await.unwrap();
        provider.update_instance_label(id, "renamed").await.unwrap();

        assert_eq!(provider.calls().len(), 2);
        assert_eq!(
            provider.mutating_calls(),
            vec![ProviderCall::UpdateInstanceLabel(id, "renamed".to_string())]
        );
    }
}
