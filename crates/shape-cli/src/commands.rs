//! Subcommand implementations.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use shape_core::InstanceId;
use shape_provider::ComputeProvider;
use shape_reconcile::flatten::flatten_instance;
use shape_reconcile::{
    DesiredInstance, InstanceState, Reconciler, ResizeOrchestrator, ResizeRequest, Timeouts,
};

/// Read and flatten the current state of an instance.
pub async fn show<P: ComputeProvider + ?Sized>(
    provider: &P,
    id: InstanceId,
) -> Result<InstanceState> {
    let instance = provider
        .get_instance(id)
        .await
        .with_context(|| format!("failed to read instance {id}"))?;
    let disks = provider.list_disks(id).await?;
    let configs = provider.list_configs(id).await?;
    Ok(flatten_instance(&instance, &disks, &configs))
}

/// Move an instance to another plan, optionally growing its biggest disk.
pub async fn resize<P: ComputeProvider + ?Sized>(
    provider: &P,
    poll_interval: Duration,
    id: InstanceId,
    request: &ResizeRequest,
) -> Result<InstanceState> {
    let current = provider
        .get_instance(id)
        .await
        .with_context(|| format!("failed to read instance {id}"))?;
    let outcome = ResizeOrchestrator::new(provider, poll_interval)
        .resize(&current, request)
        .await
        .with_context(|| format!("resize of instance {id} to {} failed", request.target_type))?;

    if !outcome.resized {
        tracing::info!(instance_id = %id, "Instance already on requested plan");
    }
    show(provider, id).await
}

/// Reconcile an instance to a desired shape.
pub async fn apply<P: ComputeProvider + ?Sized>(
    provider: &P,
    poll_interval: Duration,
    id: InstanceId,
    desired: &DesiredInstance,
    timeouts: &Timeouts,
) -> Result<InstanceState> {
    let current = provider
        .get_instance(id)
        .await
        .with_context(|| format!("failed to read instance {id}"))?;
    Reconciler::new(provider, poll_interval)
        .reconcile(desired, &current, timeouts)
        .await
        .with_context(|| format!("reconciliation of instance {id} failed"))
}

/// Load a desired shape from a JSON file.
pub fn load_desired(path: &Path) -> Result<DesiredInstance> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid desired shape in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shape_core::Filesystem;
    use shape_provider::mock::fixtures;
    use shape_provider::MockProvider;
    use std::io::Write;

    const POLL: Duration = Duration::from_millis(300);

    fn provider() -> MockProvider {
        let provider = MockProvider::new();
        provider.add_instance(fixtures::instance(5, &fixtures::nanode()));
        provider.add_disk(InstanceId::new(5), "boot", Filesystem::Ext4, 25_600);
        provider
    }

    #[tokio::test]
    async fn show_flattens_instance() {
        let state = show(&provider(), InstanceId::new(5)).await.unwrap();
        assert_eq!(state.type_id, "g6-nanode-1");
        assert_eq!(state.storage_utilized, 25_600);
    }

    #[tokio::test]
    async fn show_reports_missing_instance() {
        let err = show(&provider(), InstanceId::new(6)).await.unwrap_err();
        assert!(err.to_string().contains("instance 6"));
    }

    #[tokio::test(start_paused = true)]
    async fn resize_with_expansion() {
        let provider = provider();
        let request =
            ResizeRequest::new("g6-standard-1", Duration::from_secs(60)).auto_expand(true);
        let state = resize(&provider, POLL, InstanceId::new(5), &request)
            .await
            .unwrap();
        assert_eq!(state.disk("boot").unwrap().size, 51_200);
    }

    #[tokio::test(start_paused = true)]
    async fn apply_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"label": "renamed", "disks": [{{"label": "boot", "size": 25600}}]}}"#
        )
        .unwrap();

        let desired = load_desired(file.path()).unwrap();
        let state = apply(
            &provider(),
            POLL,
            InstanceId::new(5),
            &desired,
            &Timeouts::default(),
        )
        .await
        .unwrap();
        assert_eq!(state.label, "renamed");
    }

    #[test]
    fn load_desired_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_desired(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid desired shape"));
    }
}
