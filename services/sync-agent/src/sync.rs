//! Sync pipelines: one orchestrated reconciliation unit per device or
//! cluster.

use std::sync::Arc;

use netsync_reconcile::{
    AggregateReport, ApplyMode, FieldPolicies, InventoryGateway, Orchestrator, OrchestratorConfig,
    ReconciliationResult, Reconciler, UnitError,
};
use tracing::{info, instrument};

use crate::inventory::models::Device;
use crate::observer::{DeviceTarget, VlanObserver};
use crate::vm::ClusterObservation;

/// Converge the VLAN group of every device to what the device reports.
///
/// `gateway_for` builds the gateway a device's VLANs are written through.
pub async fn sync_vlans<G, F>(
    devices: Vec<Device>,
    observer: VlanObserver,
    gateway_for: F,
    config: OrchestratorConfig,
    mode: ApplyMode,
) -> AggregateReport
where
    G: InventoryGateway + ?Sized + 'static,
    F: Fn(&DeviceTarget) -> Arc<G> + Send + Sync + 'static,
{
    info!(devices = devices.len(), mode = ?mode, "Syncing VLANs");
    let reconciler = Reconciler::new(FieldPolicies::vlan()).with_mode(mode);
    let gateway_for = Arc::new(gateway_for);

    Orchestrator::new(config)
        .run(devices, move |device| {
            let observer = observer.clone();
            let reconciler = reconciler.clone();
            let gateway_for = Arc::clone(&gateway_for);
            async move {
                let target = DeviceTarget::from_device(&device)?;
                let gateway = gateway_for(&target);
                sync_device(&observer, gateway.as_ref(), &reconciler, &target).await
            }
        })
        .await
}

/// Observe one device and reconcile its VLAN group.
#[instrument(skip_all, fields(device = %target.name))]
pub async fn sync_device<G>(
    observer: &VlanObserver,
    gateway: &G,
    reconciler: &Reconciler,
    target: &DeviceTarget,
) -> Result<ReconciliationResult, UnitError>
where
    G: InventoryGateway + ?Sized,
{
    let observation = observer.collect(target).await?;
    let mut result = reconciler
        .reconcile(gateway, &target.scope(), observation.records)
        .await?;
    result.warnings.extend(observation.warnings);
    Ok(result)
}

/// Converge every cluster's VMs to the snapshot.
///
/// One gateway is shared by all cluster units.
pub async fn sync_vms<G>(
    clusters: Vec<ClusterObservation>,
    gateway: Arc<G>,
    config: OrchestratorConfig,
    mode: ApplyMode,
) -> AggregateReport
where
    G: InventoryGateway + 'static,
{
    info!(clusters = clusters.len(), mode = ?mode, "Syncing VMs");
    let reconciler = Reconciler::new(FieldPolicies::vm()).with_mode(mode);

    Orchestrator::new(config)
        .run(clusters, move |cluster| {
            let gateway = Arc::clone(&gateway);
            let reconciler = reconciler.clone();
            async move {
                let result = reconciler
                    .reconcile(gateway.as_ref(), &cluster.scope, cluster.records)
                    .await?;
                Ok(result)
            }
        })
        .await
}
