//! Stage 1: walk the hypervisor tree into a snapshot mapping.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, instrument, warn};

use super::snapshot::{ClusterHosts, DatacenterClusters, Datacenters, HostVms, VmFacts};
use super::vcenter::{HypervisorApi, ObjectSummary, VcenterError, VmDetail};

/// Default number of concurrent VM detail requests.
pub const DEFAULT_DETAIL_CONCURRENCY: usize = 16;

/// Collect the datacenter → cluster → host → VM mapping.
///
/// Any failure aborts the collection: a partial snapshot would make the
/// sync stage delete the VMs it is missing.
#[instrument(skip(api))]
pub async fn collect_inventory(
    api: &dyn HypervisorApi,
    concurrency: usize,
) -> Result<Datacenters, VcenterError> {
    let folders = api.vm_folders().await?;
    let mut datacenters = Datacenters::new();

    for datacenter in api.datacenters().await? {
        let mut clusters = DatacenterClusters::new();
        for cluster in api.clusters(&datacenter.id).await? {
            let mut hosts = ClusterHosts::new();
            for host in api.hosts(&cluster.id).await? {
                let vms = api.vms(&host.id).await?;
                let mut details = fetch_details(api, &vms, concurrency).await?;
                details.sort_by(|a, b| a.id.cmp(&b.id));

                let mut host_vms = HostVms::new();
                for detail in details {
                    if host_vms.contains_key(&detail.name) {
                        warn!(host = %host.name, vm = %detail.name, "Duplicate VM name on host, keeping the first");
                        continue;
                    }
                    let facts = VmFacts {
                        folder: folders.get(&detail.id).cloned(),
                        id: detail.id,
                        power_state: detail.power_state,
                        cpu_count: detail.cpu_count,
                        memory_mib: detail.memory_mib,
                        guest_os: detail.guest_os,
                        disks: detail.disks,
                        mac_addresses: detail.mac_addresses,
                        has_snapshot: None,
                    };
                    host_vms.insert(detail.name, facts);
                }
                hosts.insert(host.name, host_vms);
            }
            info!(datacenter = %datacenter.name, cluster = %cluster.name, hosts = hosts.len(), "Collected cluster");
            clusters.insert(cluster.name, hosts);
        }
        datacenters.insert(datacenter.name, clusters);
    }

    Ok(datacenters)
}

async fn fetch_details(
    api: &dyn HypervisorApi,
    vms: &[ObjectSummary],
    concurrency: usize,
) -> Result<Vec<VmDetail>, VcenterError> {
    stream::iter(vms)
        .map(|vm| api.vm_detail(&vm.id))
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await
}
