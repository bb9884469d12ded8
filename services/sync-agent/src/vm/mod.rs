//! VM pipeline.
//!
//! Stage 1 walks the hypervisor API into a [`VmSnapshot`] file. Stage 2 maps
//! the snapshot into one observed record set per cluster.

mod collect;
mod mapping;
mod snapshot;
mod vcenter;

pub use collect::{collect_inventory, DEFAULT_DETAIL_CONCURRENCY};
pub use mapping::{cluster_observations, tenant_for_folder, vm_record, vm_status, ClusterObservation, DiskClass};
pub use snapshot::{
    ClusterHosts, DatacenterClusters, Datacenters, DiskFacts, HostVms, SnapshotError, VmFacts,
    VmSnapshot, FORMAT_VERSION,
};
pub use vcenter::{HypervisorApi, ObjectSummary, VcenterClient, VcenterError, VmDetail};
