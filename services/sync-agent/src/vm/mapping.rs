//! Snapshot VM → inventory record mapping.

use std::collections::BTreeMap;

use netsync_id::TenantName;
use netsync_reconcile::{vm_identity, Attributes, EntityRecord, Scope};
use serde_json::json;
use tracing::warn;

use super::snapshot::{VmFacts, VmSnapshot};
use crate::inventory::CUSTOM_FIELD_PREFIX;

const GIB: u64 = 1024 * 1024 * 1024;

/// Storage class of a virtual disk, read from its datastore name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiskClass {
    Sata,
    Sas,
    Ssd,
    Unknown,
}

impl DiskClass {
    /// Classify a disk by its backing path. `SATA` is checked before `SAS`
    /// since datastore names contain one token or the other.
    pub fn of(path: &str) -> Self {
        if path.contains("SATA") {
            Self::Sata
        } else if path.contains("SAS") {
            Self::Sas
        } else if path.contains("SSD") {
            Self::Ssd
        } else {
            Self::Unknown
        }
    }

    /// Custom field holding this class's total.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Sata => "SATA",
            Self::Sas => "SAS",
            Self::Ssd => "SSD",
            Self::Unknown => "Unknown",
        }
    }

    pub const ALL: [DiskClass; 4] = [Self::Sata, Self::Sas, Self::Ssd, Self::Unknown];
}

/// Inventory status for a hypervisor power state.
pub fn vm_status(power_state: &str) -> &'static str {
    let normalized: String = power_state
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if normalized == "poweredon" {
        "active"
    } else {
        "offline"
    }
}

/// Tenant name for a VM folder: trimmed and cut to the tenant name limit.
pub fn tenant_for_folder(folder: &str) -> Option<String> {
    let (name, _) = TenantName::truncated(folder.trim(), TenantName::MAX_LEN).ok()?;
    Some(name.as_str().trim_end().to_string())
}

fn custom_field(name: &str) -> String {
    format!("{CUSTOM_FIELD_PREFIX}{name}")
}

/// Map one VM to an inventory record.
///
/// Returns `None` for a VM without a usable name.
pub fn vm_record(
    scope: &Scope,
    host: &str,
    name: &str,
    facts: &VmFacts,
    name_max: usize,
) -> Option<EntityRecord> {
    let (identity, truncated) = match vm_identity(name, name_max) {
        Ok(identity) => identity,
        Err(err) => {
            warn!(scope = %scope, vm = %name, error = %err, "Skipping VM");
            return None;
        }
    };

    let mut per_class: BTreeMap<DiskClass, u64> = DiskClass::ALL.iter().map(|c| (*c, 0)).collect();
    for disk in &facts.disks {
        *per_class.entry(DiskClass::of(&disk.path)).or_default() += disk.capacity_bytes / GIB;
    }
    let disk_total: u64 = per_class.values().sum();

    let mut attributes = Attributes::new()
        .with("status", vm_status(&facts.power_state))
        .with("vcpus", facts.cpu_count)
        .with("memory", facts.memory_mib)
        .with("disk", disk_total)
        .with(custom_field("HOST"), host);
    for (class, size) in &per_class {
        attributes.insert(custom_field(class.field()), *size);
    }
    if let Some(os) = facts.guest_os.as_deref().filter(|os| !os.trim().is_empty()) {
        attributes.insert("platform", os.trim());
    }
    if let Some(tenant) = facts.folder.as_deref().and_then(tenant_for_folder) {
        attributes.insert("tenant", tenant);
    }
    if let Some(snapshot) = facts.has_snapshot {
        attributes.insert(custom_field("Snapshot"), snapshot);
    }
    let thin: Vec<bool> = facts.disks.iter().filter_map(|d| d.thin_provisioned).collect();
    if !thin.is_empty() {
        attributes.insert(custom_field("Thin Provision"), json!(thin.iter().any(|t| *t)));
    }

    let record = EntityRecord::new(identity, scope.clone(), attributes);
    Some(if truncated {
        record.with_source_name(name)
    } else {
        record
    })
}

/// Observed VMs of one cluster.
#[derive(Debug, Clone)]
pub struct ClusterObservation {
    pub scope: Scope,
    pub records: Vec<EntityRecord>,
}

impl std::fmt::Display for ClusterObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.scope.name)
    }
}

/// Group the snapshot's VMs by cluster scope.
///
/// Clusters with the same name in different datacenters share one scope.
pub fn cluster_observations(snapshot: &VmSnapshot, name_max: usize) -> Vec<ClusterObservation> {
    let mut by_cluster: BTreeMap<&str, Vec<EntityRecord>> = BTreeMap::new();

    for clusters in snapshot.datacenters.values() {
        for (cluster, hosts) in clusters {
            let scope = Scope::cluster(cluster.as_str());
            let records = by_cluster.entry(cluster.as_str()).or_default();
            for (host, vms) in hosts {
                records.extend(
                    vms.iter()
                        .filter_map(|(name, facts)| vm_record(&scope, host, name, facts, name_max)),
                );
            }
        }
    }

    by_cluster
        .into_iter()
        .map(|(cluster, records)| ClusterObservation {
            scope: Scope::cluster(cluster),
            records,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::snapshot::{ClusterHosts, DatacenterClusters, Datacenters, DiskFacts, HostVms};
    use netsync_reconcile::Identity;
    use rstest::rstest;

    fn disk(path: &str, gib: u64) -> DiskFacts {
        DiskFacts {
            label: "disk".into(),
            path: path.into(),
            capacity_bytes: gib * GIB,
            thin_provisioned: None,
        }
    }

    fn facts(power: &str, disks: Vec<DiskFacts>) -> VmFacts {
        VmFacts {
            id: "vm-1".into(),
            power_state: power.into(),
            cpu_count: 4,
            memory_mib: 8192,
            guest_os: Some("Red Hat Enterprise Linux 8 (64-bit)".into()),
            folder: Some("  Billing department and accounting  ".into()),
            disks,
            mac_addresses: Vec::new(),
            has_snapshot: None,
        }
    }

    #[rstest]
    #[case("[V7K4-SATA-2] a/a.vmdk", DiskClass::Sata)]
    #[case("[DE4K2-SC-SAS4-MinFin] a/a.vmdk", DiskClass::Sas)]
    #[case("[AFF-SSD-01] a/a.vmdk", DiskClass::Ssd)]
    #[case("[local-esx01] a/a.vmdk", DiskClass::Unknown)]
    #[case("[SATA-SAS-mixed] a/a.vmdk", DiskClass::Sata)]
    fn test_disk_class(#[case] path: &str, #[case] class: DiskClass) {
        assert_eq!(DiskClass::of(path), class);
    }

    #[rstest]
    #[case("POWERED_ON", "active")]
    #[case("poweredOn", "active")]
    #[case("POWERED_OFF", "offline")]
    #[case("SUSPENDED", "offline")]
    fn test_vm_status(#[case] state: &str, #[case] status: &str) {
        assert_eq!(vm_status(state), status);
    }

    #[test]
    fn test_tenant_truncated_and_trimmed() {
        let tenant = tenant_for_folder("  Billing department and accounting  ").unwrap();
        assert_eq!(tenant, "Billing department and account");
        assert!(tenant.chars().count() <= 30);
        assert_eq!(tenant_for_folder("   "), None);
    }

    #[test]
    fn test_vm_record_sums_disks_per_class() {
        let scope = Scope::cluster("CL-01");
        let facts = facts(
            "POWERED_ON",
            vec![
                disk("[DS-SAS-01] a/a.vmdk", 40),
                disk("[DS-SAS-01] a/a_1.vmdk", 10),
                disk("[DS-SSD-01] a/a_2.vmdk", 20),
                disk("[nfs01] a/a_3.vmdk", 5),
            ],
        );
        let record = vm_record(&scope, "esx01", "app01", &facts, 64).unwrap();
        let attrs = &record.attributes;

        assert_eq!(record.identity, Identity::Name("app01".into()));
        assert_eq!(attrs.get_str("status"), Some("active"));
        assert_eq!(attrs.get("disk"), Some(&json!(75)));
        assert_eq!(attrs.get("custom_fields.SAS"), Some(&json!(50)));
        assert_eq!(attrs.get("custom_fields.SSD"), Some(&json!(20)));
        assert_eq!(attrs.get("custom_fields.SATA"), Some(&json!(0)));
        assert_eq!(attrs.get("custom_fields.Unknown"), Some(&json!(5)));
        assert_eq!(attrs.get_str("custom_fields.HOST"), Some("esx01"));
        assert_eq!(attrs.get("memory"), Some(&json!(8192)));
        assert!(attrs.get("custom_fields.Thin Provision").is_none());
    }

    #[test]
    fn test_long_name_keeps_source_name() {
        let scope = Scope::cluster("CL-01");
        let long = "x".repeat(80);
        let record = vm_record(&scope, "esx01", &long, &facts("POWERED_OFF", Vec::new()), 64).unwrap();
        assert_eq!(record.identity, Identity::Name("x".repeat(64)));
        assert_eq!(record.source_name.as_deref(), Some(long.as_str()));
        assert_eq!(record.attributes.get_str("status"), Some("offline"));
    }

    #[test]
    fn test_clusters_merge_across_datacenters() {
        let mut vms = HostVms::new();
        vms.insert("app01".into(), facts("POWERED_ON", Vec::new()));
        let mut hosts = ClusterHosts::new();
        hosts.insert("esx01".into(), vms);
        let mut clusters = DatacenterClusters::new();
        clusters.insert("CL-01".into(), hosts);

        let mut dcs = Datacenters::new();
        dcs.insert("DC1".into(), clusters.clone());
        dcs.insert("DC2".into(), clusters);
        let snapshot = VmSnapshot::new("vc", dcs).unwrap();

        let observations = cluster_observations(&snapshot, 64);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].scope, Scope::cluster("CL-01"));
        assert_eq!(observations[0].records.len(), 2);
    }
}
