//! VM snapshot file: the hand-off between `vms collect` and `vms sync`.
//!
//! The file is a JSON envelope around the datacenter → cluster → host → VM
//! mapping. `digest` is the SHA-256 of the canonical JSON of the mapping and
//! is verified on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use netsync_reconcile::canonical_json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

/// Current envelope version.
pub const FORMAT_VERSION: u32 = 1;

/// VMs of one host, keyed by VM name.
pub type HostVms = BTreeMap<String, VmFacts>;
/// Hosts of one cluster.
pub type ClusterHosts = BTreeMap<String, HostVms>;
/// Clusters of one datacenter.
pub type DatacenterClusters = BTreeMap<String, ClusterHosts>;
/// The full mapping.
pub type Datacenters = BTreeMap<String, DatacenterClusters>;

/// One virtual disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskFacts {
    pub label: String,
    /// Backing file path, `[datastore] dir/file.vmdk`.
    pub path: String,
    pub capacity_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thin_provisioned: Option<bool>,
}

/// What the hypervisor reports about one VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmFacts {
    /// Hypervisor-side id (`vm-123`).
    pub id: String,
    pub power_state: String,
    pub cpu_count: u32,
    pub memory_mib: u64,
    #[serde(default)]
    pub guest_os: Option<String>,
    /// Name of the VM folder the VM sits in.
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub disks: Vec<DiskFacts>,
    #[serde(default)]
    pub mac_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_snapshot: Option<bool>,
}

/// Snapshot errors. All of them are fatal to `vms sync`.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed snapshot {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot digest mismatch: recorded {recorded}, computed {computed}")]
    DigestMismatch { recorded: String, computed: String },

    #[error("cannot serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Snapshot envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSnapshot {
    pub format_version: u32,
    pub collected_at: DateTime<Utc>,
    /// Where the data came from (hypervisor API URL).
    pub source: String,
    pub digest: String,
    pub datacenters: Datacenters,
}

/// SHA-256 of the canonical JSON of `datacenters`.
pub fn digest(datacenters: &Datacenters) -> Result<String, SnapshotError> {
    let value = serde_json::to_value(datacenters)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&value).as_bytes());
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

impl VmSnapshot {
    /// Wrap a collected mapping, computing its digest.
    pub fn new(source: impl Into<String>, datacenters: Datacenters) -> Result<Self, SnapshotError> {
        Ok(Self {
            format_version: FORMAT_VERSION,
            collected_at: Utc::now(),
            source: source.into(),
            digest: digest(&datacenters)?,
            datacenters,
        })
    }

    /// Number of VMs in the mapping.
    pub fn vm_count(&self) -> usize {
        self.datacenters
            .values()
            .flat_map(|clusters| clusters.values())
            .flat_map(|hosts| hosts.values())
            .map(|vms| vms.len())
            .sum()
    }

    /// Check the version and digest.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.format_version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.format_version));
        }
        let computed = digest(&self.datacenters)?;
        if computed != self.digest {
            return Err(SnapshotError::DigestMismatch {
                recorded: self.digest.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Load and verify a snapshot file.
    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = tokio::fs::read(path).await.map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Self =
            serde_json::from_slice(&raw).map_err(|source| SnapshotError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        snapshot.verify()?;
        debug!(path = %path.display(), vms = snapshot.vm_count(), "Loaded snapshot");
        Ok(snapshot)
    }

    /// Write the snapshot atomically: to a sibling temp file, then rename.
    pub async fn write(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let write_err = |source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::write(&tmp, &json).await.map_err(write_err)?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(err));
        }

        info!(path = %path.display(), vms = self.vm_count(), digest = %self.digest, "Wrote snapshot");
        Ok(())
    }
}
