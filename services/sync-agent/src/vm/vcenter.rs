//! Hypervisor management API (vCenter REST).

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use super::snapshot::DiskFacts;
use crate::config::VcenterConfig;

const SESSION_HEADER: &str = "vmware-api-session-id";

/// Errors from the hypervisor API.
#[derive(Debug, Error)]
pub enum VcenterError {
    #[error("hypervisor login rejected ({0})")]
    Authentication(u16),

    #[error("hypervisor API error ({status}) on {path}: {message}")]
    Api {
        status: u16,
        path: String,
        message: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response from {path}: {reason}")]
    InvalidResponse { path: String, reason: String },
}

/// Id and name of an inventory object (datacenter, cluster, host, folder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub id: String,
    pub name: String,
}

/// Per-VM detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDetail {
    pub id: String,
    pub name: String,
    pub power_state: String,
    pub cpu_count: u32,
    pub memory_mib: u64,
    pub guest_os: Option<String>,
    pub disks: Vec<DiskFacts>,
    pub mac_addresses: Vec<String>,
}

/// Read access to the hypervisor inventory tree.
#[async_trait]
pub trait HypervisorApi: Send + Sync {
    async fn datacenters(&self) -> Result<Vec<ObjectSummary>, VcenterError>;

    async fn clusters(&self, datacenter: &str) -> Result<Vec<ObjectSummary>, VcenterError>;

    async fn hosts(&self, cluster: &str) -> Result<Vec<ObjectSummary>, VcenterError>;

    /// VMs running on a host (id and name).
    async fn vms(&self, host: &str) -> Result<Vec<ObjectSummary>, VcenterError>;

    async fn vm_detail(&self, vm: &str) -> Result<VmDetail, VcenterError>;

    /// VM id → name of the folder containing it.
    async fn vm_folders(&self) -> Result<HashMap<String, String>, VcenterError>;

    /// Where the data comes from, recorded in the snapshot.
    fn source(&self) -> String;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct DatacenterItem {
    datacenter: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ClusterItem {
    cluster: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct HostItem {
    host: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct VmItem {
    vm: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FolderItem {
    folder: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct VmInfo {
    name: String,
    power_state: String,
    #[serde(rename = "guest_OS", default)]
    guest_os: Option<String>,
    cpu: CpuInfo,
    memory: MemoryInfo,
    #[serde(default)]
    disks: BTreeMap<String, DiskInfo>,
    #[serde(default)]
    nics: BTreeMap<String, NicInfo>,
}

#[derive(Debug, Deserialize)]
struct CpuInfo {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct MemoryInfo {
    #[serde(rename = "size_MiB")]
    size_mib: u64,
}

#[derive(Debug, Deserialize)]
struct DiskInfo {
    #[serde(default)]
    label: String,
    #[serde(default)]
    capacity: u64,
    #[serde(default)]
    backing: Option<DiskBacking>,
}

#[derive(Debug, Deserialize)]
struct DiskBacking {
    #[serde(default)]
    vmdk_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NicInfo {
    #[serde(default)]
    mac_address: Option<String>,
}

impl VmInfo {
    fn into_detail(self, id: &str) -> VmDetail {
        VmDetail {
            id: id.to_string(),
            name: self.name,
            power_state: self.power_state,
            cpu_count: self.cpu.count,
            memory_mib: self.memory.size_mib,
            guest_os: self.guest_os,
            disks: self
                .disks
                .into_values()
                .map(|disk| DiskFacts {
                    label: disk.label,
                    path: disk.backing.and_then(|b| b.vmdk_file).unwrap_or_default(),
                    capacity_bytes: disk.capacity,
                    thin_provisioned: None,
                })
                .collect(),
            mac_addresses: self.nics.into_values().filter_map(|n| n.mac_address).collect(),
        }
    }
}

// =============================================================================
// REST client
// =============================================================================

/// vCenter REST client holding an API session.
#[derive(Debug, Clone)]
pub struct VcenterClient {
    client: reqwest::Client,
    base_url: String,
}

impl VcenterClient {
    /// Log in and create a session-bound client.
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn login(config: &VcenterConfig) -> Result<Self, VcenterError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        let login_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        let response = login_client
            .post(format!("{base_url}/api/session"))
            .basic_auth(&config.user, Some(&config.password))
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(VcenterError::Authentication(status.as_u16()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), message = %message, "Hypervisor login failed");
            return Err(VcenterError::Api {
                status: status.as_u16(),
                path: "/api/session".to_string(),
                message,
            });
        }
        let token: String = response.json().await.map_err(|e| VcenterError::InvalidResponse {
            path: "/api/session".to_string(),
            reason: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            SESSION_HEADER,
            HeaderValue::from_str(&token).map_err(|e| VcenterError::InvalidResponse {
                path: "/api/session".to_string(),
                reason: e.to_string(),
            })?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        info!("Hypervisor session established");
        Ok(Self { client, base_url })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, VcenterError> {
        debug!(path = %path, "Hypervisor request");
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| VcenterError::InvalidResponse {
                path: path.to_string(),
                reason: e.to_string(),
            })
        } else {
            let message = response.text().await.unwrap_or_default();
            error!(path = %path, status = status.as_u16(), message = %message, "Hypervisor request failed");
            if status.as_u16() == 401 {
                return Err(VcenterError::Authentication(401));
            }
            Err(VcenterError::Api {
                status: status.as_u16(),
                path: path.to_string(),
                message,
            })
        }
    }
}

#[async_trait]
impl HypervisorApi for VcenterClient {
    async fn datacenters(&self) -> Result<Vec<ObjectSummary>, VcenterError> {
        let items: Vec<DatacenterItem> = self.get("/api/vcenter/datacenter", &[]).await?;
        Ok(items
            .into_iter()
            .map(|i| ObjectSummary { id: i.datacenter, name: i.name })
            .collect())
    }

    async fn clusters(&self, datacenter: &str) -> Result<Vec<ObjectSummary>, VcenterError> {
        let items: Vec<ClusterItem> = self
            .get("/api/vcenter/cluster", &[("datacenters", datacenter)])
            .await?;
        Ok(items
            .into_iter()
            .map(|i| ObjectSummary { id: i.cluster, name: i.name })
            .collect())
    }

    async fn hosts(&self, cluster: &str) -> Result<Vec<ObjectSummary>, VcenterError> {
        let items: Vec<HostItem> = self.get("/api/vcenter/host", &[("clusters", cluster)]).await?;
        Ok(items
            .into_iter()
            .map(|i| ObjectSummary { id: i.host, name: i.name })
            .collect())
    }

    async fn vms(&self, host: &str) -> Result<Vec<ObjectSummary>, VcenterError> {
        let items: Vec<VmItem> = self.get("/api/vcenter/vm", &[("hosts", host)]).await?;
        Ok(items
            .into_iter()
            .map(|i| ObjectSummary { id: i.vm, name: i.name })
            .collect())
    }

    async fn vm_detail(&self, vm: &str) -> Result<VmDetail, VcenterError> {
        let info: VmInfo = self.get(&format!("/api/vcenter/vm/{vm}"), &[]).await?;
        Ok(info.into_detail(vm))
    }

    async fn vm_folders(&self) -> Result<HashMap<String, String>, VcenterError> {
        let folders: Vec<FolderItem> = self
            .get("/api/vcenter/folder", &[("type", "VIRTUAL_MACHINE")])
            .await?;
        let mut membership = HashMap::new();
        for folder in folders {
            let vms: Vec<VmItem> = self
                .get("/api/vcenter/vm", &[("folders", folder.folder.as_str())])
                .await?;
            for vm in vms {
                membership.insert(vm.vm, folder.name.clone());
            }
        }
        Ok(membership)
    }

    fn source(&self) -> String {
        self.base_url.clone()
    }
}
