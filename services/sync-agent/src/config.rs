//! Configuration for the sync agent.
//!
//! Everything is read from `NETSYNC_*` environment variables. CLI flags
//! override the run-shaping values (parallelism, deadline, snapshot path).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use netsync_reconcile::{DEFAULT_MAX_PARALLELISM, MAX_PARALLELISM_LIMIT};

/// Inventory (NetBox) API settings.
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// Base URL, without a trailing slash.
    pub url: String,

    /// API token.
    pub token: String,

    /// HTTP timeout.
    pub timeout: Duration,
}

/// Hypervisor management API (vCenter) settings.
#[derive(Debug, Clone)]
pub struct VcenterConfig {
    pub url: String,
    pub user: String,
    pub password: String,

    /// Accept self-signed certificates.
    pub insecure: bool,
}

/// Device access settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ssh_user: String,
    pub ssh_key: Option<PathBuf>,
    pub telnet_user: Option<String>,
    pub telnet_password: Option<String>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ssh_user: "netsync".to_string(),
            ssh_key: None,
            telnet_user: None,
            telnet_password: None,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
        }
    }
}

/// Sync agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Inventory API, required by every command that reads or writes it.
    pub inventory: Option<InventoryConfig>,

    /// Tag selecting the devices to sync.
    pub device_tag: String,

    /// Worker pool size.
    pub max_parallelism: usize,

    /// Overall scheduling deadline.
    pub deadline: Option<Duration>,

    pub transport: TransportConfig,

    /// Hypervisor API, required by `vms collect`.
    pub vcenter: Option<VcenterConfig>,

    /// VM snapshot file.
    pub snapshot_path: PathBuf,

    /// Cluster type used for auto-created clusters.
    pub cluster_type: String,

    /// VM identity truncation limit.
    pub vm_name_max: usize,

    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| -> Result<Option<u64>> {
            var(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{key} must be a non-negative integer, got '{v}'"))
                })
                .transpose()
        };
        let secs = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_secs(number(key)?.unwrap_or(default)))
        };

        let inventory = match (var("NETSYNC_INVENTORY_URL"), var("NETSYNC_INVENTORY_TOKEN")) {
            (Some(url), Some(token)) => Some(InventoryConfig {
                url: url.trim_end_matches('/').to_string(),
                token,
                timeout: secs("NETSYNC_INVENTORY_TIMEOUT_SECS", 30)?,
            }),
            (None, None) => None,
            (Some(_), None) => bail!("NETSYNC_INVENTORY_TOKEN is required when NETSYNC_INVENTORY_URL is set"),
            (None, Some(_)) => bail!("NETSYNC_INVENTORY_URL is required when NETSYNC_INVENTORY_TOKEN is set"),
        };

        let vcenter = match var("NETSYNC_VCENTER_URL") {
            Some(url) => Some(VcenterConfig {
                url: url.trim_end_matches('/').to_string(),
                user: var("NETSYNC_VCENTER_USER")
                    .context("NETSYNC_VCENTER_USER is required when NETSYNC_VCENTER_URL is set")?,
                password: var("NETSYNC_VCENTER_PASSWORD").context(
                    "NETSYNC_VCENTER_PASSWORD is required when NETSYNC_VCENTER_URL is set",
                )?,
                insecure: var("NETSYNC_VCENTER_INSECURE")
                    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            }),
            None => None,
        };

        let defaults = TransportConfig::default();
        let transport = TransportConfig {
            ssh_user: var("NETSYNC_SSH_USER").unwrap_or(defaults.ssh_user),
            ssh_key: var("NETSYNC_SSH_KEY").map(PathBuf::from),
            telnet_user: var("NETSYNC_TELNET_USER"),
            telnet_password: var("NETSYNC_TELNET_PASSWORD"),
            connect_timeout: secs("NETSYNC_CONNECT_TIMEOUT_SECS", 30)?,
            command_timeout: secs("NETSYNC_COMMAND_TIMEOUT_SECS", 60)?,
        };

        let max_parallelism = number("NETSYNC_MAX_PARALLELISM")?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_PARALLELISM)
            .clamp(1, MAX_PARALLELISM_LIMIT);

        let vm_name_max = number("NETSYNC_VM_NAME_MAX")?.map(|n| n as usize).unwrap_or(64);
        if vm_name_max == 0 {
            bail!("NETSYNC_VM_NAME_MAX must be at least 1");
        }

        Ok(Self {
            inventory,
            device_tag: var("NETSYNC_DEVICE_TAG").unwrap_or_else(|| "itp_script".to_string()),
            max_parallelism,
            deadline: number("NETSYNC_DEADLINE_SECS")?.map(Duration::from_secs),
            transport,
            vcenter,
            snapshot_path: var("NETSYNC_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output.json")),
            cluster_type: var("NETSYNC_CLUSTER_TYPE").unwrap_or_else(|| "vSphere".to_string()),
            vm_name_max,
            log_level: var("NETSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// The inventory settings, or a configuration error.
    pub fn require_inventory(&self) -> Result<&InventoryConfig> {
        self.inventory
            .as_ref()
            .context("NETSYNC_INVENTORY_URL and NETSYNC_INVENTORY_TOKEN must be set")
    }

    /// The vCenter settings, or a configuration error.
    pub fn require_vcenter(&self) -> Result<&VcenterConfig> {
        self.vcenter
            .as_ref()
            .context("NETSYNC_VCENTER_URL, NETSYNC_VCENTER_USER and NETSYNC_VCENTER_PASSWORD must be set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.inventory.is_none());
        assert!(config.require_inventory().is_err());
        assert_eq!(config.device_tag, "itp_script");
        assert_eq!(config.max_parallelism, 50);
        assert_eq!(config.deadline, None);
        assert_eq!(config.transport.ssh_user, "netsync");
        assert_eq!(config.transport.command_timeout, Duration::from_secs(60));
        assert_eq!(config.snapshot_path, PathBuf::from("output.json"));
        assert_eq!(config.cluster_type, "vSphere");
        assert_eq!(config.vm_name_max, 64);
    }

    #[test]
    fn test_inventory_settings() {
        let config = load(&[
            ("NETSYNC_INVENTORY_URL", "https://netbox.example.net/"),
            ("NETSYNC_INVENTORY_TOKEN", "secret"),
            ("NETSYNC_INVENTORY_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        let inventory = config.require_inventory().unwrap();
        assert_eq!(inventory.url, "https://netbox.example.net");
        assert_eq!(inventory.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_inventory_url_without_token_is_fatal() {
        let err = load(&[("NETSYNC_INVENTORY_URL", "https://netbox")]).unwrap_err();
        assert!(err.to_string().contains("NETSYNC_INVENTORY_TOKEN"));
    }

    #[test]
    fn test_parallelism_is_clamped() {
        let config = load(&[("NETSYNC_MAX_PARALLELISM", "1000")]).unwrap();
        assert_eq!(config.max_parallelism, 256);
        let config = load(&[("NETSYNC_MAX_PARALLELISM", "0")]).unwrap();
        assert_eq!(config.max_parallelism, 1);
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[("NETSYNC_DEADLINE_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("NETSYNC_DEADLINE_SECS"));
    }

    #[test]
    fn test_vcenter_requires_credentials() {
        assert!(load(&[("NETSYNC_VCENTER_URL", "https://vc")]).is_err());
        let config = load(&[
            ("NETSYNC_VCENTER_URL", "https://vc/"),
            ("NETSYNC_VCENTER_USER", "svc"),
            ("NETSYNC_VCENTER_PASSWORD", "pw"),
            ("NETSYNC_VCENTER_INSECURE", "true"),
        ])
        .unwrap();
        let vcenter = config.require_vcenter().unwrap();
        assert_eq!(vcenter.url, "https://vc");
        assert!(vcenter.insecure);
    }
}
