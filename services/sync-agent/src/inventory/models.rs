//! Inventory API object shapes.
//!
//! Only the fields the agent reads are modeled. Nested objects come back as
//! brief representations with at least an `id`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One page of a list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: usize,
    pub next: Option<String>,
    pub results: Vec<T>,
}

/// Brief representation of a related object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedRef {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Choice field (`{ "value": "active", "label": "Active" }`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Choice {
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NestedIp {
    pub id: u64,
    pub address: String,
}

impl NestedIp {
    /// The address without its prefix length.
    pub fn host(&self) -> &str {
        self.address.split('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub name: Option<String>,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: u64,
    pub name: Option<String>,
    pub site: Option<NestedRef>,
    pub platform: Option<NestedRef>,
    pub status: Option<Choice>,
    pub primary_ip: Option<NestedIp>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Device {
    pub fn platform_name(&self) -> Option<&str> {
        self.platform
            .as_ref()
            .and_then(|p| p.name.as_deref().or(p.slug.as_deref()))
    }

    pub fn status_value(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.value.as_str())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "device #{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VlanGroup {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vlan {
    pub id: u64,
    pub vid: u16,
    pub name: String,
    pub status: Option<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cluster {
    pub id: u64,
    pub name: String,
}

/// Objects addressed by name and slug (cluster types, platforms, tenants).
#[derive(Debug, Clone, Deserialize)]
pub struct NamedObject {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VirtualMachine {
    pub id: u64,
    pub name: String,
    pub status: Option<Choice>,
    pub platform: Option<NestedRef>,
    pub tenant: Option<NestedRef>,
    pub vcpus: Option<serde_json::Value>,
    pub memory: Option<serde_json::Value>,
    pub disk: Option<serde_json::Value>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpAddress {
    pub id: u64,
    pub address: String,
    #[serde(default)]
    pub assigned_object_type: Option<String>,
    #[serde(default)]
    pub assigned_object_id: Option<u64>,
}

/// Object returned by a create call.
#[derive(Debug, Clone, Deserialize)]
pub struct Created {
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_from_api() {
        let device: Device = serde_json::from_value(serde_json::json!({
            "id": 7,
            "name": "sw-core-1",
            "site": {"id": 3, "name": "DC1", "slug": "dc1"},
            "platform": {"id": 1, "name": "VRP", "slug": "vrp"},
            "status": {"value": "active", "label": "Active"},
            "primary_ip": {"id": 11, "address": "10.0.0.1/24", "family": 4},
            "tags": [{"id": 1, "name": "itp_script", "slug": "itp_script"}],
            "serial": "ignored"
        }))
        .unwrap();

        assert_eq!(device.platform_name(), Some("VRP"));
        assert_eq!(device.status_value(), Some("active"));
        assert_eq!(device.primary_ip.unwrap().host(), "10.0.0.1");
        assert_eq!(device.tags[0].slug, "itp_script");
    }

    #[test]
    fn test_unnamed_device_display() {
        let device: Device = serde_json::from_value(serde_json::json!({
            "id": 9, "name": null, "site": null, "platform": null,
            "status": null, "primary_ip": null
        }))
        .unwrap();
        assert_eq!(device.to_string(), "device #9");
    }
}
