//! Entity records: the unit of comparison between observed and inventory state.

use std::collections::BTreeMap;

use netsync_id::VlanId;
use serde::{Deserialize, Serialize};

/// Stable key of an entity within its scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    /// VLANs are keyed by their numeric id.
    Vlan(VlanId),

    /// Virtual machines are keyed by their (truncated) name.
    Name(String),
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vlan(vid) => write!(f, "vlan {vid}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<VlanId> for Identity {
    fn from(vid: VlanId) -> Self {
        Self::Vlan(vid)
    }
}

/// Kind of inventory container a scope names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// VLAN group, one per device.
    VlanGroup,

    /// Virtualization cluster.
    Cluster,
}

/// The inventory container a reconciliation run is confined to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
}

impl Scope {
    /// VLAN group scope.
    pub fn vlan_group(name: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::VlanGroup,
            name: name.into(),
        }
    }

    /// Cluster scope.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Cluster,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ScopeKind::VlanGroup => write!(f, "vlan-group:{}", self.name),
            ScopeKind::Cluster => write!(f, "cluster:{}", self.name),
        }
    }
}

/// Ordered field name → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, serde_json::Value>);

impl Attributes {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// Get a string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(|v| v.as_str())
    }

    /// Iterate fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite fields with the values from `other`.
    pub fn merge(&mut self, other: &Attributes) {
        for (field, value) in other.iter() {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Convert to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.clone().into_iter().collect())
    }
}

impl FromIterator<(String, serde_json::Value)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Attributes {
    type Item = (String, serde_json::Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, serde_json::Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// One entity, either observed at the source or fetched from the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Key within the scope.
    pub identity: Identity,

    /// Scope the record belongs to.
    pub scope: Scope,

    /// Managed attributes.
    pub attributes: Attributes,

    /// Inventory primary key, set on fetched records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,

    /// Raw name before truncation, set when the identity was derived by
    /// truncating it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

impl EntityRecord {
    /// Create a record without an inventory handle.
    pub fn new(identity: impl Into<Identity>, scope: Scope, attributes: Attributes) -> Self {
        Self {
            identity: identity.into(),
            scope,
            attributes,
            handle: None,
            source_name: None,
        }
    }

    /// Set the inventory handle.
    #[must_use]
    pub fn with_handle(mut self, handle: u64) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Set the untruncated source name.
    #[must_use]
    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    /// The name the identity was derived from.
    pub fn raw_name(&self) -> Option<&str> {
        match (&self.source_name, &self.identity) {
            (Some(raw), _) => Some(raw),
            (None, Identity::Name(name)) => Some(name),
            (None, Identity::Vlan(_)) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let vid = VlanId::new(100).unwrap();
        assert_eq!(Identity::from(vid).to_string(), "vlan 100");
        assert_eq!(Identity::Name("web-01".into()).to_string(), "web-01");
    }

    #[test]
    fn test_identity_json_is_untagged() {
        let vid = Identity::Vlan(VlanId::new(42).unwrap());
        assert_eq!(serde_json::to_string(&vid).unwrap(), "42");
        let name = Identity::Name("db".into());
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"db\"");
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::vlan_group("sw-core-1").to_string(), "vlan-group:sw-core-1");
        assert_eq!(Scope::cluster("prod").to_string(), "cluster:prod");
    }

    #[test]
    fn test_attributes_are_ordered() {
        let attrs = Attributes::new().with("status", "active").with("name", "Guest");
        let fields: Vec<_> = attrs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(fields, vec!["name", "status"]);
        assert_eq!(attrs.get_str("name"), Some("Guest"));
    }

    #[test]
    fn test_raw_name_prefers_source_name() {
        let scope = Scope::cluster("prod");
        let record = EntityRecord::new(Identity::Name("short".into()), scope, Attributes::new())
            .with_source_name("short-but-originally-longer");
        assert_eq!(record.raw_name(), Some("short-but-originally-longer"));
    }
}
