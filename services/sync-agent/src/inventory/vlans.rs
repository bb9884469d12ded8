//! VLAN gateway: one VLAN group per device.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use netsync_id::VlanId;
use netsync_reconcile::{
    Attributes, EntityRecord, GatewayError, Identity, InventoryGateway, Scope, ScopeStatus,
    WriteError, WriteOp,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use super::client::NetBoxClient;
use super::models::{Created, Vlan, VlanGroup};
use super::slugify;

const VLAN_GROUPS: &str = "/api/ipam/vlan-groups/";
const VLANS: &str = "/api/ipam/vlans/";

/// Writes VLANs into the VLAN group named after a device.
pub struct NetBoxVlanGateway {
    client: NetBoxClient,
    /// Site of the device; new VLANs are created in it.
    site_id: Option<u64>,
    groups: Mutex<HashMap<String, u64>>,
}

impl NetBoxVlanGateway {
    pub fn new(client: NetBoxClient, site_id: Option<u64>) -> Self {
        Self {
            client,
            site_id,
            groups: Mutex::new(HashMap::new()),
        }
    }

    fn cached_group(&self, scope: &Scope) -> Option<u64> {
        self.groups.lock().ok()?.get(&scope.name).copied()
    }

    fn remember_group(&self, scope: &Scope, id: u64) {
        if let Ok(mut groups) = self.groups.lock() {
            groups.insert(scope.name.clone(), id);
        }
    }

    async fn lookup_group(&self, scope: &Scope) -> Result<Option<u64>, GatewayError> {
        if let Some(id) = self.cached_group(scope) {
            return Ok(Some(id));
        }
        let group: Option<VlanGroup> = self
            .client
            .find(VLAN_GROUPS, &[("name", scope.name.clone())])
            .await
            .map_err(|e| GatewayError::Fetch {
                scope: scope.clone(),
                reason: e.to_string(),
            })?;
        if let Some(group) = &group {
            self.remember_group(scope, group.id);
        }
        Ok(group.map(|g| g.id))
    }

    async fn group_id(&self, scope: &Scope) -> Result<u64, GatewayError> {
        self.lookup_group(scope)
            .await?
            .ok_or_else(|| GatewayError::ScopeMissing {
                scope: scope.clone(),
                reason: "VLAN group not found".to_string(),
            })
    }
}

fn vlan_path(current: &EntityRecord, op: WriteOp) -> Result<String, WriteError> {
    current
        .handle
        .map(|id| format!("{VLANS}{id}/"))
        .ok_or_else(|| WriteError::new(current.identity.clone(), op, "record has no inventory id"))
}

fn record_from_vlan(scope: &Scope, vlan: Vlan) -> Result<EntityRecord, GatewayError> {
    let vid = VlanId::new(u32::from(vlan.vid))
        .map_err(|e| GatewayError::InvalidData(format!("VLAN #{}: {e}", vlan.id)))?;
    let mut attributes = Attributes::new().with("name", vlan.name);
    if let Some(status) = vlan.status {
        attributes.insert("status", status.value);
    }
    Ok(EntityRecord::new(vid, scope.clone(), attributes).with_handle(vlan.id))
}

#[async_trait]
impl InventoryGateway for NetBoxVlanGateway {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn ensure_scope(&self, scope: &Scope) -> Result<ScopeStatus, GatewayError> {
        if self.lookup_group(scope).await?.is_some() {
            return Ok(ScopeStatus::Existing);
        }

        let created: Created = self
            .client
            .post(
                VLAN_GROUPS,
                &json!({ "name": scope.name, "slug": slugify(&scope.name) }),
            )
            .await
            .map_err(|e| GatewayError::ScopeMissing {
                scope: scope.clone(),
                reason: e.to_string(),
            })?;
        info!(group_id = created.id, "Created VLAN group");
        self.remember_group(scope, created.id);
        Ok(ScopeStatus::Created)
    }

    async fn scope_exists(&self, scope: &Scope) -> Result<bool, GatewayError> {
        Ok(self.lookup_group(scope).await?.is_some())
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn fetch_scoped(&self, scope: &Scope) -> Result<Vec<EntityRecord>, GatewayError> {
        let group_id = self.group_id(scope).await?;
        let vlans: Vec<Vlan> = self
            .client
            .list(VLANS, &[("group_id", group_id.to_string())])
            .await
            .map_err(|e| GatewayError::Fetch {
                scope: scope.clone(),
                reason: e.to_string(),
            })?;
        debug!(count = vlans.len(), "Fetched VLANs");
        vlans
            .into_iter()
            .map(|vlan| record_from_vlan(scope, vlan))
            .collect()
    }

    async fn create(&self, scope: &Scope, record: &EntityRecord) -> Result<(), WriteError> {
        let fail = |cause: String| WriteError::new(record.identity.clone(), WriteOp::Create, cause);
        let Identity::Vlan(vid) = &record.identity else {
            return Err(fail("VLAN records need a numeric identity".to_string()));
        };
        let group_id = self.group_id(scope).await.map_err(|e| fail(e.to_string()))?;

        let mut body = Map::new();
        if let Some(site) = self.site_id {
            body.insert("site".to_string(), json!(site));
        }
        body.insert("group".to_string(), json!(group_id));
        body.insert("vid".to_string(), json!(vid.value()));
        for (field, value) in record.attributes.iter() {
            body.insert(field.clone(), value.clone());
        }

        let _: Created = self
            .client
            .post(VLANS, &Value::Object(body))
            .await
            .map_err(|e| fail(e.to_string()))?;
        debug!(scope = %scope, vid = %vid, "Created VLAN");
        Ok(())
    }

    async fn update(&self, current: &EntityRecord, changes: &Attributes) -> Result<(), WriteError> {
        let path = vlan_path(current, WriteOp::Update)?;
        self.client
            .patch(&path, &changes.to_json())
            .await
            .map_err(|e| WriteError::new(current.identity.clone(), WriteOp::Update, e))
    }

    async fn delete(&self, current: &EntityRecord) -> Result<(), WriteError> {
        let path = vlan_path(current, WriteOp::Delete)?;
        self.client
            .delete(&path)
            .await
            .map_err(|e| WriteError::new(current.identity.clone(), WriteOp::Delete, e))
    }
}
