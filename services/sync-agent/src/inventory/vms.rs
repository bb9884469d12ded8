//! Virtual machine gateway: one cluster per scope.
//!
//! Observed VM attributes use flat keys. `platform` and `tenant` carry
//! names and are resolved to inventory ids on write. Unknown tenants are
//! observed as `null` before planning, since the inventory cannot hold
//! them. Keys prefixed with [`CUSTOM_FIELD_PREFIX`] are written into the
//! `custom_fields` object.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use netsync_reconcile::{
    Attributes, EntityRecord, GatewayError, Identity, InventoryGateway, Scope, ScopeStatus,
    WriteError, WriteOp,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use super::client::NetBoxClient;
use super::error::InventoryError;
use super::models::{Cluster, Created, IpAddress, NamedObject, VirtualMachine};
use super::slugify;

const CLUSTERS: &str = "/api/virtualization/clusters/";
const CLUSTER_TYPES: &str = "/api/virtualization/cluster-types/";
const VIRTUAL_MACHINES: &str = "/api/virtualization/virtual-machines/";
const PLATFORMS: &str = "/api/dcim/platforms/";
const TENANTS: &str = "/api/tenancy/tenants/";
const IP_ADDRESSES: &str = "/api/ipam/ip-addresses/";

/// Attribute key prefix for custom fields.
pub const CUSTOM_FIELD_PREFIX: &str = "custom_fields.";

/// Slug for a new platform: the name without whitespace and punctuation.
pub fn platform_slug(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '.' | '\'' | '(' | ')' | '"' | '+' | '/'))
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

fn strip_whitespace(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Writes virtual machines into inventory clusters.
pub struct NetBoxVmGateway {
    client: NetBoxClient,
    /// Type given to clusters created on demand.
    cluster_type: String,
    clusters: Mutex<HashMap<String, u64>>,
    /// Platform ids keyed by whitespace-free name. Loaded on first use.
    platforms: tokio::sync::Mutex<Option<HashMap<String, u64>>>,
    tenants: Mutex<HashMap<String, Option<u64>>>,
}

impl NetBoxVmGateway {
    pub fn new(client: NetBoxClient, cluster_type: impl Into<String>) -> Self {
        Self {
            client,
            cluster_type: cluster_type.into(),
            clusters: Mutex::new(HashMap::new()),
            platforms: tokio::sync::Mutex::new(None),
            tenants: Mutex::new(HashMap::new()),
        }
    }

    fn cached_cluster(&self, scope: &Scope) -> Option<u64> {
        self.clusters.lock().ok()?.get(&scope.name).copied()
    }

    fn remember_cluster(&self, scope: &Scope, id: u64) {
        if let Ok(mut clusters) = self.clusters.lock() {
            clusters.insert(scope.name.clone(), id);
        }
    }

    async fn lookup_cluster(&self, scope: &Scope) -> Result<Option<u64>, GatewayError> {
        if let Some(id) = self.cached_cluster(scope) {
            return Ok(Some(id));
        }
        let cluster: Option<Cluster> = self
            .client
            .find(CLUSTERS, &[("name", scope.name.clone())])
            .await
            .map_err(|e| GatewayError::Fetch {
                scope: scope.clone(),
                reason: e.to_string(),
            })?;
        if let Some(cluster) = &cluster {
            self.remember_cluster(scope, cluster.id);
        }
        Ok(cluster.map(|c| c.id))
    }

    async fn cluster_id(&self, scope: &Scope) -> Result<u64, GatewayError> {
        self.lookup_cluster(scope)
            .await?
            .ok_or_else(|| GatewayError::ScopeMissing {
                scope: scope.clone(),
                reason: "cluster not found".to_string(),
            })
    }

    async fn cluster_type_id(&self) -> Result<u64, InventoryError> {
        let existing: Option<NamedObject> = self
            .client
            .find(CLUSTER_TYPES, &[("name", self.cluster_type.clone())])
            .await?;
        if let Some(cluster_type) = existing {
            return Ok(cluster_type.id);
        }
        let created: Created = self
            .client
            .post(
                CLUSTER_TYPES,
                &json!({ "name": self.cluster_type, "slug": slugify(&self.cluster_type) }),
            )
            .await?;
        info!(cluster_type = %self.cluster_type, id = created.id, "Created cluster type");
        Ok(created.id)
    }

    /// Resolve a platform name to its id, creating the platform if needed.
    ///
    /// Names are matched with whitespace removed.
    async fn platform_id(&self, name: &str) -> Result<u64, InventoryError> {
        let mut platforms = self.platforms.lock().await;
        if platforms.is_none() {
            let all: Vec<NamedObject> = self.client.list(PLATFORMS, &[]).await?;
            *platforms = Some(
                all.into_iter()
                    .map(|p| (strip_whitespace(&p.name), p.id))
                    .collect(),
            );
        }
        let key = strip_whitespace(name);
        if let Some(id) = platforms.as_ref().and_then(|p| p.get(&key)) {
            return Ok(*id);
        }

        let created: Created = self
            .client
            .post(PLATFORMS, &json!({ "name": name, "slug": platform_slug(name) }))
            .await?;
        info!(platform = %name, id = created.id, "Created platform");
        if let Some(map) = platforms.as_mut() {
            map.insert(key, created.id);
        }
        Ok(created.id)
    }

    /// Resolve a tenant name. Unknown tenants resolve to `None`.
    async fn tenant_id(&self, name: &str) -> Result<Option<u64>, InventoryError> {
        if let Some(cached) = self.tenants.lock().ok().and_then(|t| t.get(name).copied()) {
            return Ok(cached);
        }
        let tenant: Option<NamedObject> = self
            .client
            .find(TENANTS, &[("name", name.to_string())])
            .await?;
        let id = tenant.map(|t| t.id);
        if id.is_none() {
            warn!(tenant = %name, "Tenant not found, leaving VM tenant empty");
        }
        if let Ok(mut tenants) = self.tenants.lock() {
            tenants.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Translate managed attributes into a request body.
    async fn body(&self, attributes: &Attributes) -> Result<Map<String, Value>, InventoryError> {
        let mut body = Map::new();
        let mut custom_fields = Map::new();

        for (field, value) in attributes.iter() {
            match (field.as_str(), value) {
                ("platform", Value::String(name)) if !name.trim().is_empty() => {
                    body.insert(field.clone(), json!(self.platform_id(name).await?));
                }
                ("tenant", Value::String(name)) if !name.trim().is_empty() => {
                    let id = self.tenant_id(name.trim()).await?;
                    body.insert(field.clone(), json!(id));
                }
                ("platform" | "tenant", _) => {
                    body.insert(field.clone(), Value::Null);
                }
                _ => match field.strip_prefix(CUSTOM_FIELD_PREFIX) {
                    Some(key) => {
                        custom_fields.insert(key.to_string(), value.clone());
                    }
                    None => {
                        body.insert(field.clone(), value.clone());
                    }
                },
            }
        }

        if !custom_fields.is_empty() {
            body.insert("custom_fields".to_string(), Value::Object(custom_fields));
        }
        Ok(body)
    }
}

fn vm_path(current: &EntityRecord, op: WriteOp) -> Result<String, WriteError> {
    current
        .handle
        .map(|id| format!("{VIRTUAL_MACHINES}{id}/"))
        .ok_or_else(|| WriteError::new(current.identity.clone(), op, "record has no inventory id"))
}

fn record_from_vm(scope: &Scope, vm: VirtualMachine) -> EntityRecord {
    let mut attributes = Attributes::new();
    if let Some(status) = vm.status {
        attributes.insert("status", status.value);
    }
    for (field, value) in [("vcpus", vm.vcpus), ("memory", vm.memory), ("disk", vm.disk)] {
        if let Some(value) = value {
            attributes.insert(field, value);
        }
    }
    if let Some(name) = vm.platform.and_then(|p| p.name) {
        attributes.insert("platform", name);
    }
    if let Some(name) = vm.tenant.and_then(|t| t.name) {
        attributes.insert("tenant", name);
    }
    for (key, value) in vm.custom_fields {
        attributes.insert(format!("{CUSTOM_FIELD_PREFIX}{key}"), value);
    }
    EntityRecord::new(Identity::Name(vm.name), scope.clone(), attributes).with_handle(vm.id)
}

#[async_trait]
impl InventoryGateway for NetBoxVmGateway {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn ensure_scope(&self, scope: &Scope) -> Result<ScopeStatus, GatewayError> {
        if self.lookup_cluster(scope).await?.is_some() {
            return Ok(ScopeStatus::Existing);
        }

        let missing = |e: InventoryError| GatewayError::ScopeMissing {
            scope: scope.clone(),
            reason: e.to_string(),
        };
        let type_id = self.cluster_type_id().await.map_err(missing)?;
        let created: Created = self
            .client
            .post(CLUSTERS, &json!({ "name": scope.name, "type": type_id }))
            .await
            .map_err(missing)?;
        info!(cluster_id = created.id, "Created cluster");
        self.remember_cluster(scope, created.id);
        Ok(ScopeStatus::Created)
    }

    async fn scope_exists(&self, scope: &Scope) -> Result<bool, GatewayError> {
        Ok(self.lookup_cluster(scope).await?.is_some())
    }

    /// Observe tenants missing from the inventory as `null`.
    async fn resolve_observed(
        &self,
        scope: &Scope,
        mut observed: Vec<EntityRecord>,
    ) -> Result<Vec<EntityRecord>, GatewayError> {
        for record in &mut observed {
            let Some(name) = record.attributes.get_str("tenant").map(str::trim) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let id = self
                .tenant_id(name)
                .await
                .map_err(|e| GatewayError::Fetch {
                    scope: scope.clone(),
                    reason: e.to_string(),
                })?;
            if id.is_none() {
                record.attributes.insert("tenant", Value::Null);
            }
        }
        Ok(observed)
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn fetch_scoped(&self, scope: &Scope) -> Result<Vec<EntityRecord>, GatewayError> {
        let cluster_id = self.cluster_id(scope).await?;
        let vms: Vec<VirtualMachine> = self
            .client
            .list(VIRTUAL_MACHINES, &[("cluster_id", cluster_id.to_string())])
            .await
            .map_err(|e| GatewayError::Fetch {
                scope: scope.clone(),
                reason: e.to_string(),
            })?;
        debug!(count = vms.len(), "Fetched virtual machines");
        Ok(vms.into_iter().map(|vm| record_from_vm(scope, vm)).collect())
    }

    async fn create(&self, scope: &Scope, record: &EntityRecord) -> Result<(), WriteError> {
        let fail = |cause: String| WriteError::new(record.identity.clone(), WriteOp::Create, cause);
        let Identity::Name(name) = &record.identity else {
            return Err(fail("VM records need a name identity".to_string()));
        };
        let cluster_id = self.cluster_id(scope).await.map_err(|e| fail(e.to_string()))?;

        let mut body = self
            .body(&record.attributes)
            .await
            .map_err(|e| fail(e.to_string()))?;
        body.insert("name".to_string(), json!(name));
        body.insert("cluster".to_string(), json!(cluster_id));

        let _: Created = self
            .client
            .post(VIRTUAL_MACHINES, &Value::Object(body))
            .await
            .map_err(|e| fail(e.to_string()))?;
        debug!(scope = %scope, vm = %name, "Created virtual machine");
        Ok(())
    }

    async fn update(&self, current: &EntityRecord, changes: &Attributes) -> Result<(), WriteError> {
        let fail = |e: InventoryError| WriteError::new(current.identity.clone(), WriteOp::Update, e);
        let path = vm_path(current, WriteOp::Update)?;
        let body = self.body(changes).await.map_err(fail)?;
        self.client.patch(&path, &Value::Object(body)).await.map_err(fail)
    }

    async fn delete(&self, current: &EntityRecord) -> Result<(), WriteError> {
        let path = vm_path(current, WriteOp::Delete)?;
        self.client
            .delete(&path)
            .await
            .map_err(|e| WriteError::new(current.identity.clone(), WriteOp::Delete, e))
    }

    /// Unassign the VM's IP addresses so they outlive it.
    async fn detach_references(&self, current: &EntityRecord) -> Result<usize, WriteError> {
        let fail = |e: InventoryError| WriteError::new(current.identity.clone(), WriteOp::Detach, e);
        let Some(vm_id) = current.handle else {
            return Ok(0);
        };

        let addresses: Vec<IpAddress> = self
            .client
            .list(IP_ADDRESSES, &[("virtual_machine_id", vm_id.to_string())])
            .await
            .map_err(fail)?;

        let mut detached = 0;
        for address in addresses.iter().filter(|a| a.assigned_object_id.is_some()) {
            self.client
                .patch(
                    &format!("{IP_ADDRESSES}{}/", address.id),
                    &json!({ "assigned_object_type": null, "assigned_object_id": null }),
                )
                .await
                .map_err(fail)?;
            debug!(vm = %current.identity, address = %address.address, "Detached IP address");
            detached += 1;
        }
        Ok(detached)
    }
}
