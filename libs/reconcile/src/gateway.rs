//! Inventory gateway interface.

use async_trait::async_trait;

use crate::error::{GatewayError, WriteError};
use crate::record::{Attributes, EntityRecord, Scope};

/// Whether a scope existed before the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeStatus {
    Existing,
    Created,
    /// Missing and left alone (dry run).
    Missing,
}

/// Read and write access to one kind of inventory entity.
///
/// Writes are addressed by the `handle` of records returned from
/// [`fetch_scoped`](Self::fetch_scoped). Retrying a create or update is safe.
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Make sure the scope exists, creating it if missing.
    async fn ensure_scope(&self, scope: &Scope) -> Result<ScopeStatus, GatewayError>;

    /// Check whether the scope exists without creating it.
    async fn scope_exists(&self, scope: &Scope) -> Result<bool, GatewayError>;

    /// Rewrite observed attributes into the values the inventory can store.
    ///
    /// Runs before planning so that a value the inventory would drop on
    /// write is compared as what it will become.
    async fn resolve_observed(
        &self,
        _scope: &Scope,
        observed: Vec<EntityRecord>,
    ) -> Result<Vec<EntityRecord>, GatewayError> {
        Ok(observed)
    }

    /// Fetch every current entry of the scope.
    async fn fetch_scoped(&self, scope: &Scope) -> Result<Vec<EntityRecord>, GatewayError>;

    /// Create an entry.
    async fn create(&self, scope: &Scope, record: &EntityRecord) -> Result<(), WriteError>;

    /// Apply changed fields to an existing entry.
    async fn update(&self, current: &EntityRecord, changes: &Attributes) -> Result<(), WriteError>;

    /// Delete an existing entry.
    async fn delete(&self, current: &EntityRecord) -> Result<(), WriteError>;

    /// Clear references other records hold to `current` so they survive its
    /// deletion. Returns how many references were cleared.
    async fn detach_references(&self, _current: &EntityRecord) -> Result<usize, WriteError> {
        Ok(0)
    }
}
