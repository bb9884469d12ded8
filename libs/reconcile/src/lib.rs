//! Reconciliation engine.
//!
//! This library converges an inventory (the source of truth) to what was
//! observed on live infrastructure. Key concepts:
//!
//! - **Observed set**: entities read from a device or hypervisor.
//! - **Current set**: entities the inventory holds for the same scope.
//! - **Plan**: the creates, updates and deletes that make current match
//!   observed.
//!
//! # Invariants
//!
//! - Reconciliation never crosses a scope boundary
//! - A second run against an unchanged source issues no writes
//! - Every identity of `observed ∪ current` lands in exactly one plan bucket
//! - A record is deleted only after references to it were detached
//! - One failing write or target never aborts its siblings

mod error;
mod gateway;
mod memory;
mod naming;
mod orchestrator;
mod plan;
mod policy;
mod reconciler;
mod record;
mod report;

pub use error::{CollectionError, DataQualityWarning, GatewayError, UnitError, WriteError, WriteOp};
pub use gateway::{InventoryGateway, ScopeStatus};
pub use memory::InMemoryGateway;
pub use naming::{derive_vlan_name, is_placeholder_name, vm_identity, DerivedName, VlanNaming};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, DEFAULT_MAX_PARALLELISM, MAX_PARALLELISM_LIMIT,
};
pub use plan::{canonical_json, compute_plan, PlanFingerprint, PlannedUpdate, ReconciliationPlan};
pub use policy::{ComparePolicy, FieldPolicies};
pub use reconciler::{ApplyMode, ReconciliationResult, Reconciler};
pub use record::{Attributes, EntityRecord, Identity, Scope, ScopeKind};
pub use report::{AggregateReport, Reporter, TargetOutcome, TargetReport, Totals};
