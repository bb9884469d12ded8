//! Reconciler: converges one inventory scope to an observation.
//!
//! The reconciler:
//! - Makes sure the scope exists (creating it when missing)
//! - Fetches the current entries once
//! - Computes the plan and applies it in create → update → delete order
//! - Detaches references before each delete and never deletes when that fails

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{DataQualityWarning, GatewayError, WriteError, WriteOp};
use crate::gateway::{InventoryGateway, ScopeStatus};
use crate::plan::{compute_plan, PlanFingerprint, ReconciliationPlan};
use crate::policy::FieldPolicies;
use crate::record::{EntityRecord, Scope};

/// Whether planned writes are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    #[default]
    Apply,

    /// Compute and log the plan only.
    DryRun,
}

/// Outcome of reconciling one scope.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub scope: Scope,
    pub scope_status: ScopeStatus,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub quarantined: usize,
    /// References cleared ahead of deletes.
    pub detached: usize,
    pub failures: Vec<WriteError>,
    pub warnings: Vec<DataQualityWarning>,
    pub dry_run: bool,
    pub fingerprint: PlanFingerprint,
}

impl ReconciliationResult {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Writes that went through (or would have, in a dry run).
    pub fn succeeded(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// True when writes were planned and none of them succeeded.
    pub fn is_total_failure(&self) -> bool {
        self.failed() > 0 && self.succeeded() == 0
    }

    /// True when the scope was auto-created during this run.
    pub fn scope_created(&self) -> bool {
        self.scope_status == ScopeStatus::Created
    }
}

/// Converges scopes through an [`InventoryGateway`].
#[derive(Debug, Clone)]
pub struct Reconciler {
    policies: FieldPolicies,
    mode: ApplyMode,
}

impl Reconciler {
    /// Create a reconciler with the given field policies.
    pub fn new(policies: FieldPolicies) -> Self {
        Self {
            policies,
            mode: ApplyMode::Apply,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ApplyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ApplyMode {
        self.mode
    }

    /// Converge `scope` to `observed`.
    ///
    /// Fails only when the scope cannot be prepared or fetched. Write
    /// failures are recorded in the result.
    #[instrument(skip_all, fields(scope = %scope, observed = observed.len()))]
    pub async fn reconcile<G>(
        &self,
        gateway: &G,
        scope: &Scope,
        observed: Vec<EntityRecord>,
    ) -> Result<ReconciliationResult, GatewayError>
    where
        G: InventoryGateway + ?Sized,
    {
        let (scope_status, current) = match self.mode {
            ApplyMode::Apply => {
                let status = gateway.ensure_scope(scope).await?;
                if status == ScopeStatus::Created {
                    info!(scope = %scope, "Created missing scope");
                    (status, Vec::new())
                } else {
                    (status, gateway.fetch_scoped(scope).await?)
                }
            }
            ApplyMode::DryRun => {
                if gateway.scope_exists(scope).await? {
                    (ScopeStatus::Existing, gateway.fetch_scoped(scope).await?)
                } else {
                    (ScopeStatus::Missing, Vec::new())
                }
            }
        };

        let observed = gateway.resolve_observed(scope, observed).await?;
        let plan = compute_plan(scope, observed, current, &self.policies);
        for warning in &plan.warnings {
            warn!(scope = %scope, warning = %warning, "Data quality warning");
        }

        Ok(self.apply(gateway, plan, scope_status).await)
    }

    /// Apply a computed plan.
    pub async fn apply<G>(
        &self,
        gateway: &G,
        plan: ReconciliationPlan,
        scope_status: ScopeStatus,
    ) -> ReconciliationResult
    where
        G: InventoryGateway + ?Sized,
    {
        let fingerprint = plan.fingerprint();
        let mut result = ReconciliationResult {
            scope: plan.scope.clone(),
            scope_status,
            created: 0,
            updated: 0,
            deleted: 0,
            unchanged: plan.unchanged.len(),
            quarantined: plan.quarantined.len(),
            detached: 0,
            failures: Vec::new(),
            warnings: plan.warnings.clone(),
            dry_run: self.mode == ApplyMode::DryRun,
            fingerprint,
        };

        if self.mode == ApplyMode::DryRun {
            info!(
                scope = %plan.scope,
                fingerprint = %result.fingerprint,
                create = plan.to_create.len(),
                update = plan.to_update.len(),
                delete = plan.to_delete.len(),
                unchanged = result.unchanged,
                "Dry run, plan not applied"
            );
            result.created = plan.to_create.len();
            result.updated = plan.to_update.len();
            result.deleted = plan.to_delete.len();
            return result;
        }

        for record in &plan.to_create {
            match gateway.create(&plan.scope, record).await {
                Ok(()) => {
                    debug!(identity = %record.identity, "Created");
                    result.created += 1;
                }
                Err(e) => {
                    warn!(identity = %record.identity, error = %e, "Create failed");
                    result.failures.push(e);
                }
            }
        }

        for update in &plan.to_update {
            let identity = &update.current.identity;
            match gateway.update(&update.current, &update.changes).await {
                Ok(()) => {
                    debug!(identity = %identity, fields = update.changes.len(), "Updated");
                    result.updated += 1;
                }
                Err(e) => {
                    warn!(identity = %identity, error = %e, "Update failed");
                    result.failures.push(e);
                }
            }
        }

        for record in &plan.to_delete {
            match gateway.detach_references(record).await {
                Ok(detached) => result.detached += detached,
                Err(e) => {
                    warn!(identity = %record.identity, error = %e, "Detach failed, delete skipped");
                    result.failures.push(WriteError {
                        op: WriteOp::Detach,
                        ..e
                    });
                    continue;
                }
            }
            match gateway.delete(record).await {
                Ok(()) => {
                    debug!(identity = %record.identity, "Deleted");
                    result.deleted += 1;
                }
                Err(e) => {
                    warn!(identity = %record.identity, error = %e, "Delete failed");
                    result.failures.push(e);
                }
            }
        }

        info!(
            scope = %plan.scope,
            created = result.created,
            updated = result.updated,
            deleted = result.deleted,
            unchanged = result.unchanged,
            failed = result.failed(),
            "Reconciled scope"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryGateway;
    use crate::record::{Attributes, Identity};
    use netsync_id::VlanId;

    fn group() -> Scope {
        Scope::vlan_group("sw1")
    }

    fn vid(v: u32) -> VlanId {
        VlanId::new(v).unwrap()
    }

    fn vlan(v: u32, name: &str) -> EntityRecord {
        EntityRecord::new(
            vid(v),
            group(),
            Attributes::new().with("name", name).with("status", "active"),
        )
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(FieldPolicies::vlan())
    }

    #[tokio::test]
    async fn test_literal_scenario() {
        let gateway = InMemoryGateway::new();
        gateway.seed(&group(), vec![vlan(200, "Management"), vlan(300, "Old")]);

        let observed = vec![vlan(100, "Guest"), vlan(200, "Mgmt")];
        let result = reconciler()
            .reconcile(&gateway, &group(), observed)
            .await
            .unwrap();

        assert_eq!((result.created, result.updated, result.deleted), (1, 1, 1));
        assert_eq!(result.failed(), 0);

        let names = gateway.names(&group());
        assert_eq!(
            names,
            vec![
                (Identity::Vlan(vid(100)), "Guest".to_string()),
                (Identity::Vlan(vid(200)), "Mgmt".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let gateway = InMemoryGateway::new();
        gateway.seed(&group(), vec![vlan(300, "Old")]);
        let observed = vec![vlan(100, "Guest"), vlan(200, "Mgmt")];

        reconciler()
            .reconcile(&gateway, &group(), observed.clone())
            .await
            .unwrap();
        let writes_after_first = gateway.write_count();

        let second = reconciler()
            .reconcile(&gateway, &group(), observed)
            .await
            .unwrap();

        assert_eq!(second.succeeded(), 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(gateway.write_count(), writes_after_first);
    }

    #[tokio::test]
    async fn test_inventory_duplicates_collapse_to_one_record() {
        let gateway = InMemoryGateway::new();
        gateway.seed(&group(), vec![vlan(10, "old"), vlan(10, "Users")]);
        let observed = vec![vlan(10, "Users")];

        let first = reconciler()
            .reconcile(&gateway, &group(), observed.clone())
            .await
            .unwrap();

        assert_eq!(first.deleted, 1);
        assert_eq!(first.unchanged, 1);
        assert_eq!(
            gateway.names(&group()),
            vec![(Identity::Vlan(vid(10)), "Users".to_string())]
        );

        let second = reconciler()
            .reconcile(&gateway, &group(), observed)
            .await
            .unwrap();
        assert_eq!(second.succeeded(), 0);
        assert!(second.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_scope_is_created() {
        let gateway = InMemoryGateway::new();
        let result = reconciler()
            .reconcile(&gateway, &group(), vec![vlan(10, "Users")])
            .await
            .unwrap();

        assert!(result.scope_created());
        assert_eq!(result.created, 1);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_abort_others() {
        let gateway = InMemoryGateway::new();
        gateway.seed(&group(), vec![vlan(300, "Old")]);
        gateway.fail_on(Identity::Vlan(vid(100)), WriteOp::Create);

        let observed = vec![vlan(100, "Guest"), vlan(101, "Voice")];
        let result = reconciler()
            .reconcile(&gateway, &group(), observed)
            .await
            .unwrap();

        assert_eq!(result.created, 1);
        assert_eq!(result.deleted, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].identity, Identity::Vlan(vid(100)));
        assert!(!result.is_total_failure());
    }

    #[tokio::test]
    async fn test_detach_runs_before_delete() {
        let scope = Scope::cluster("prod");
        let gateway = InMemoryGateway::new();
        let old = EntityRecord::new(
            Identity::Name("legacy".into()),
            scope.clone(),
            Attributes::new().with("status", "active"),
        );
        gateway.seed(&scope, vec![old]);
        gateway.add_reference(Identity::Name("legacy".into()), "10.0.0.5/24");

        let result = Reconciler::new(FieldPolicies::vm())
            .reconcile(&gateway, &scope, vec![])
            .await
            .unwrap();

        assert_eq!(result.deleted, 1);
        assert_eq!(result.detached, 1);
        assert_eq!(gateway.detached_references(), vec!["10.0.0.5/24".to_string()]);
        assert_eq!(
            gateway.operations(),
            vec![
                (WriteOp::Detach, Identity::Name("legacy".into())),
                (WriteOp::Delete, Identity::Name("legacy".into())),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_detach_skips_delete() {
        let scope = Scope::cluster("prod");
        let gateway = InMemoryGateway::new();
        let old = EntityRecord::new(Identity::Name("legacy".into()), scope.clone(), Attributes::new());
        gateway.seed(&scope, vec![old]);
        gateway.fail_on(Identity::Name("legacy".into()), WriteOp::Detach);

        let result = Reconciler::new(FieldPolicies::vm())
            .reconcile(&gateway, &scope, vec![])
            .await
            .unwrap();

        assert_eq!(result.deleted, 0);
        assert_eq!(result.failures[0].op, WriteOp::Detach);
        assert!(result.is_total_failure());
        assert_eq!(gateway.len(&scope), 1);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let gateway = InMemoryGateway::new();
        gateway.seed(&group(), vec![vlan(300, "Old")]);

        let result = reconciler()
            .with_mode(ApplyMode::DryRun)
            .reconcile(&gateway, &group(), vec![vlan(100, "Guest")])
            .await
            .unwrap();

        assert!(result.dry_run);
        assert_eq!((result.created, result.deleted), (1, 1));
        assert_eq!(gateway.write_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_create_scope() {
        let gateway = InMemoryGateway::new();
        let result = reconciler()
            .with_mode(ApplyMode::DryRun)
            .reconcile(&gateway, &group(), vec![vlan(100, "Guest")])
            .await
            .unwrap();

        assert_eq!(result.scope_status, ScopeStatus::Missing);
        assert!(!gateway.has_scope(&group()));
    }

    fn arb_vlans() -> impl proptest::strategy::Strategy<Value = Vec<EntityRecord>> {
        use proptest::prelude::*;
        prop::collection::vec((1u32..30, "[a-d]{1,3}"), 0..15)
            .prop_map(|rows| rows.into_iter().map(|(v, name)| vlan(v, &name)).collect())
    }

    proptest::proptest! {
        #[test]
        fn prop_reconcile_converges(observed in arb_vlans(), current in arb_vlans()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let gateway = InMemoryGateway::new();
                gateway.seed(&group(), current);

                reconciler()
                    .reconcile(&gateway, &group(), observed.clone())
                    .await
                    .unwrap();
                let after = gateway.fetch_scoped(&group()).await.unwrap();
                let distinct: std::collections::BTreeSet<_> =
                    after.iter().map(|r| r.identity.clone()).collect();
                assert_eq!(distinct.len(), after.len(), "duplicates survived: {after:?}");

                let plan = compute_plan(&group(), observed, after, &FieldPolicies::vlan());
                assert!(plan.is_empty(), "not converged: {plan:?}");
            });
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_is_a_gateway_error() {
        let gateway = InMemoryGateway::new();
        gateway.seed(&group(), vec![]);
        gateway.fail_fetch(true);

        let err = reconciler()
            .reconcile(&gateway, &group(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Fetch { .. }));
    }
}
