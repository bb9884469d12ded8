//! Plan computation.
//!
//! A plan partitions every identity of `observed ∪ current` into exactly one
//! of create, update, delete, unchanged or quarantined. Inventory duplicates
//! hidden behind the record that wins their identity are deleted on top.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::DataQualityWarning;
use crate::policy::FieldPolicies;
use crate::record::{Attributes, EntityRecord, Identity, Scope};

/// An update to an existing inventory record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedUpdate {
    /// The inventory record as fetched.
    pub current: EntityRecord,

    /// Only the fields that differ, with their observed values.
    pub changes: Attributes,
}

/// The writes needed to converge one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationPlan {
    pub scope: Scope,
    pub to_create: Vec<EntityRecord>,
    pub to_update: Vec<PlannedUpdate>,
    pub to_delete: Vec<EntityRecord>,
    pub unchanged: Vec<Identity>,
    /// Identities left untouched because their observation is unreliable.
    pub quarantined: Vec<Identity>,
    pub warnings: Vec<DataQualityWarning>,
}

impl ReconciliationPlan {
    /// Number of planned writes.
    pub fn write_count(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    /// True when the scope already matches the observation.
    pub fn is_empty(&self) -> bool {
        self.write_count() == 0
    }

    /// Deterministic fingerprint of the planned writes.
    pub fn fingerprint(&self) -> PlanFingerprint {
        let creates: Vec<_> = self
            .to_create
            .iter()
            .map(|r| serde_json::json!([r.identity, r.attributes]))
            .collect();
        let updates: Vec<_> = self
            .to_update
            .iter()
            .map(|u| serde_json::json!([u.current.identity, u.changes]))
            .collect();
        let deletes: Vec<_> = self.to_delete.iter().map(|r| &r.identity).collect();

        PlanFingerprint::from_json(&serde_json::json!({
            "scope": self.scope,
            "create": creates,
            "update": updates,
            "delete": deletes,
        }))
    }
}

/// Compute the plan for one scope.
///
/// Both inputs are indexed by identity with the last occurrence winning.
/// Inventory records shadowed by a later duplicate are deleted. Records from
/// another scope are dropped. An identity observed under two or more
/// different raw names is quarantined.
pub fn compute_plan(
    scope: &Scope,
    observed: Vec<EntityRecord>,
    current: Vec<EntityRecord>,
    policies: &FieldPolicies,
) -> ReconciliationPlan {
    let mut warnings = Vec::new();
    let mut quarantine = BTreeSet::new();

    let (observed, _) = index(scope, observed, &mut warnings, &mut quarantine);
    let (current, shadowed) = index(scope, current, &mut warnings, &mut quarantine);

    let mut plan = ReconciliationPlan {
        scope: scope.clone(),
        to_create: Vec::new(),
        to_update: Vec::new(),
        to_delete: Vec::new(),
        unchanged: Vec::new(),
        quarantined: quarantine.iter().cloned().collect(),
        warnings,
    };

    for (identity, record) in observed.iter() {
        if quarantine.contains(identity) {
            continue;
        }
        match current.get(identity) {
            None => plan.to_create.push(record.clone()),
            Some(existing) => {
                let changes = policies.diff(&record.attributes, &existing.attributes);
                if changes.is_empty() {
                    plan.unchanged.push(identity.clone());
                } else {
                    plan.to_update.push(PlannedUpdate {
                        current: existing.clone(),
                        changes,
                    });
                }
            }
        }
    }

    plan.to_delete = current
        .into_iter()
        .filter(|(identity, _)| !observed.contains_key(identity) && !quarantine.contains(identity))
        .map(|(_, record)| record)
        .collect();
    plan.to_delete.extend(
        shadowed
            .into_iter()
            .filter(|record| !quarantine.contains(&record.identity)),
    );

    plan
}

fn index(
    scope: &Scope,
    records: Vec<EntityRecord>,
    warnings: &mut Vec<DataQualityWarning>,
    quarantine: &mut BTreeSet<Identity>,
) -> (BTreeMap<Identity, EntityRecord>, Vec<EntityRecord>) {
    let mut by_identity = BTreeMap::new();
    let mut shadowed = Vec::new();
    let mut seen: BTreeMap<Identity, (usize, BTreeSet<String>)> = BTreeMap::new();

    for record in records {
        if &record.scope != scope {
            warnings.push(DataQualityWarning::ScopeMismatch {
                identity: record.identity.clone(),
                scope: record.scope.clone(),
            });
            continue;
        }
        let entry = seen.entry(record.identity.clone()).or_default();
        entry.0 += 1;
        if let Some(raw) = record.raw_name() {
            entry.1.insert(raw.to_string());
        }
        if let Some(previous) = by_identity.insert(record.identity.clone(), record) {
            shadowed.push(previous);
        }
    }

    for (identity, (occurrences, raw_names)) in seen {
        if raw_names.len() > 1 {
            quarantine.insert(identity.clone());
            warnings.push(DataQualityWarning::TruncationCollision {
                identity,
                source_names: raw_names.into_iter().collect(),
            });
        } else if occurrences > 1 {
            warnings.push(DataQualityWarning::DuplicateIdentity {
                identity,
                occurrences,
            });
        }
    }

    (by_identity, shadowed)
}

/// A fingerprint of a plan, for logging and comparing dry runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PlanFingerprint(String);

impl PlanFingerprint {
    /// Compute a fingerprint from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
///
/// `serde_json` objects are ordered maps, so compact output is canonical.
pub fn canonical_json(value: &serde_json::Value) -> String {
    value.to_string()
}
