//! Per-field comparison policies.
//!
//! Only fields present in the observed record are compared. A field missing
//! from the inventory record compares as `null`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::record::Attributes;

/// How two values of one field are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparePolicy {
    /// JSON equality.
    #[default]
    Exact,

    /// Strings compared after trimming and collapsing internal whitespace.
    Trimmed,

    /// Trimmed and lower-cased.
    CaseInsensitive,

    /// All whitespace removed.
    IgnoreWhitespace,

    /// Numbers and numeric strings compared as numbers.
    Numeric,
}

impl ComparePolicy {
    /// Check whether an observed value matches the inventory value.
    pub fn equivalent(&self, observed: &Value, current: &Value) -> bool {
        match self {
            Self::Exact => observed == current,
            Self::Trimmed => str_eq(observed, current, collapse),
            Self::CaseInsensitive => str_eq(observed, current, |s| collapse(s).to_lowercase()),
            Self::IgnoreWhitespace => str_eq(observed, current, |s| {
                s.chars().filter(|c| !c.is_whitespace()).collect()
            }),
            Self::Numeric => match (as_number(observed), as_number(current)) {
                (Some(a), Some(b)) => (a - b).abs() < 1e-9,
                _ => observed == current,
            },
        }
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Blank strings and `null` are the same under string policies.
fn str_eq(a: &Value, b: &Value, normalize: impl Fn(&str) -> String) -> bool {
    let text = |v: &Value| match v {
        Value::String(s) => Some(normalize(s)),
        Value::Null => Some(String::new()),
        _ => None,
    };
    match (text(a), text(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Field → policy table; unlisted fields use [`ComparePolicy::Exact`].
#[derive(Debug, Clone, Default)]
pub struct FieldPolicies(BTreeMap<String, ComparePolicy>);

impl FieldPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style policy assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, policy: ComparePolicy) -> Self {
        self.0.insert(field.into(), policy);
        self
    }

    /// Policies for VLAN records.
    pub fn vlan() -> Self {
        Self::new()
            .with("name", ComparePolicy::Trimmed)
            .with("status", ComparePolicy::CaseInsensitive)
    }

    /// Policies for virtual machine records.
    pub fn vm() -> Self {
        let mut policies = Self::new()
            .with("status", ComparePolicy::CaseInsensitive)
            .with("platform", ComparePolicy::IgnoreWhitespace)
            .with("tenant", ComparePolicy::Trimmed)
            .with("vcpus", ComparePolicy::Numeric)
            .with("memory", ComparePolicy::Numeric)
            .with("disk", ComparePolicy::Numeric)
            .with("custom_fields.HOST", ComparePolicy::Trimmed);
        for class in ["SAS", "SSD", "SATA", "Unknown"] {
            policies = policies.with(format!("custom_fields.{class}"), ComparePolicy::Numeric);
        }
        policies
    }

    pub fn policy_for(&self, field: &str) -> ComparePolicy {
        self.0.get(field).copied().unwrap_or_default()
    }

    /// Observed fields whose value differs from the inventory's.
    ///
    /// The result carries the observed values and is empty when the record
    /// is unchanged.
    pub fn diff(&self, observed: &Attributes, current: &Attributes) -> Attributes {
        observed
            .iter()
            .filter(|(field, value)| {
                let current = current.get(field).unwrap_or(&Value::Null);
                !self.policy_for(field).equivalent(value, current)
            })
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(ComparePolicy::Exact, json!("a"), json!("a"), true)]
    #[case(ComparePolicy::Exact, json!("a "), json!("a"), false)]
    #[case(ComparePolicy::Trimmed, json!(" Guest  LAN "), json!("Guest LAN"), true)]
    #[case(ComparePolicy::Trimmed, json!("Mgmt"), json!("Management"), false)]
    #[case(ComparePolicy::Trimmed, json!(""), json!(null), true)]
    #[case(ComparePolicy::CaseInsensitive, json!("Active"), json!("active"), true)]
    #[case(ComparePolicy::IgnoreWhitespace, json!("Windows Server 2019"), json!("WindowsServer2019"), true)]
    #[case(ComparePolicy::Numeric, json!(2), json!(2.0), true)]
    #[case(ComparePolicy::Numeric, json!("4096"), json!(4096), true)]
    #[case(ComparePolicy::Numeric, json!(2), json!(3), false)]
    #[case(ComparePolicy::Numeric, json!(0), json!(null), false)]
    fn test_policy_equivalence(
        #[case] policy: ComparePolicy,
        #[case] observed: Value,
        #[case] current: Value,
        #[case] expected: bool,
    ) {
        assert_eq!(policy.equivalent(&observed, &current), expected);
    }

    #[test]
    fn test_diff_only_observed_fields() {
        let policies = FieldPolicies::vlan();
        let observed = Attributes::new().with("name", "Mgmt").with("status", "active");
        let current = Attributes::new()
            .with("name", "Management")
            .with("status", "Active")
            .with("description", "not managed");

        let diff = policies.diff(&observed, &current);
        assert_eq!(diff, Attributes::new().with("name", "Mgmt"));
    }

    #[test]
    fn test_diff_missing_current_field_is_null() {
        let policies = FieldPolicies::vm();
        let observed = Attributes::new().with("vcpus", 4);
        let diff = policies.diff(&observed, &Attributes::new());
        assert_eq!(diff.get("vcpus"), Some(&json!(4)));
    }

    #[test]
    fn test_vm_policies_cover_custom_fields() {
        let policies = FieldPolicies::vm();
        assert_eq!(policies.policy_for("custom_fields.SSD"), ComparePolicy::Numeric);
        assert_eq!(policies.policy_for("custom_fields.Snapshot"), ComparePolicy::Exact);
    }
}
