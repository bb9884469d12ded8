//! Error and warning taxonomy.
//!
//! Collection and gateway errors are isolated to one target; write errors
//! are isolated to one identity. Data-quality warnings never fail anything.

use serde::Serialize;
use thiserror::Error;

use crate::record::{Identity, Scope};

/// Failure to observe a target's entities.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectionError {
    /// The target could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The target rejected our credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Connect or command timed out.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The target is not eligible for observation.
    #[error("ineligible: {0}")]
    Ineligible(String),

    /// The target answered but produced nothing usable.
    #[error("no data: {0}")]
    NoData(String),
}

/// Kind of inventory write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    Create,
    Update,
    Delete,
    Detach,
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Detach => "detach",
        })
    }
}

/// A single inventory write that failed.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{op} {identity} failed: {cause}")]
pub struct WriteError {
    pub identity: Identity,
    pub op: WriteOp,
    pub cause: String,
}

impl WriteError {
    pub fn new(identity: Identity, op: WriteOp, cause: impl std::fmt::Display) -> Self {
        Self {
            identity,
            op,
            cause: cause.to_string(),
        }
    }
}

/// Failure to read or prepare an inventory scope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The scope does not exist and could not be created.
    #[error("scope {scope} missing: {reason}")]
    ScopeMissing { scope: Scope, reason: String },

    /// Fetching current entries failed.
    #[error("fetch of {scope} failed: {reason}")]
    Fetch { scope: Scope, reason: String },

    /// The inventory returned something we could not interpret.
    #[error("invalid inventory data: {0}")]
    InvalidData(String),
}

/// Why one orchestrated unit failed.
#[derive(Debug, Clone, Error)]
pub enum UnitError {
    #[error("collection failed: {0}")]
    Collection(#[from] CollectionError),

    #[error("inventory failed: {0}")]
    Inventory(#[from] GatewayError),

    /// Every planned write failed.
    #[error("all {0} planned writes failed")]
    WritesFailed(usize),

    #[error("unit panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl UnitError {
    /// Short machine-readable kind for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Collection(_) => "collection",
            Self::Inventory(_) => "inventory",
            Self::WritesFailed(_) => "writes_failed",
            Self::Panicked(_) => "panicked",
            Self::Other(_) => "other",
        }
    }
}

/// Non-fatal data-quality observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// The same identity appeared more than once; the last occurrence was kept.
    DuplicateIdentity { identity: Identity, occurrences: usize },

    /// Different raw names were truncated onto one identity.
    TruncationCollision {
        identity: Identity,
        source_names: Vec<String>,
    },

    /// No usable name could be derived; a fallback was used.
    AmbiguousName { identity: Identity, fallback: String },

    /// A record carried a scope other than the one being reconciled.
    ScopeMismatch { identity: Identity, scope: Scope },
}

impl DataQualityWarning {
    /// The identity the warning is about.
    pub fn identity(&self) -> &Identity {
        match self {
            Self::DuplicateIdentity { identity, .. }
            | Self::TruncationCollision { identity, .. }
            | Self::AmbiguousName { identity, .. }
            | Self::ScopeMismatch { identity, .. } => identity,
        }
    }
}

impl std::fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateIdentity {
                identity,
                occurrences,
            } => write!(f, "{identity} seen {occurrences} times, kept last"),
            Self::TruncationCollision {
                identity,
                source_names,
            } => write!(
                f,
                "{identity} is the truncation of {} names: {}",
                source_names.len(),
                source_names.join(", ")
            ),
            Self::AmbiguousName { identity, fallback } => {
                write!(f, "{identity} has no name or description, using '{fallback}'")
            }
            Self::ScopeMismatch { identity, scope } => {
                write!(f, "{identity} belongs to {scope}, ignored")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsync_id::VlanId;

    #[test]
    fn test_write_error_display() {
        let err = WriteError::new(
            Identity::Vlan(VlanId::new(300).unwrap()),
            WriteOp::Delete,
            "HTTP 409",
        );
        assert_eq!(err.to_string(), "delete vlan 300 failed: HTTP 409");
    }

    #[test]
    fn test_unit_error_from_collection() {
        let err: UnitError = CollectionError::Timeout("10.0.0.1:22".into()).into();
        assert_eq!(err.kind(), "collection");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_warning_json_is_tagged() {
        let warning = DataQualityWarning::DuplicateIdentity {
            identity: Identity::Name("web".into()),
            occurrences: 2,
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "duplicate_identity");
        assert_eq!(json["occurrences"], 2);
    }
}
