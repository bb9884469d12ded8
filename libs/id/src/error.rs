//! Error types for identity parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input is empty (or only whitespace).
    #[error("identity cannot be empty")]
    Empty,

    /// The ID has an invalid prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// The VLAN id is not a number.
    #[error("invalid VLAN id: '{0}'")]
    InvalidVlanId(String),

    /// The VLAN id is outside the usable 802.1Q range.
    #[error("VLAN id {0} out of range (1-4094)")]
    VlanOutOfRange(u32),

    /// The name exceeds the inventory's length limit.
    #[error("{kind} '{value}' exceeds {max} characters")]
    TooLong {
        kind: &'static str,
        value: String,
        max: usize,
    },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error concerns a VLAN id.
    pub fn is_vlan_error(&self) -> bool {
        matches!(self, IdError::InvalidVlanId(_) | IdError::VlanOutOfRange(_))
    }
}
