//! # netsync-id
//!
//! Identity types, parsing, and validation for netsync.
//!
//! ## Design Principles
//!
//! - Identities are the keys used to match an observed entity against an
//!   inventory entity; they must parse strictly and format canonically
//! - Names carry the inventory's length limit in their type
//! - Run IDs are ULID-based so reports sort by start time
//!
//! ## Identity Kinds
//!
//! - [`VlanId`]: 802.1Q VLAN id, `1..=4094`
//! - [`VmName`], [`TenantName`], [`DeviceName`]: bounded display names, with
//!   char-boundary-safe truncation for sources that exceed the limit
//! - [`RunId`]: `run_{ulid}`, one per tool invocation

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
