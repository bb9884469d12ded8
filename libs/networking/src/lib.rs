//! Networking utilities for VLAN management.
//!
//! This library provides helpers for:
//! - VLAN id ranges (`"600-1699"`)
//! - Finding a VLAN id that is free across several VLAN groups
//! - Validating switch interface names before they are spliced into
//!   device commands

use std::collections::BTreeSet;
use std::str::FromStr;

use netsync_id::VlanId;
use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid VLAN range expression.
    #[error("invalid VLAN range: {0}")]
    InvalidRange(String),

    /// Every id in the range is already used.
    #[error("VLAN pool exhausted: no free id in {0}")]
    PoolExhausted(VlanRange),

    /// Invalid interface name.
    #[error("invalid interface name: '{0}'")]
    InvalidInterface(String),
}

// ============================================================================
// VLAN ranges
// ============================================================================

/// Inclusive VLAN id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanRange {
    /// First id in the range.
    pub start: VlanId,

    /// Last id in the range (inclusive).
    pub end: VlanId,
}

/// Range scanned by provisioning when none is given.
pub const DEFAULT_PROVISIONING_RANGE: (u16, u16) = (600, 1699);

impl VlanRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: VlanId, end: VlanId) -> Result<Self, NetworkError> {
        if start > end {
            return Err(NetworkError::InvalidRange(format!("{start}-{end}")));
        }
        Ok(Self { start, end })
    }

    /// Number of ids in the range.
    pub fn len(&self) -> usize {
        usize::from(self.end.value() - self.start.value()) + 1
    }

    /// Ranges are never empty; provided for clippy symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check whether an id lies in the range.
    pub fn contains(&self, id: VlanId) -> bool {
        self.start <= id && id <= self.end
    }

    /// Iterate ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = VlanId> {
        (self.start.value()..=self.end.value())
            .filter_map(|v| VlanId::new(u32::from(v)).ok())
    }
}

impl Default for VlanRange {
    fn default() -> Self {
        let (start, end) = DEFAULT_PROVISIONING_RANGE;
        Self {
            start: VlanId::new(u32::from(start)).expect("default range start is a valid VLAN id"),
            end: VlanId::new(u32::from(end)).expect("default range end is a valid VLAN id"),
        }
    }
}

impl std::fmt::Display for VlanRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for VlanRange {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NetworkError::InvalidRange(s.to_string());
        let (start, end) = match s.trim().split_once('-') {
            Some((a, b)) => (a, b),
            None => (s.trim(), s.trim()),
        };
        let start = VlanId::parse(start).map_err(|_| invalid())?;
        let end = VlanId::parse(end).map_err(|_| invalid())?;
        Self::new(start, end)
    }
}

// ============================================================================
// Free VLAN allocation
// ============================================================================

/// Finds VLAN ids unused across a set of VLAN groups.
///
/// Every group's used ids are merged into one exclusion set; allocation
/// returns the lowest id in the range that no group uses.
#[derive(Debug)]
pub struct FreeVlanAllocator {
    /// Range to allocate from.
    range: VlanRange,

    /// Ids used by any group (or already handed out).
    used: BTreeSet<VlanId>,
}

impl FreeVlanAllocator {
    /// Create a new allocator for a range.
    pub fn new(range: VlanRange) -> Self {
        Self {
            range,
            used: BTreeSet::new(),
        }
    }

    /// Mark the ids used by one group.
    pub fn exclude<I>(&mut self, used: I) -> &mut Self
    where
        I: IntoIterator<Item = VlanId>,
    {
        self.used.extend(used);
        self
    }

    /// Allocate the lowest free id.
    ///
    /// The id is reserved, so repeated calls return distinct ids.
    pub fn allocate(&mut self) -> Result<VlanId, NetworkError> {
        let free = self
            .range
            .iter()
            .find(|id| !self.used.contains(id))
            .ok_or(NetworkError::PoolExhausted(self.range))?;
        self.used.insert(free);
        Ok(free)
    }

    /// Get the range being allocated from.
    pub fn range(&self) -> &VlanRange {
        &self.range
    }

    /// Get the number of ids still free in the range.
    pub fn remaining(&self) -> usize {
        self.range.iter().filter(|id| !self.used.contains(id)).count()
    }
}

// ============================================================================
// Interface names
// ============================================================================

/// A validated switch interface name (`Gi1/0/1`, `Port-channel10`,
/// `Eth-Trunk1`, `XGE0/0/1.100`).
///
/// Names are restricted to a type prefix of letters and dashes followed by
/// a slot/port path of digits and `/ . :` separators, so they can be placed
/// on a device command line safely.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Parse and validate an interface name.
    pub fn parse(s: &str) -> Result<Self, NetworkError> {
        let name = s.trim();
        let invalid = || NetworkError::InvalidInterface(s.to_string());

        let split = name.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?;
        let (kind, path) = name.split_at(split);

        let kind_ok = !kind.is_empty()
            && kind.starts_with(|c: char| c.is_ascii_alphabetic())
            && kind.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
        let path_ok = path.ends_with(|c: char| c.is_ascii_digit())
            && path
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '/' | '.' | ':'));

        if kind_ok && path_ok {
            Ok(Self(name.to_string()))
        } else {
            Err(invalid())
        }
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InterfaceName {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
