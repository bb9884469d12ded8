//! Typed identity definitions.
//!
//! VLANs are identified by their numeric 802.1Q id; virtual machines by their
//! configured name cut to the inventory's name-length limit.

use crate::{define_id, define_name, IdError};

// =============================================================================
// Runs
// =============================================================================

define_id!(RunId, "run");

// =============================================================================
// Names
// =============================================================================

define_name!(VmName, 64, "VM name");
define_name!(TenantName, 30, "tenant name");
define_name!(DeviceName, 64, "device name");

// =============================================================================
// VLAN id
// =============================================================================

/// An 802.1Q VLAN id in the usable range `1..=4094`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VlanId(u16);

impl VlanId {
    /// Lowest usable VLAN id.
    pub const MIN: u16 = 1;

    /// Highest usable VLAN id (4095 is reserved).
    pub const MAX: u16 = 4094;

    /// Creates a VLAN id, validating the range.
    pub fn new(id: u32) -> Result<Self, IdError> {
        if (u32::from(Self::MIN)..=u32::from(Self::MAX)).contains(&id) {
            Ok(Self(id as u16))
        } else {
            Err(IdError::VlanOutOfRange(id))
        }
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Parses a VLAN id from device or inventory text (surrounding
    /// whitespace is ignored).
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }
        let id: u32 = trimmed
            .parse()
            .map_err(|_| IdError::InvalidVlanId(trimmed.to_string()))?;
        Self::new(id)
    }
}

impl std::fmt::Display for VlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VlanId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<u32> for VlanId {
    type Error = IdError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(id: VlanId) -> Self {
        id.0
    }
}

impl serde::Serialize for VlanId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u16(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for VlanId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = u32::deserialize(deserializer)?;
        Self::new(id).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
