//! Vendor CLI output parsers.

mod cisco;
mod vrp;

use netsync_id::VlanId;
use thiserror::Error;

pub use cisco::parse_cisco_vlans;
pub use vrp::{parse_vrp_tagged_ports, parse_vrp_verbose, parse_vrp_vlans, VrpVlanDetail};

/// Parser errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty output from '{0}'")]
    EmptyOutput(&'static str),

    #[error("unrecognized output from '{command}': {line}")]
    UnrecognizedOutput { command: &'static str, line: String },
}

/// One row of a VLAN table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVlan {
    pub vid: VlanId,
    pub name: String,
    pub description: String,
    /// Raw status column (`active`, `act/unsup`, `enable`, ...).
    pub status: String,
    pub ports: Vec<String>,
}

impl ParsedVlan {
    /// Whether the device reports the VLAN as usable.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "active" | "enable"
        )
    }
}

/// Phrases a device prints when a looked-up VLAN does not exist.
const ABSENT_MARKERS: &[&str] = &[
    "not found in current vlan database",
    "does not exist",
    "vlan does not exist",
];

/// Whether a `show vlan id N` / `display vlan N` output says the VLAN is absent.
pub fn vlan_absent(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    ABSENT_MARKERS.iter().any(|marker| lower.contains(marker))
}
