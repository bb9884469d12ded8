//! Error display for the CLI.

use colored::Colorize;
use netsync_networking::NetworkError;

use crate::inventory::InventoryError;
use crate::provision::ProvisionError;
use crate::vm::{SnapshotError, VcenterError};

/// Hint for the first error in the chain we know something about.
pub fn hint(err: &anyhow::Error) -> Option<&'static str> {
    err.chain().find_map(|cause| {
        if let Some(err) = cause.downcast_ref::<InventoryError>() {
            return match err {
                InventoryError::Unauthorized(_) => {
                    Some("Check NETSYNC_INVENTORY_TOKEN and its write permissions.")
                }
                InventoryError::Network(_) => {
                    Some("Check NETSYNC_INVENTORY_URL and your network connection.")
                }
                InventoryError::NotFound(_) => {
                    Some("Make sure the device exists in the inventory under that exact name.")
                }
                _ => None,
            };
        }
        if let Some(err) = cause.downcast_ref::<VcenterError>() {
            return match err {
                VcenterError::Authentication(_) => {
                    Some("Check NETSYNC_VCENTER_USER and NETSYNC_VCENTER_PASSWORD.")
                }
                VcenterError::Network(_) => Some(
                    "Check NETSYNC_VCENTER_URL; set NETSYNC_VCENTER_INSECURE=true for self-signed certificates.",
                ),
                _ => None,
            };
        }
        if let Some(err) = cause.downcast_ref::<SnapshotError>() {
            return match err {
                SnapshotError::Read { .. } => Some("Run `netsync vms collect` first."),
                SnapshotError::DigestMismatch { .. } | SnapshotError::Malformed { .. } => {
                    Some("The snapshot was modified or truncated; run `netsync vms collect` again.")
                }
                _ => None,
            };
        }
        if let Some(ProvisionError::Network(NetworkError::PoolExhausted(_))) =
            cause.downcast_ref::<ProvisionError>()
        {
            return Some("Pick a wider range in the plan's `range` field.");
        }
        None
    })
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);
    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::path::PathBuf;

    #[test]
    fn test_hint_through_context() {
        let err = Err::<(), _>(SnapshotError::Read {
            path: PathBuf::from("output.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
        .context("failed to load snapshot")
        .unwrap_err();
        assert_eq!(hint(&err), Some("Run `netsync vms collect` first."));
    }

    #[test]
    fn test_unauthorized_inventory() {
        let err = anyhow::Error::new(InventoryError::Unauthorized(403));
        assert!(hint(&err).unwrap().contains("NETSYNC_INVENTORY_TOKEN"));
    }

    #[test]
    fn test_no_hint_for_unknown_errors() {
        assert_eq!(hint(&anyhow::anyhow!("boom")), None);
    }
}
