//! Device enumeration.

use tracing::{info, warn};

use super::client::NetBoxClient;
use super::error::InventoryError;
use super::models::Device;

const DEVICES: &str = "/api/dcim/devices/";

/// Devices carrying `tag`, narrowed to `names` when any are given.
pub async fn list_tagged_devices(
    client: &NetBoxClient,
    tag: &str,
    names: &[String],
) -> Result<Vec<Device>, InventoryError> {
    let devices: Vec<Device> = client.list(DEVICES, &[("tag", tag.to_string())]).await?;
    let total = devices.len();

    let devices: Vec<Device> = if names.is_empty() {
        devices
    } else {
        let selected: Vec<Device> = devices
            .into_iter()
            .filter(|d| d.name.as_ref().is_some_and(|n| names.contains(n)))
            .collect();
        for name in names {
            if !selected.iter().any(|d| d.name.as_deref() == Some(name.as_str())) {
                warn!(device = %name, tag = %tag, "Requested device is not tagged for sync");
            }
        }
        selected
    };

    info!(tag = %tag, tagged = total, selected = devices.len(), "Listed devices");
    Ok(devices)
}

/// Look up one device by name.
pub async fn find_device(client: &NetBoxClient, name: &str) -> Result<Device, InventoryError> {
    client
        .find(DEVICES, &[("name", name.to_string())])
        .await?
        .ok_or_else(|| InventoryError::NotFound(format!("device '{name}'")))
}
