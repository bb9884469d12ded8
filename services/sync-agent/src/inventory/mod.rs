//! Inventory (NetBox) access: HTTP client, device listing and the VLAN and
//! VM gateways the reconciler writes through.

mod client;
mod devices;
mod error;
pub mod models;
mod vlans;
mod vms;

pub use client::NetBoxClient;
pub use devices::{find_device, list_tagged_devices};
pub use error::InventoryError;
pub use vlans::NetBoxVlanGateway;
pub use vms::{platform_slug, NetBoxVmGateway, CUSTOM_FIELD_PREFIX};

/// Slug for an object named `name`: lowercase ASCII letters, digits,
/// underscores and single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
