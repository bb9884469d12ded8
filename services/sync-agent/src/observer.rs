//! Device VLAN observer.
//!
//! One observer serves every vendor: the [`VendorProfile`] picks the
//! commands, the parser and the naming policy.

use std::fmt;
use std::sync::Arc;

use netsync_id::DeviceName;
use netsync_reconcile::{
    derive_vlan_name, Attributes, CollectionError, DataQualityWarning, EntityRecord, Scope,
};
use tracing::{debug, instrument, warn};

use crate::inventory::models::Device;
use crate::parse::{parse_cisco_vlans, parse_vrp_verbose, parse_vrp_vlans, ParseError, ParsedVlan};
use crate::platform::{Dialect, Platform, VendorProfile};
use crate::transport::{Session, Transport};

/// A device eligible for observation.
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    pub name: String,
    /// Management address.
    pub host: String,
    pub profile: VendorProfile,
    pub site_id: Option<u64>,
}

impl DeviceTarget {
    /// Check an inventory device and build its target.
    ///
    /// Devices that are not active, have an unknown platform or lack a
    /// primary IP are ineligible.
    pub fn from_device(device: &Device) -> Result<Self, CollectionError> {
        let ineligible = CollectionError::Ineligible;

        let name = device
            .name
            .as_deref()
            .ok_or_else(|| ineligible(format!("{device} has no name")))?;
        let name = DeviceName::parse(name).map_err(|e| ineligible(e.to_string()))?;

        match device.status_value() {
            Some(status) if status.eq_ignore_ascii_case("active") => {}
            status => {
                return Err(ineligible(format!(
                    "status is {}",
                    status.unwrap_or("unset")
                )))
            }
        }

        let platform_name = device
            .platform_name()
            .ok_or_else(|| ineligible("no platform".to_string()))?;
        let platform = Platform::parse(platform_name)
            .ok_or_else(|| ineligible(format!("unsupported platform '{platform_name}'")))?;

        let host = device
            .primary_ip
            .as_ref()
            .map(|ip| ip.host().to_string())
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ineligible("no primary IP".to_string()))?;

        Ok(Self {
            name: name.into_inner(),
            host,
            profile: platform.profile(),
            site_id: device.site.as_ref().map(|s| s.id),
        })
    }

    /// The VLAN group this device's VLANs live in.
    pub fn scope(&self) -> Scope {
        Scope::vlan_group(self.name.as_str())
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Records observed on one target and the warnings raised producing them.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub records: Vec<EntityRecord>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Reads the active VLANs of a device.
#[derive(Clone)]
pub struct VlanObserver {
    transport: Arc<dyn Transport>,
}

impl VlanObserver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Collect the device's active VLANs.
    ///
    /// The session is closed whether or not reading succeeded.
    #[instrument(skip(self), fields(device = %target.name, platform = %target.profile.platform))]
    pub async fn collect(&self, target: &DeviceTarget) -> Result<Observation, CollectionError> {
        let mut session = self.transport.open(&target.host, &target.profile).await?;
        let observed = read_vlans(session.as_mut(), target).await;
        if let Err(err) = session.close().await {
            warn!(error = %err, "Failed to close session");
        }

        let observation = observed?;
        debug!(vlans = observation.records.len(), "Collected VLANs");
        Ok(observation)
    }
}

fn no_data(err: ParseError) -> CollectionError {
    CollectionError::NoData(err.to_string())
}

async fn read_vlans(
    session: &mut (dyn Session + '_),
    target: &DeviceTarget,
) -> Result<Observation, CollectionError> {
    let profile = &target.profile;
    let output = session.run(profile.list_command()).await?;
    let vlans = match profile.dialect {
        Dialect::Cisco => parse_cisco_vlans(&output),
        Dialect::Vrp => parse_vrp_vlans(&output),
    }
    .map_err(no_data)?;

    let scope = target.scope();
    let mut observation = Observation::default();

    for vlan in vlans.into_iter().filter(ParsedVlan::is_active) {
        let (name, description) = match profile.detail_command(vlan.vid) {
            Some(command) => {
                let detail = parse_vrp_verbose(&session.run(&command).await?).map_err(no_data)?;
                let description = if detail.description.is_empty() {
                    vlan.description
                } else {
                    detail.description
                };
                (detail.name, description)
            }
            None => (vlan.name, vlan.description),
        };

        let derived = derive_vlan_name(vlan.vid, &name, &description, profile.naming());
        if let Some(warning) = derived.warning {
            warn!(vid = %vlan.vid, warning = %warning, "VLAN name fallback");
            observation.warnings.push(warning);
        }

        let attributes = Attributes::new()
            .with("name", derived.name)
            .with("status", "active");
        observation
            .records
            .push(EntityRecord::new(vlan.vid, scope.clone(), attributes));
    }

    if observation.records.is_empty() {
        return Err(CollectionError::NoData(format!(
            "no active VLANs in '{}' output",
            profile.list_command()
        )));
    }
    Ok(observation)
}
