//! VLAN provisioning.
//!
//! Allocates one VLAN id that no listed device's VLAN group uses, pushes it
//! to every device and converges each device's VLAN group afterwards.
//!
//! The push creates the VLAN, then looks it up again to find the trunks
//! already carrying it (trunks allowing every VLAN). The VLAN is removed from
//! those not in the plan before it is allowed on the planned ones.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use netsync_id::VlanId;
use netsync_networking::{FreeVlanAllocator, InterfaceName, NetworkError, VlanRange};
use netsync_reconcile::{
    derive_vlan_name, AggregateReport, ApplyMode, Attributes, CollectionError, EntityRecord,
    FieldPolicies, GatewayError, Identity, InventoryGateway, Orchestrator, OrchestratorConfig,
    ReconciliationResult, Reconciler, Scope, UnitError,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::inventory::models::Device;
use crate::observer::{DeviceTarget, VlanObserver};
use crate::parse::{parse_cisco_vlans, parse_vrp_tagged_ports, vlan_absent, ParseError};
use crate::platform::Dialect;
use crate::transport::{run_checked, Session, Transport};

/// Longest VLAN name every supported vendor accepts.
pub const MAX_VLAN_NAME_LEN: usize = 31;

/// Provisioning errors. All of them are fatal to the run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cannot read plan {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed plan: {0}")]
    Malformed(#[from] toml::de::Error),

    #[error("invalid plan: {0}")]
    Invalid(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("cannot read VLANs of group '{group}': {source}")]
    Inventory { group: String, source: GatewayError },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    name: String,
    #[serde(default)]
    range: Option<String>,
    devices: BTreeMap<String, Vec<String>>,
}

/// A validated provisioning plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    /// VLAN name configured on the devices.
    pub name: String,
    pub range: VlanRange,
    /// Device name → trunk interfaces that must carry the VLAN.
    pub devices: BTreeMap<String, Vec<InterfaceName>>,
}

impl ProvisionPlan {
    /// Parse and validate a TOML plan.
    pub fn from_toml(raw: &str) -> Result<Self, ProvisionError> {
        let file: PlanFile = toml::from_str(raw)?;

        let name = validate_vlan_name(&file.name)?;
        let range = match file.range.as_deref() {
            Some(range) => range.parse()?,
            None => VlanRange::default(),
        };
        if file.devices.is_empty() {
            return Err(ProvisionError::Invalid("no devices listed".to_string()));
        }

        let mut devices = BTreeMap::new();
        for (device, interfaces) in file.devices {
            if interfaces.is_empty() {
                return Err(ProvisionError::Invalid(format!(
                    "device '{device}' lists no interfaces"
                )));
            }
            let interfaces = interfaces
                .iter()
                .map(|i| InterfaceName::parse(i))
                .collect::<Result<Vec<_>, _>>()?;
            devices.insert(device, interfaces);
        }

        Ok(Self {
            name,
            range,
            devices,
        })
    }

    /// Read a plan file.
    pub async fn load(path: &Path) -> Result<Self, ProvisionError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ProvisionError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&raw)
    }
}

/// Check a VLAN name can be placed on a device command line.
pub fn validate_vlan_name(name: &str) -> Result<String, ProvisionError> {
    let name = name.trim();
    let invalid = |reason: &str| ProvisionError::Invalid(format!("VLAN name '{name}' {reason}"));

    if name.is_empty() {
        return Err(invalid("is empty"));
    }
    if name.chars().count() > MAX_VLAN_NAME_LEN {
        return Err(invalid(&format!("exceeds {MAX_VLAN_NAME_LEN} characters")));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("may only contain letters, digits, '-', '_' and '.'"));
    }
    Ok(name.to_string())
}

/// Lowest id in `range` that none of the VLAN groups `groups` uses.
///
/// Groups that do not exist yet use nothing.
#[instrument(skip(gateway))]
pub async fn allocate_vlan<G>(
    gateway: &G,
    groups: &[String],
    range: VlanRange,
) -> Result<VlanId, ProvisionError>
where
    G: InventoryGateway + ?Sized,
{
    let mut allocator = FreeVlanAllocator::new(range);
    for group in groups {
        let scope = Scope::vlan_group(group.as_str());
        let failed = |source| ProvisionError::Inventory {
            group: group.clone(),
            source,
        };
        if !gateway.scope_exists(&scope).await.map_err(failed)? {
            warn!(group = %group, "VLAN group does not exist, nothing to exclude");
            continue;
        }
        let current = gateway.fetch_scoped(&scope).await.map_err(failed)?;
        allocator.exclude(current.into_iter().filter_map(|r| match r.identity {
            Identity::Vlan(vid) => Some(vid),
            Identity::Name(_) => None,
        }));
    }

    let vid = allocator.allocate()?;
    info!(vid = %vid, remaining = allocator.remaining(), "Allocated VLAN");
    Ok(vid)
}

struct Keywords {
    enter: &'static str,
    leave: &'static str,
    end: &'static str,
    allow: &'static str,
    disallow: &'static str,
}

fn keywords(dialect: Dialect) -> Keywords {
    match dialect {
        Dialect::Cisco => Keywords {
            enter: "configure terminal",
            leave: "exit",
            end: "end",
            allow: "switchport trunk allowed vlan add",
            disallow: "switchport trunk allowed vlan remove",
        },
        Dialect::Vrp => Keywords {
            enter: "system-view",
            leave: "quit",
            end: "return",
            allow: "port trunk allow-pass vlan",
            disallow: "undo port trunk allow-pass vlan",
        },
    }
}

/// Device commands creating VLAN `vid` named `name`.
pub fn creation_commands(dialect: Dialect, vid: VlanId, name: &str) -> Vec<String> {
    let k = keywords(dialect);
    vec![
        k.enter.to_string(),
        format!("vlan {vid}"),
        format!("name {name}"),
        k.leave.to_string(),
        k.end.to_string(),
    ]
}

/// Device commands removing `vid` from `remove` and allowing it on `allow`.
pub fn trunk_commands(
    dialect: Dialect,
    vid: VlanId,
    remove: &[InterfaceName],
    allow: &[InterfaceName],
) -> Vec<String> {
    let k = keywords(dialect);
    let mut commands = vec![k.enter.to_string()];
    let edits = remove
        .iter()
        .map(|i| (i, k.disallow))
        .chain(allow.iter().map(|i| (i, k.allow)));
    for (interface, keyword) in edits {
        commands.push(format!("interface {interface}"));
        commands.push(format!("{keyword} {vid}"));
        commands.push(k.leave.to_string());
    }
    commands.push(k.end.to_string());
    commands
}

/// Interfaces a VLAN lookup lists as carrying `vid`.
///
/// VRP lists tagged ports only. Port names that are not valid interface
/// names are skipped.
pub fn carrying_interfaces(
    dialect: Dialect,
    vid: VlanId,
    lookup: &str,
) -> Result<Vec<InterfaceName>, ParseError> {
    let ports = match dialect {
        Dialect::Cisco => parse_cisco_vlans(lookup)?
            .into_iter()
            .find(|v| v.vid == vid)
            .map(|v| v.ports)
            .unwrap_or_default(),
        Dialect::Vrp => parse_vrp_tagged_ports(lookup)?
            .into_iter()
            .find(|(v, _)| *v == vid)
            .map(|(_, ports)| ports)
            .unwrap_or_default(),
    };
    Ok(ports
        .iter()
        .filter_map(|port| match InterfaceName::parse(port) {
            Ok(name) => Some(name),
            Err(err) => {
                warn!(port = %port, error = %err, "Skipping unrecognized port");
                None
            }
        })
        .collect())
}

/// One device to provision.
#[derive(Debug, Clone)]
pub struct ProvisionTarget {
    pub device: Device,
    pub interfaces: Vec<InterfaceName>,
}

impl fmt::Display for ProvisionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.device, f)
    }
}

/// The VLAN being provisioned.
#[derive(Debug, Clone)]
pub struct VlanSpec {
    pub vid: VlanId,
    pub name: String,
}

/// Push `vlan` to every target and converge their VLAN groups.
pub async fn provision_vlan<G, F>(
    targets: Vec<ProvisionTarget>,
    vlan: VlanSpec,
    transport: Arc<dyn Transport>,
    gateway_for: F,
    config: OrchestratorConfig,
    mode: ApplyMode,
) -> AggregateReport
where
    G: InventoryGateway + ?Sized + 'static,
    F: Fn(&DeviceTarget) -> Arc<G> + Send + Sync + 'static,
{
    info!(vid = %vlan.vid, name = %vlan.name, devices = targets.len(), mode = ?mode, "Provisioning VLAN");
    let reconciler = Reconciler::new(FieldPolicies::vlan()).with_mode(mode);
    let observer = VlanObserver::new(Arc::clone(&transport));
    let gateway_for = Arc::new(gateway_for);
    let vlan = Arc::new(vlan);

    Orchestrator::new(config)
        .run(targets, move |target| {
            let transport = Arc::clone(&transport);
            let observer = observer.clone();
            let reconciler = reconciler.clone();
            let gateway_for = Arc::clone(&gateway_for);
            let vlan = Arc::clone(&vlan);
            async move {
                let device = DeviceTarget::from_device(&target.device)?;
                let gateway = gateway_for(&device);
                provision_device(
                    transport.as_ref(),
                    &observer,
                    gateway.as_ref(),
                    &reconciler,
                    &device,
                    &vlan,
                    &target.interfaces,
                )
                .await
            }
        })
        .await
}

#[instrument(skip_all, fields(device = %target.name, vid = %vlan.vid))]
async fn provision_device<G>(
    transport: &dyn Transport,
    observer: &VlanObserver,
    gateway: &G,
    reconciler: &Reconciler,
    target: &DeviceTarget,
    vlan: &VlanSpec,
    interfaces: &[InterfaceName],
) -> Result<ReconciliationResult, UnitError>
where
    G: InventoryGateway + ?Sized,
{
    let mode = reconciler.mode();
    let mut session = transport
        .open(&target.host, &target.profile)
        .await
        .map_err(CollectionError::from)?;
    let pushed = push_vlan(session.as_mut(), target, vlan, interfaces, mode).await;
    if let Err(err) = session.close().await {
        warn!(error = %err, "Failed to close session");
    }
    pushed?;

    let mut observation = observer.collect(target).await?;
    if mode == ApplyMode::DryRun {
        // Nothing was pushed; plan as if it had been.
        let planned = Identity::Vlan(vlan.vid);
        if !observation.records.iter().any(|r| r.identity == planned) {
            let derived = derive_vlan_name(vlan.vid, &vlan.name, "", target.profile.naming());
            observation.records.push(EntityRecord::new(
                vlan.vid,
                target.scope(),
                Attributes::new()
                    .with("name", derived.name)
                    .with("status", "active"),
            ));
        }
    }

    let mut result = reconciler
        .reconcile(gateway, &target.scope(), observation.records)
        .await?;
    result.warnings.extend(observation.warnings);
    Ok(result)
}

async fn push_vlan(
    session: &mut (dyn Session + '_),
    target: &DeviceTarget,
    vlan: &VlanSpec,
    interfaces: &[InterfaceName],
    mode: ApplyMode,
) -> Result<(), UnitError> {
    let dialect = target.profile.dialect;
    let lookup_command = target.profile.lookup_command(vlan.vid);
    let lookup = session
        .run(&lookup_command)
        .await
        .map_err(CollectionError::from)?;
    if !vlan_absent(&lookup) {
        return Err(UnitError::Other(format!(
            "VLAN {} already exists on {}",
            vlan.vid, target.name
        )));
    }

    let create = creation_commands(dialect, vlan.vid, &vlan.name);
    if mode == ApplyMode::DryRun {
        let allow = trunk_commands(dialect, vlan.vid, &[], interfaces);
        info!(create = ?create, trunks = ?allow, "Dry run, not pushing");
        return Ok(());
    }

    let failed = |e: &dyn fmt::Display| UnitError::Other(format!("push to {} failed: {e}", target.name));
    for command in &create {
        run_checked(session, command).await.map_err(|e| failed(&e))?;
    }

    let created = session
        .run(&lookup_command)
        .await
        .map_err(CollectionError::from)?;
    let stale: Vec<InterfaceName> = carrying_interfaces(dialect, vlan.vid, &created)
        .map_err(|e| failed(&e))?
        .into_iter()
        .filter(|i| !interfaces.iter().any(|planned| planned.as_str().eq_ignore_ascii_case(i.as_str())))
        .collect();
    if !stale.is_empty() {
        info!(interfaces = ?stale, "Removing VLAN from trunks outside the plan");
    }

    for command in &trunk_commands(dialect, vlan.vid, &stale, interfaces) {
        run_checked(session, command).await.map_err(|e| failed(&e))?;
    }
    info!(interfaces = interfaces.len(), removed = stale.len(), "Pushed VLAN");
    Ok(())
}
