//! VLAN commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use netsync_networking::VlanRange;
use serde::Serialize;

use super::CommandContext;
use crate::inventory::{find_device, list_tagged_devices, NetBoxVlanGateway};
use crate::observer::VlanObserver;
use crate::output::{print_info, print_report, print_single, print_success, OutputFormat};
use crate::provision::{allocate_vlan, provision_vlan, ProvisionPlan, ProvisionTarget, VlanSpec};
use crate::sync::sync_vlans;
use crate::transport::DeviceTransport;

/// VLAN commands.
#[derive(Debug, Args)]
pub struct VlansCommand {
    #[command(subcommand)]
    command: VlansSubcommand,
}

#[derive(Debug, Subcommand)]
enum VlansSubcommand {
    /// Read VLANs from the tagged switches and converge their VLAN groups.
    Sync(SyncArgs),

    /// Find a VLAN id free in every given VLAN group.
    Allocate(AllocateArgs),

    /// Create a VLAN on several switches and record it in the inventory.
    Provision(ProvisionArgs),
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Only sync these devices (must still carry the sync tag).
    #[arg(long = "device", value_name = "NAME")]
    devices: Vec<String>,
}

#[derive(Debug, Args)]
struct AllocateArgs {
    /// VLAN group (device name) the id must be free in.
    #[arg(long = "group", value_name = "NAME", required = true)]
    groups: Vec<String>,

    /// Range to allocate from.
    #[arg(long, default_value_t = VlanRange::default())]
    range: VlanRange,
}

#[derive(Debug, Args)]
struct ProvisionArgs {
    /// Provisioning plan (TOML).
    #[arg(long)]
    plan: PathBuf,
}

#[derive(Debug, Serialize)]
struct Allocation {
    vid: u16,
    groups: Vec<String>,
}

impl VlansCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            VlansSubcommand::Sync(args) => sync(ctx, args).await,
            VlansSubcommand::Allocate(args) => allocate(ctx, args).await,
            VlansSubcommand::Provision(args) => provision(ctx, args).await,
        }
    }
}

async fn sync(ctx: CommandContext, args: SyncArgs) -> Result<()> {
    let client = ctx.client()?;
    let devices = list_tagged_devices(&client, &ctx.config.device_tag, &args.devices)
        .await
        .context("failed to list devices")?;

    let observer = VlanObserver::new(Arc::new(DeviceTransport::new(&ctx.config.transport)));
    let report = sync_vlans(
        devices,
        observer,
        move |target| Arc::new(NetBoxVlanGateway::new(client.clone(), target.site_id)),
        ctx.orchestrator(),
        ctx.mode,
    )
    .await;

    print_report(&report, ctx.format);
    Ok(())
}

async fn allocate(ctx: CommandContext, args: AllocateArgs) -> Result<()> {
    let gateway = NetBoxVlanGateway::new(ctx.client()?, None);
    let vid = allocate_vlan(&gateway, &args.groups, args.range).await?;

    match ctx.format {
        OutputFormat::Json => print_single(&Allocation {
            vid: vid.value(),
            groups: args.groups,
        }),
        OutputFormat::Table => print_success(&format!(
            "VLAN {} is free in {}",
            vid,
            args.groups.join(", ")
        )),
    }
    Ok(())
}

async fn provision(ctx: CommandContext, args: ProvisionArgs) -> Result<()> {
    let plan = ProvisionPlan::load(&args.plan).await?;
    let client = ctx.client()?;

    let mut targets = Vec::with_capacity(plan.devices.len());
    for (name, interfaces) in &plan.devices {
        let device = find_device(&client, name)
            .await
            .with_context(|| format!("failed to look up device '{name}'"))?;
        targets.push(ProvisionTarget {
            device,
            interfaces: interfaces.clone(),
        });
    }

    let groups: Vec<String> = plan.devices.keys().cloned().collect();
    let allocator = NetBoxVlanGateway::new(client.clone(), None);
    let vid = allocate_vlan(&allocator, &groups, plan.range).await?;

    if ctx.format == OutputFormat::Table {
        print_info(&format!(
            "Provisioning VLAN {} '{}' on {}",
            vid,
            plan.name,
            groups.join(", ")
        ));
    }

    let report = provision_vlan(
        targets,
        VlanSpec {
            vid,
            name: plan.name,
        },
        Arc::new(DeviceTransport::new(&ctx.config.transport)),
        move |target| Arc::new(NetBoxVlanGateway::new(client.clone(), target.site_id)),
        ctx.orchestrator(),
        ctx.mode,
    )
    .await;

    print_report(&report, ctx.format);
    Ok(())
}
