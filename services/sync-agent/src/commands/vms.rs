//! VM commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use super::CommandContext;
use crate::inventory::NetBoxVmGateway;
use crate::output::{print_report, print_single, print_success, OutputFormat};
use crate::sync::sync_vms;
use crate::vm::{
    cluster_observations, collect_inventory, HypervisorApi, VcenterClient, VmSnapshot,
    DEFAULT_DETAIL_CONCURRENCY,
};

/// VM commands.
#[derive(Debug, Args)]
pub struct VmsCommand {
    #[command(subcommand)]
    command: VmsSubcommand,
}

#[derive(Debug, Subcommand)]
enum VmsSubcommand {
    /// Walk vCenter and write the VM snapshot.
    Collect(CollectArgs),

    /// Converge the inventory's clusters and VMs to the snapshot.
    Sync(SnapshotArgs),
}

#[derive(Debug, Args)]
struct CollectArgs {
    /// Where to write the snapshot (defaults to NETSYNC_SNAPSHOT_PATH).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Concurrent VM detail requests.
    #[arg(long, default_value_t = DEFAULT_DETAIL_CONCURRENCY)]
    concurrency: usize,
}

#[derive(Debug, Args)]
struct SnapshotArgs {
    /// Snapshot to sync from (defaults to NETSYNC_SNAPSHOT_PATH).
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CollectSummary<'a> {
    path: String,
    source: &'a str,
    digest: &'a str,
    datacenters: usize,
    vms: usize,
}

impl VmsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            VmsSubcommand::Collect(args) => collect(ctx, args).await,
            VmsSubcommand::Sync(args) => sync(ctx, args).await,
        }
    }
}

async fn collect(ctx: CommandContext, args: CollectArgs) -> Result<()> {
    let vcenter = ctx.config.require_vcenter()?;
    let client = VcenterClient::login(vcenter)
        .await
        .context("failed to log in to vCenter")?;

    let datacenters = collect_inventory(&client, args.concurrency.max(1))
        .await
        .context("failed to collect VM inventory")?;
    let snapshot = VmSnapshot::new(client.source(), datacenters)?;

    let path = args.output.unwrap_or_else(|| ctx.config.snapshot_path.clone());
    snapshot
        .write(&path)
        .await
        .with_context(|| format!("failed to write snapshot to {}", path.display()))?;

    match ctx.format {
        OutputFormat::Json => print_single(&CollectSummary {
            path: path.display().to_string(),
            source: &snapshot.source,
            digest: &snapshot.digest,
            datacenters: snapshot.datacenters.len(),
            vms: snapshot.vm_count(),
        }),
        OutputFormat::Table => print_success(&format!(
            "Collected {} VMs in {} datacenters into {}",
            snapshot.vm_count(),
            snapshot.datacenters.len(),
            path.display()
        )),
    }
    Ok(())
}

async fn sync(ctx: CommandContext, args: SnapshotArgs) -> Result<()> {
    let path = args.snapshot.unwrap_or_else(|| ctx.config.snapshot_path.clone());
    let snapshot = VmSnapshot::load(&path)
        .await
        .context("failed to load snapshot")?;
    let clusters = cluster_observations(&snapshot, ctx.config.vm_name_max);

    let gateway = Arc::new(NetBoxVmGateway::new(
        ctx.client()?,
        ctx.config.cluster_type.clone(),
    ));
    let report = sync_vms(clusters, gateway, ctx.orchestrator(), ctx.mode).await;

    print_report(&report, ctx.format);
    Ok(())
}
