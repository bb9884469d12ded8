//! CLI commands.

mod vlans;
mod vms;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netsync_reconcile::{ApplyMode, OrchestratorConfig, MAX_PARALLELISM_LIMIT};

use crate::config::Config;
use crate::inventory::NetBoxClient;
use crate::output::OutputFormat;

/// netsync - Synchronize switch VLANs and vCenter VMs into the inventory.
#[derive(Debug, Parser)]
#[command(name = "netsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table, env = "NETSYNC_OUTPUT")]
    format: OutputFormat,

    /// Maximum number of targets processed at once.
    #[arg(long, global = true)]
    max_parallelism: Option<usize>,

    /// Stop starting new targets after this many seconds.
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Compute and report the changes without writing anything.
    #[arg(long, global = true, env = "NETSYNC_DRY_RUN")]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync, allocate and provision VLANs.
    Vlans(vlans::VlansCommand),

    /// Collect and sync virtual machines.
    Vms(vms::VmsCommand),
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self, mut config: Config) -> Result<()> {
        if let Some(parallelism) = self.max_parallelism {
            config.max_parallelism = parallelism.clamp(1, MAX_PARALLELISM_LIMIT);
        }
        if let Some(secs) = self.deadline_secs {
            config.deadline = Some(Duration::from_secs(secs));
        }

        let ctx = CommandContext {
            config,
            format: self.format,
            mode: if self.dry_run {
                ApplyMode::DryRun
            } else {
                ApplyMode::Apply
            },
        };

        match self.command {
            Commands::Vlans(cmd) => cmd.run(ctx).await,
            Commands::Vms(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    pub mode: ApplyMode,
}

impl CommandContext {
    /// Get an inventory API client.
    pub fn client(&self) -> Result<NetBoxClient> {
        let inventory = self.config.require_inventory()?;
        NetBoxClient::new(inventory).context("failed to create inventory client")
    }

    /// Orchestrator settings for this run.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_parallelism: self.config.max_parallelism,
            deadline: self.config.deadline,
        }
    }
}
