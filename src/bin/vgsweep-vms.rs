//! Cluster VM report and cleanup companion for `vgsweep`.
//!
//! `report` prints the cluster's VMs with their managed volume groups.
//! `delete` removes powered-off VMs once `vgsweep` has cleared their volumes.

use std::io::{self, Write};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vgsweep::inventory::Resolver;
use vgsweep::vms::{ClusterInventory, delete_vms};
use vgsweep::{CONFIRMATION_WORD, Confirmation, PrismConfig, StdinConfirmation};

#[derive(Debug, Parser)]
#[command(
    name = "vgsweep-vms",
    about = "Report or delete the VMs of a Kubernetes cluster in Prism Central"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Log raw request and response detail.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the cluster's VMs with power state, size, and volume groups.
    Report {
        /// Kubernetes cluster name.
        #[arg(long, value_name = "NAME")]
        cluster: String,
    },
    /// Delete powered-off cluster VMs that hold no managed volume group.
    Delete {
        /// Kubernetes cluster name.
        #[arg(long, value_name = "NAME")]
        cluster: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let directive = if cli.debug { "vgsweep=debug" } else { "vgsweep=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_writer(io::stderr)
        .try_init()
        .ok();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(message) => {
            writeln!(io::stderr(), "vgsweep-vms: {message}").ok();
            1
        }
    };
    process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, String> {
    let config = PrismConfig::load_without_cli_args().map_err(|err| err.to_string())?;
    let settings = config.settings().map_err(|err| err.to_string())?;
    let client = config.client().map_err(|err| err.to_string())?;
    let resolver = Resolver::new(&client, settings.page_size, &settings.pvc_prefix);
    let mut out = io::stdout();

    match cli.command {
        Command::Report { cluster } => {
            let inventory = ClusterInventory::load(&resolver, &cluster, &settings.pvc_prefix)
                .await
                .map_err(|err| err.to_string())?;
            inventory.render_tree(&mut out).map_err(|err| err.to_string())?;
            Ok(0)
        }
        Command::Delete { cluster, yes } => {
            let inventory = ClusterInventory::load(&resolver, &cluster, &settings.pvc_prefix)
                .await
                .map_err(|err| err.to_string())?;
            delete(&client, &inventory, yes, &mut out).await.map_err(|err| err.to_string())
        }
    }
}

async fn delete(
    client: &vgsweep::PrismClient,
    inventory: &ClusterInventory,
    yes: bool,
    out: &mut dyn Write,
) -> io::Result<i32> {
    for entry in inventory.blocked() {
        let names: Vec<&str> = entry
            .volume_groups
            .iter()
            .map(|group| group.name.as_str())
            .collect();
        writeln!(out, "skipping {}: still holds {}", entry.vm.name, names.join(", "))?;
    }
    let targets = inventory.deletable();
    if targets.is_empty() {
        writeln!(out, "No deletable powered-off VMs in cluster '{}'.", inventory.cluster)?;
        return Ok(0);
    }

    writeln!(out, "{} VM(s) selected:", targets.len())?;
    for vm in &targets {
        writeln!(out, "  {} ({})", vm.name, vm.id)?;
    }
    if !yes {
        write!(
            out,
            "Permanently DELETE {} VM(s)? Type '{CONFIRMATION_WORD}' to continue: ",
            targets.len()
        )?;
        out.flush()?;
        if !StdinConfirmation.confirm()? {
            writeln!(out, "Aborted; nothing was changed.")?;
            return Ok(0);
        }
    }

    let summary = delete_vms(client, &targets).await;
    writeln!(out, "deleted {} of {} VM(s)", summary.deleted, targets.len())?;
    for (name, message) in &summary.failures {
        writeln!(out, "  failed {name}: {message}")?;
    }
    Ok(0)
}
