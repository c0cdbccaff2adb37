//! Command-line interface definitions for the `vgsweep` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{ArgGroup, Parser};

/// Top-level CLI for the `vgsweep` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vgsweep",
    about = "Detach and delete Kubernetes persistent-volume volume groups through Prism Central",
    arg_required_else_help = true
)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["cluster", "volumes"])
))]
pub(crate) struct Cli {
    /// Kubernetes cluster whose powered-off VMs are swept.
    ///
    /// Targets are discovered live from the VM and volume group inventory.
    #[arg(long, value_name = "NAME")]
    pub(crate) cluster: Option<String>,
    /// Work-list written by an earlier `--detach-only` run.
    ///
    /// Every listed volume group is detached if still attached and then
    /// deleted.
    #[arg(long, value_name = "FILE")]
    pub(crate) volumes: Option<String>,
    /// Detach only and record the detached volume groups in a work-list.
    #[arg(long, requires = "cluster", conflicts_with = "volumes")]
    pub(crate) detach_only: bool,
    /// Work-list path for `--detach-only`, overriding `worklist_path`.
    #[arg(long, value_name = "PATH", requires = "detach_only")]
    pub(crate) worklist: Option<String>,
    /// Exit with status 3 when any volume group failed.
    #[arg(long)]
    pub(crate) strict: bool,
    /// Log raw request and response detail.
    #[arg(long)]
    pub(crate) debug: bool,
}
