//! Phase orchestration for a sweep run.
//!
//! A run moves through discover, confirm, and detach, then either writes a
//! work-list (detach-only) or deletes each volume group. Per-target failures
//! are isolated and tallied in a [`SweepSummary`]; nothing past the
//! confirmation gate aborts the batch except a failure to persist the
//! work-list.

mod confirm;
mod summary;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::delete::DeletionRetrier;
use crate::detach::{DetachChain, DetachRequest};
use crate::inventory::{AttachmentTarget, EmptyReason, InventoryError, Resolver, VolumeGroup};
use crate::prism::Transport;
use crate::worklist::{self, WorkListError};

pub use confirm::{CONFIRMATION_WORD, Confirmation, StdinConfirmation, is_confirmed};
pub use summary::{FailureStage, SweepSummary, TargetFailure, render_empty, render_targets};

/// Where targets come from and what happens to them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SweepMode {
    /// Discover live, detach, and write the detached set to a work-list.
    DetachOnly {
        /// Kubernetes cluster name.
        cluster: String,
        /// Work-list to write.
        worklist: Utf8PathBuf,
    },
    /// Discover live, detach, and delete.
    DetachAndDelete {
        /// Kubernetes cluster name.
        cluster: String,
    },
    /// Load targets from a work-list, detach any that are still attached, and
    /// delete.
    DeleteFromFile {
        /// Work-list to read.
        path: Utf8PathBuf,
    },
}

impl SweepMode {
    /// Returns `true` when the mode deletes volume groups.
    #[must_use]
    pub const fn deletes(&self) -> bool {
        !matches!(self, Self::DetachOnly { .. })
    }
}

/// Tunables shared by every mode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepSettings {
    /// Entities requested per list call.
    pub page_size: u32,
    /// Name prefix marking a managed volume group.
    pub pvc_prefix: String,
    /// Pause between volume groups in deleting modes.
    pub inter_target_delay: Duration,
    /// Wait after a detach before deleting.
    pub post_detach_wait: Duration,
    /// Delete retry policy.
    pub retrier: DeletionRetrier,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            page_size: 500,
            pvc_prefix: String::from("pvc-"),
            inter_target_delay: Duration::from_secs(3),
            post_detach_wait: Duration::from_secs(30),
            retrier: DeletionRetrier::default(),
        }
    }
}

/// Immutable per-invocation configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunContext {
    /// Selected mode.
    pub mode: SweepMode,
    /// Tunables.
    pub settings: SweepSettings,
    /// Whether per-target failures should fail the process.
    pub fail_on_target_errors: bool,
}

/// How a run ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SweepOutcome {
    /// Live discovery found no targets.
    NothingToDo(EmptyReason),
    /// The operator declined; nothing was changed.
    Cancelled,
    /// Every target was processed.
    Completed(SweepSummary),
}

/// Errors that abort a run.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SweepError {
    /// Discovery or the live attachment listing failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    /// The work-list could not be read or written.
    #[error(transparent)]
    WorkList(#[from] WorkListError),
    /// Operator output or input failed.
    #[error("terminal I/O failed: {0}")]
    Terminal(String),
}

impl From<io::Error> for SweepError {
    fn from(value: io::Error) -> Self {
        Self::Terminal(value.to_string())
    }
}

/// VMs to detach a target from, given its live attachment state.
#[derive(Clone, Debug, Eq, PartialEq)]
enum DetachPlan {
    AlreadyDetached,
    Detach(Vec<String>),
    AttachedElsewhere(Vec<String>),
}

impl DetachPlan {
    /// Detaches from the recorded VM when known; otherwise from every live
    /// attachment. A group now attached only to other VMs is left alone.
    ///
    /// When `holder_is_live` is set the recorded VM was seen referencing the
    /// group in its disk list during this run, so it counts as attached even
    /// if the volume group listing omits it.
    fn for_target(
        target: &AttachmentTarget,
        live: Option<&VolumeGroup>,
        holder_is_live: bool,
    ) -> Self {
        let mut attached = live
            .filter(|group| !group.is_detached())
            .map(|group| group.attached_vm_ids.clone())
            .unwrap_or_default();
        if let Some(vm) = target.attached_vm.as_deref().filter(|_| holder_is_live)
            && !attached.iter().any(|id| id == vm)
        {
            attached.push(vm.to_owned());
        }
        if attached.is_empty() {
            return Self::AlreadyDetached;
        }
        match target.attached_vm.as_deref() {
            Some(vm) if attached.iter().any(|id| id == vm) => Self::Detach(vec![vm.to_owned()]),
            Some(_) => Self::AttachedElsewhere(attached),
            None => Self::Detach(attached),
        }
    }
}

/// Drives one run.
#[derive(Debug)]
pub struct SweepOrchestrator<'a> {
    api: &'a dyn Transport,
    context: &'a RunContext,
    chain: DetachChain,
}

impl<'a> SweepOrchestrator<'a> {
    /// Creates an orchestrator using the standard detach chain.
    #[must_use]
    pub fn new(api: &'a dyn Transport, context: &'a RunContext) -> Self {
        Self {
            api,
            context,
            chain: DetachChain::default(),
        }
    }

    /// Replaces the detach chain.
    #[must_use]
    pub fn with_chain(mut self, chain: DetachChain) -> Self {
        self.chain = chain;
        self
    }

    /// Runs every phase. Operator-facing text goes to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError`] when discovery fails, the work-list cannot be
    /// read or written, or terminal I/O fails. Per-target failures are
    /// reported in the summary instead.
    pub async fn run(
        &self,
        confirmation: &mut dyn Confirmation,
        out: &mut dyn Write,
    ) -> Result<SweepOutcome, SweepError> {
        let settings = &self.context.settings;
        let resolver = Resolver::new(self.api, settings.page_size, &settings.pvc_prefix);

        let (targets, volume_groups) = match &self.context.mode {
            SweepMode::DetachOnly { cluster, .. } | SweepMode::DetachAndDelete { cluster } => {
                let discovery = resolver.discover(cluster).await?;
                if let Some(reason) = discovery.empty_reason() {
                    render_empty(out, cluster, &settings.pvc_prefix, &reason)?;
                    return Ok(SweepOutcome::NothingToDo(reason));
                }
                (discovery.targets, discovery.volume_groups)
            }
            SweepMode::DeleteFromFile { path } => {
                let targets = worklist::load(path)?;
                info!(path = %path, targets = targets.len(), "loaded work-list");
                (targets, resolver.volume_group_index().await?)
            }
        };

        render_targets(out, &targets)?;
        write!(out, "{} Type '{CONFIRMATION_WORD}' to continue: ", self.prompt(targets.len()))?;
        out.flush()?;
        if !confirmation.confirm()? {
            writeln!(out, "Aborted; nothing was changed.")?;
            return Ok(SweepOutcome::Cancelled);
        }

        let mut summary = SweepSummary {
            targets: targets.len(),
            ..SweepSummary::default()
        };
        let mut detached = Vec::new();
        for (index, target) in targets.iter().enumerate() {
            if index > 0 && self.context.mode.deletes() && !settings.inter_target_delay.is_zero() {
                tokio::time::sleep(settings.inter_target_delay).await;
            }
            self.process(target, &volume_groups, &mut summary, &mut detached)
                .await;
        }

        if let SweepMode::DetachOnly { worklist: path, .. } = &self.context.mode {
            if detached.is_empty() {
                warn!("no volume group was detached; work-list not written");
            } else {
                if let Err(err) = worklist::write(path, &detached) {
                    for target in &detached {
                        warn!(target = %target.label(), "detached but not recorded");
                    }
                    return Err(err.into());
                }
                info!(path = %path, records = detached.len(), "work-list written");
                summary.worklist = Some(path.clone());
            }
        }

        summary.render(out, self.context.mode.deletes())?;
        Ok(SweepOutcome::Completed(summary))
    }

    fn prompt(&self, count: usize) -> String {
        match &self.context.mode {
            SweepMode::DetachOnly { worklist: path, .. } => {
                format!("Detach {count} volume group(s) and record them in {path}?")
            }
            SweepMode::DetachAndDelete { .. } => {
                format!("Detach and permanently DELETE {count} volume group(s)?")
            }
            SweepMode::DeleteFromFile { path } => {
                format!("Permanently DELETE {count} volume group(s) listed in {path}?")
            }
        }
    }

    async fn process(
        &self,
        target: &AttachmentTarget,
        volume_groups: &BTreeMap<String, VolumeGroup>,
        summary: &mut SweepSummary,
        detached: &mut Vec<AttachmentTarget>,
    ) {
        let discovered = !matches!(self.context.mode, SweepMode::DeleteFromFile { .. });
        let live = volume_groups.get(&target.volume_group_id);
        if live.is_none() {
            warn!(target = %target.label(), "volume group not in live listing");
        }

        let freshly_detached = match DetachPlan::for_target(target, live, discovered) {
            DetachPlan::AlreadyDetached => {
                info!(target = %target.label(), "no live attachments; already detached");
                summary.already_detached += 1;
                false
            }
            DetachPlan::AttachedElsewhere(vms) => {
                let message = format!(
                    "attached to VM(s) {} rather than the recorded VM; left untouched",
                    vms.join(", ")
                );
                warn!(target = %target.label(), error = %message, "detach skipped");
                summary.record_failure(FailureStage::Detach, target, message);
                return;
            }
            DetachPlan::Detach(vms) => {
                for vm in &vms {
                    let request = DetachRequest::new(target.volume_group_id.clone(), vm.clone());
                    if let Err(err) = self.chain.detach(self.api, &request).await {
                        warn!(
                            target = %target.label(),
                            vm = %vm,
                            error = %err.message(),
                            "detach failed"
                        );
                        summary.record_failure(
                            FailureStage::Detach,
                            target,
                            err.message().to_owned(),
                        );
                        return;
                    }
                }
                summary.detached += 1;
                true
            }
        };

        if !self.context.mode.deletes() {
            detached.push(target.clone());
            return;
        }

        let wait = self.context.settings.post_detach_wait;
        if freshly_detached && !wait.is_zero() {
            info!(
                target = %target.label(),
                wait_secs = wait.as_secs(),
                "waiting for detach to settle"
            );
            tokio::time::sleep(wait).await;
        }
        match self
            .context
            .settings
            .retrier
            .delete(self.api, &target.volume_group_id)
            .await
        {
            Ok(()) => {
                info!(target = %target.label(), "deleted");
                summary.deleted += 1;
            }
            Err(err) => {
                warn!(target = %target.label(), error = %err.message(), "delete failed");
                summary.record_failure(FailureStage::Delete, target, err.message().to_owned());
            }
        }
    }
}
