//! Per-run accounting and operator-facing reports.

use std::fmt;
use std::io::{self, Write};

use camino::Utf8PathBuf;

use crate::inventory::{AttachmentTarget, CLUSTER_TAG_KEYS, EmptyReason};

/// Phase in which a target failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureStage {
    /// Every detach strategy failed.
    Detach,
    /// The delete was rejected or retries ran out.
    Delete,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Detach => "detach",
            Self::Delete => "delete",
        })
    }
}

/// One isolated per-target failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetFailure {
    /// Phase that failed.
    pub stage: FailureStage,
    /// Target that failed.
    pub target: AttachmentTarget,
    /// Error text from the API.
    pub message: String,
}

/// Counts accumulated across one run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    /// Targets processed.
    pub targets: usize,
    /// Targets detached during this run.
    pub detached: usize,
    /// Targets that had no live attachment.
    pub already_detached: usize,
    /// Targets whose detach failed.
    pub detach_failures: usize,
    /// Volume groups deleted.
    pub deleted: usize,
    /// Volume groups whose delete failed.
    pub delete_failures: usize,
    /// Failures in processing order.
    pub failures: Vec<TargetFailure>,
    /// Work-list written by a detach-only run.
    pub worklist: Option<Utf8PathBuf>,
}

impl SweepSummary {
    /// Returns `true` when any target failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub(crate) fn record_failure(
        &mut self,
        stage: FailureStage,
        target: &AttachmentTarget,
        message: String,
    ) {
        match stage {
            FailureStage::Detach => self.detach_failures += 1,
            FailureStage::Delete => self.delete_failures += 1,
        }
        self.failures.push(TargetFailure {
            stage,
            target: target.clone(),
            message,
        });
    }

    /// Writes the end-of-run report.
    ///
    /// # Errors
    ///
    /// Returns any error raised by `out`.
    pub fn render(&self, out: &mut dyn Write, deletes: bool) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "Summary")?;
        writeln!(out, "  targets:          {}", self.targets)?;
        writeln!(out, "  detached:         {}", self.detached)?;
        writeln!(out, "  already detached: {}", self.already_detached)?;
        writeln!(out, "  detach failures:  {}", self.detach_failures)?;
        if deletes {
            writeln!(out, "  deleted:          {}", self.deleted)?;
            writeln!(out, "  delete failures:  {}", self.delete_failures)?;
        }
        if let Some(path) = &self.worklist {
            writeln!(out, "  work-list:        {path}")?;
        }
        if self.has_failures() {
            writeln!(out, "Failures:")?;
            for failure in &self.failures {
                writeln!(
                    out,
                    "  [{}] {}: {}",
                    failure.stage,
                    failure.target.label(),
                    failure.message
                )?;
            }
        }
        Ok(())
    }
}

/// Writes the numbered target listing shown before confirmation.
///
/// # Errors
///
/// Returns any error raised by `out`.
pub fn render_targets(out: &mut dyn Write, targets: &[AttachmentTarget]) -> io::Result<()> {
    writeln!(out, "{} volume group(s) selected:", targets.len())?;
    for (index, target) in targets.iter().enumerate() {
        let vm = target
            .attached_vm_name
            .as_deref()
            .or(target.attached_vm.as_deref())
            .unwrap_or("-");
        writeln!(out, "  {:>3}. {}  attached to {vm}", index + 1, target.label())?;
    }
    Ok(())
}

/// Explains an empty live discovery.
///
/// # Errors
///
/// Returns any error raised by `out`.
pub fn render_empty(
    out: &mut dyn Write,
    cluster: &str,
    pvc_prefix: &str,
    reason: &EmptyReason,
) -> io::Result<()> {
    match reason {
        EmptyReason::NoPoweredOffVms { tagged_vms } => {
            writeln!(
                out,
                "No powered-off VMs found for cluster '{cluster}' \
                 ({tagged_vms} tagged VM(s) in any state)."
            )?;
            writeln!(out, "Check that:")?;
            writeln!(out, "  - the cluster name is spelled as in the VM categories")?;
            writeln!(out, "  - the cluster VMs have been powered off")?;
            let [primary, legacy] = CLUSTER_TAG_KEYS;
            writeln!(out, "  - the VMs carry a {primary} or {legacy} category")?;
        }
        EmptyReason::NoManagedVolumeGroups { powered_off_vms } => {
            writeln!(
                out,
                "{powered_off_vms} powered-off VM(s) found for cluster '{cluster}', but none has a \
                 volume group named '{pvc_prefix}*' attached."
            )?;
        }
    }
    writeln!(out, "Nothing to do.")
}
