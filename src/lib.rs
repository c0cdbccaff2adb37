//! Core library for the `vgsweep` volume group cleanup tool.
//!
//! Kubernetes persistent volumes on Nutanix are backed by volume groups
//! attached to the cluster's VMs. Once a cluster is powered off, those
//! volume groups outlive it. The crate discovers them through Prism Central,
//! detaches them through a chain of API strategies, optionally records the
//! detached set in a work-list, and deletes them with bounded retry.

pub mod config;
pub mod delete;
pub mod detach;
pub mod inventory;
pub mod prism;
pub mod sweep;
pub mod test_support;
pub mod vms;
pub mod worklist;

pub use config::{ConfigError, DEFAULT_WORKLIST_PATH, PrismConfig};
pub use delete::{DeleteError, DeletionRetrier, is_transient};
pub use detach::{DetachChain, DetachError, DetachRequest, DetachStrategy};
pub use inventory::{AttachmentTarget, Discovery, EmptyReason, InventoryError, Resolver};
pub use prism::{ApiRequest, ApiResponse, PrismClient, PrismError, Transport};
pub use sweep::{
    CONFIRMATION_WORD, Confirmation, FailureStage, RunContext, StdinConfirmation, SweepError,
    SweepMode, SweepOrchestrator, SweepOutcome, SweepSettings, SweepSummary, TargetFailure,
};
pub use worklist::WorkListError;
