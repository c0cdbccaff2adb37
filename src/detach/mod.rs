//! Ordered fallback chain for detaching a volume group from a VM.
//!
//! The management plane has shipped several incompatible generations of the
//! detach operation. Each generation is wrapped in a [`DetachStrategy`] and
//! the [`DetachChain`] tries them in a fixed order until one reports success.

mod strategies;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::{debug, info};

use crate::prism::Transport;

pub use strategies::{
    ActionDetach, ClusterDetach, DiskListEdit, PrimaryListRef, PrimarySingleRef,
};

/// Message reported when no strategy produced an interpretable error.
pub const NO_STRATEGY_SUCCEEDED: &str = "no detach method succeeded";

/// Future returned by [`DetachStrategy::attempt`].
pub type AttemptFuture<'a> = Pin<Box<dyn Future<Output = Attempt> + Send + 'a>>;

/// One attachment to remove.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetachRequest {
    /// Volume group identifier.
    pub volume_group_id: String,
    /// VM identifier.
    pub vm_id: String,
}

impl DetachRequest {
    /// Creates a request for the given pair.
    #[must_use]
    pub fn new(volume_group_id: impl Into<String>, vm_id: impl Into<String>) -> Self {
        Self {
            volume_group_id: volume_group_id.into(),
            vm_id: vm_id.into(),
        }
    }
}

/// Outcome of a single strategy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Attempt {
    /// The strategy reported definitive success.
    Detached,
    /// The strategy failed, with the error text it found, if any.
    Failed(Option<String>),
}

impl Attempt {
    fn failed(message: impl Into<String>) -> Self {
        Self::Failed(Some(message.into()))
    }
}

/// A single detach mechanism.
pub trait DetachStrategy: Send + Sync {
    /// Short name used in logs and success reports.
    fn name(&self) -> &'static str;

    /// Attempts the detach once.
    fn attempt<'a>(&'a self, api: &'a dyn Transport, request: &'a DetachRequest)
    -> AttemptFuture<'a>;
}

/// Raised when every strategy in the chain failed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DetachError {
    /// Every strategy was tried and none succeeded.
    #[error("detach of volume group {volume_group_id} from VM {vm_id} failed: {message}")]
    Exhausted {
        /// Volume group identifier.
        volume_group_id: String,
        /// VM identifier.
        vm_id: String,
        /// First error text reported by any strategy.
        message: String,
    },
}

impl DetachError {
    /// Returns the API error text without the pair prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Exhausted { message, .. } => message,
        }
    }
}

/// Strategies tried in order until one succeeds.
pub struct DetachChain {
    strategies: Vec<Box<dyn DetachStrategy>>,
}

impl std::fmt::Debug for DetachChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|strategy| strategy.name()))
            .finish()
    }
}

impl Default for DetachChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(PrimarySingleRef),
            Box::new(PrimaryListRef),
            Box::new(ActionDetach),
            Box::new(ClusterDetach),
            Box::new(DiskListEdit),
        ])
    }
}

impl DetachChain {
    /// Builds a chain from an explicit strategy list.
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn DetachStrategy>>) -> Self {
        Self { strategies }
    }

    /// Returns strategy names in the order they are tried.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Runs strategies in order and returns the name of the one that
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`DetachError::Exhausted`] carrying the first non-empty error
    /// reported, in strategy order, when no strategy succeeds.
    pub async fn detach(
        &self,
        api: &dyn Transport,
        request: &DetachRequest,
    ) -> Result<&'static str, DetachError> {
        let mut first_error: Option<String> = None;
        for strategy in &self.strategies {
            match strategy.attempt(api, request).await {
                Attempt::Detached => {
                    info!(
                        volume_group = %request.volume_group_id,
                        vm = %request.vm_id,
                        strategy = strategy.name(),
                        "detached"
                    );
                    return Ok(strategy.name());
                }
                Attempt::Failed(message) => {
                    debug!(
                        volume_group = %request.volume_group_id,
                        vm = %request.vm_id,
                        strategy = strategy.name(),
                        error = message.as_deref().unwrap_or("<none>"),
                        "detach strategy failed"
                    );
                    if first_error.is_none() {
                        first_error = message.filter(|text| !text.trim().is_empty());
                    }
                }
            }
        }

        Err(DetachError::Exhausted {
            volume_group_id: request.volume_group_id.clone(),
            vm_id: request.vm_id.clone(),
            message: first_error.unwrap_or_else(|| String::from(NO_STRATEGY_SUCCEEDED)),
        })
    }
}
