//! Volume group deletion with bounded retry on transient errors.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::prism::{ApiRequest, Transport};

/// Substrings, matched case-insensitively, that mark an error as transient.
pub const TRANSIENT_MARKERS: [&str; 6] = [
    "rpc",
    "timeout",
    "timed out",
    "connection",
    "temporarily unavailable",
    "unavailable",
];

/// Default delays between delete attempts.
pub const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Returns `true` when `message` matches the transient-error vocabulary.
#[must_use]
pub fn is_transient(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Terminal deletion failures.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeleteError {
    /// The server rejected the delete with a non-transient error.
    #[error("delete of volume group {volume_group_id} failed: {message}")]
    Rejected {
        /// Volume group identifier.
        volume_group_id: String,
        /// Error text from the API.
        message: String,
    },
    /// Every attempt failed with a transient error.
    #[error("delete of volume group {volume_group_id} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Volume group identifier.
        volume_group_id: String,
        /// Attempts made.
        attempts: u32,
        /// Error text from the last attempt.
        message: String,
    },
}

impl DeleteError {
    /// Returns the API error text without the identifier prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message, .. } | Self::RetriesExhausted { message, .. } => message,
        }
    }
}

/// Deletes volume groups through the newer generation, falling back to the
/// primary one, retrying the pair on transient errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeletionRetrier {
    attempts: u32,
    backoff: Vec<Duration>,
}

impl Default for DeletionRetrier {
    fn default() -> Self {
        Self::new(3, DEFAULT_BACKOFF.to_vec())
    }
}

impl DeletionRetrier {
    /// Creates a retrier making at most `attempts` tries (at least one).
    ///
    /// The delay before retry `n` is `backoff[n - 1]`, repeating the last
    /// delay once the sequence runs out. An empty sequence retries without
    /// waiting.
    #[must_use]
    pub fn new(attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Returns the configured attempt budget.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }

    /// Deletes `volume_group_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DeleteError::Rejected`] on the first non-transient failure
    /// and [`DeleteError::RetriesExhausted`] once the budget is spent.
    pub async fn delete(
        &self,
        api: &dyn Transport,
        volume_group_id: &str,
    ) -> Result<(), DeleteError> {
        let mut attempt = 1;
        loop {
            let message = match delete_once(api, volume_group_id).await {
                Ok(()) => return Ok(()),
                Err(message) => message,
            };

            if !is_transient(&message) {
                return Err(DeleteError::Rejected {
                    volume_group_id: volume_group_id.to_owned(),
                    message,
                });
            }
            if attempt >= self.attempts {
                return Err(DeleteError::RetriesExhausted {
                    volume_group_id: volume_group_id.to_owned(),
                    attempts: attempt,
                    message,
                });
            }

            let delay = self.delay_after(attempt);
            warn!(
                volume_group = volume_group_id,
                attempt,
                delay_secs = delay.as_secs(),
                error = %message,
                "transient delete failure; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// One newer-then-primary delete pass.
///
/// On failure returns the text to classify: a transient error from either
/// generation wins, so an older server rejecting the newer path does not mask
/// a retryable primary failure.
async fn delete_once(api: &dyn Transport, volume_group_id: &str) -> Result<(), String> {
    let newer = api
        .call(&ApiRequest::delete(format!(
            "/api/storage/v4.0/config/volume-groups/{volume_group_id}"
        )))
        .await;
    let newer_error = match newer {
        Ok(response) if response.envelope().data_identifier().is_some() => {
            debug!(volume_group = volume_group_id, "deleted through v4");
            return Ok(());
        }
        Ok(response) => response.error_message(),
        Err(err) => Some(err.to_string()),
    };

    let primary = api
        .call(&ApiRequest::delete(format!(
            "/api/nutanix/v3/volume_groups/{volume_group_id}"
        )))
        .await;
    let primary_error = match primary {
        Ok(response) if response.envelope().is_complete() => {
            debug!(volume_group = volume_group_id, "deleted through v3");
            return Ok(());
        }
        Ok(response) => response.error_message(),
        Err(err) => Some(err.to_string()),
    };

    let message = match (newer_error, primary_error) {
        (Some(newer), Some(primary)) if is_transient(&primary) && !is_transient(&newer) => {
            debug!(volume_group = volume_group_id, newer = %newer, "newer delete failed");
            primary
        }
        (newer, primary) => newer
            .or(primary)
            .unwrap_or_else(|| String::from("delete not confirmed by either API")),
    };
    Err(message)
}
