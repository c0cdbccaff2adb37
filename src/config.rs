//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::delete::DeletionRetrier;
use crate::prism::PrismClient;
use crate::sweep::SweepSettings;

/// Default call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Default work-list file written by detach-only runs.
pub const DEFAULT_WORKLIST_PATH: &str = "vgsweep-detached.jsonl";

/// Prism Central connection settings and sweep tunables, merged from
/// defaults, `vgsweep.toml`, and `PRISM_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PRISM",
    discovery(
        app_name = "vgsweep",
        env_var = "VGSWEEP_CONFIG_PATH",
        config_file_name = "vgsweep.toml",
        dotfile_name = ".vgsweep.toml",
        project_file_name = "vgsweep.toml"
    )
)]
pub struct PrismConfig {
    /// Prism Central URL or bare host name. A bare host is expanded to
    /// `https://<host>:9440`.
    #[ortho_config(default = String::new())]
    pub endpoint: String,
    /// Basic-auth user name.
    #[ortho_config(default = String::new())]
    pub username: String,
    /// Basic-auth password.
    #[ortho_config(default = String::new())]
    pub password: String,
    /// Per-call timeout in seconds.
    #[ortho_config(default = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
    /// Delete attempts per volume group on transient errors.
    #[ortho_config(default = 3)]
    pub delete_retries: u32,
    /// Comma-separated delays, in seconds, between delete attempts.
    #[ortho_config(default = "2,5,10".to_owned())]
    pub retry_backoff_secs: String,
    /// Pause between volume groups in deleting modes, in seconds.
    #[ortho_config(default = 3)]
    pub inter_target_delay_secs: u64,
    /// Wait after a successful detach before deleting, in seconds.
    #[ortho_config(default = 30)]
    pub post_detach_wait_secs: u64,
    /// Entities requested per list call. Larger inventories are truncated.
    #[ortho_config(default = 500)]
    pub page_size: u32,
    /// Name prefix marking a volume group as a persistent-volume claim.
    #[ortho_config(default = "pvc-".to_owned())]
    pub pvc_prefix: String,
    /// Work-list written by detach-only runs.
    #[ortho_config(default = DEFAULT_WORKLIST_PATH.to_owned())]
    pub worklist_path: String,
    /// Exit with status 3 when any target failed.
    #[ortho_config(default = false)]
    pub fail_on_target_errors: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn hint(&self) -> String {
        format!("set {} or add {} to vgsweep.toml", self.env_var, self.toml_key)
    }
}

const ENDPOINT: FieldMetadata =
    FieldMetadata::new("Prism Central endpoint", "PRISM_ENDPOINT", "endpoint");
const USERNAME: FieldMetadata =
    FieldMetadata::new("Prism Central user name", "PRISM_USERNAME", "username");
const PASSWORD: FieldMetadata =
    FieldMetadata::new("Prism Central password", "PRISM_PASSWORD", "password");
const TIMEOUT: FieldMetadata =
    FieldMetadata::new("call timeout", "PRISM_TIMEOUT_SECS", "timeout_secs");
const BACKOFF: FieldMetadata = FieldMetadata::new(
    "retry backoff",
    "PRISM_RETRY_BACKOFF_SECS",
    "retry_backoff_secs",
);
const PAGE_SIZE: FieldMetadata =
    FieldMetadata::new("list page size", "PRISM_PAGE_SIZE", "page_size");
const PVC_PREFIX: FieldMetadata =
    FieldMetadata::new("volume group name prefix", "PRISM_PVC_PREFIX", "pvc_prefix");

impl PrismConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    fn invalid(metadata: &FieldMetadata, problem: &str) -> ConfigError {
        ConfigError::InvalidValue(format!(
            "invalid {}: {problem}; {}",
            metadata.description,
            metadata.hint()
        ))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("vgsweep")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply the offending value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a credential is empty and
    /// [`ConfigError::InvalidValue`] when a tunable is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(&self.endpoint, &ENDPOINT)?;
        Self::require_field(&self.username, &USERNAME)?;
        Self::require_field(&self.password, &PASSWORD)?;
        Self::require_field(&self.pvc_prefix, &PVC_PREFIX)?;
        if self.timeout_secs == 0 {
            return Err(Self::invalid(&TIMEOUT, "must be at least 1 second"));
        }
        if self.page_size == 0 {
            return Err(Self::invalid(&PAGE_SIZE, "must be at least 1"));
        }
        self.backoff()?;
        Ok(())
    }

    /// Parses [`Self::retry_backoff_secs`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when an entry is not a whole
    /// number of seconds.
    pub fn backoff(&self) -> Result<Vec<Duration>, ConfigError> {
        self.retry_backoff_secs
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| {
                        Self::invalid(
                            &BACKOFF,
                            &format!("'{entry}' is not a whole number of seconds"),
                        )
                    })
            })
            .collect()
    }

    /// Builds the sweep tunables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn settings(&self) -> Result<SweepSettings, ConfigError> {
        self.validate()?;
        Ok(SweepSettings {
            page_size: self.page_size,
            pvc_prefix: self.pvc_prefix.trim().to_owned(),
            inter_target_delay: Duration::from_secs(self.inter_target_delay_secs),
            post_detach_wait: Duration::from_secs(self.post_detach_wait_secs),
            retrier: DeletionRetrier::new(self.delete_retries, self.backoff()?),
        })
    }

    /// Builds an authenticated client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the endpoint is not a
    /// usable URL.
    pub fn client(&self) -> Result<PrismClient, ConfigError> {
        self.validate()?;
        PrismClient::new(
            self.endpoint.trim(),
            self.username.trim(),
            self.password.as_str(),
            Duration::from_secs(self.timeout_secs),
        )
        .map_err(|err| Self::invalid(&ENDPOINT, &err.to_string()))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
