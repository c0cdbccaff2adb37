//! Discovery of persistent-volume volume groups attached to powered-off
//! cluster VMs.

mod types;

use std::collections::{BTreeMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::prism::types::{ListResponse, VmEntity, VolumeGroupEntity};
use crate::prism::{ApiRequest, PrismError, Transport};

pub use types::{AttachmentTarget, CLUSTER_TAG_KEYS, PowerState, VirtualMachine, VolumeGroup};

/// Path of the VM list call.
pub const VM_LIST_PATH: &str = "/api/nutanix/v3/vms/list";
/// Path of the volume group list call.
pub const VOLUME_GROUP_LIST_PATH: &str = "/api/nutanix/v3/volume_groups/list";

/// Errors raised while listing inventory.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InventoryError {
    /// Raised when a list call fails at the transport level.
    #[error(transparent)]
    Transport(#[from] PrismError),
    /// Raised when a list call is rejected by the server.
    #[error("listing {resource} failed: {message}")]
    Rejected {
        /// Resource being listed.
        resource: String,
        /// Error text from the API.
        message: String,
    },
    /// Raised when a list response cannot be decoded.
    #[error("failed to parse {resource} list: {message}")]
    Parse {
        /// Resource being listed.
        resource: String,
        /// Decoder error message.
        message: String,
    },
}

/// Why live discovery found nothing to do.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EmptyReason {
    /// No VM carrying the cluster tag is powered off.
    NoPoweredOffVms {
        /// VMs carrying the cluster tag in any power state.
        tagged_vms: usize,
    },
    /// Matching VMs exist but none references a managed volume group.
    NoManagedVolumeGroups {
        /// Powered-off VMs that matched the cluster tag.
        powered_off_vms: usize,
    },
}

/// Result of live discovery.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Discovery {
    /// Targets in discovery order, unique by volume group.
    pub targets: Vec<AttachmentTarget>,
    /// VMs carrying the cluster tag in any power state.
    pub tagged_vms: usize,
    /// Powered-off VMs matching the cluster tag.
    pub powered_off_vms: Vec<VirtualMachine>,
    /// Volume groups listed during discovery, keyed by identifier.
    pub volume_groups: BTreeMap<String, VolumeGroup>,
}

impl Discovery {
    /// Explains an empty target set, or returns `None` when there is work.
    #[must_use]
    pub fn empty_reason(&self) -> Option<EmptyReason> {
        if self.powered_off_vms.is_empty() {
            return Some(EmptyReason::NoPoweredOffVms {
                tagged_vms: self.tagged_vms,
            });
        }
        if self.targets.is_empty() {
            return Some(EmptyReason::NoManagedVolumeGroups {
                powered_off_vms: self.powered_off_vms.len(),
            });
        }
        None
    }
}

/// Lists VMs and volume groups and resolves attachment targets.
#[derive(Clone, Copy, Debug)]
pub struct Resolver<'a> {
    api: &'a dyn Transport,
    page_size: u32,
    pvc_prefix: &'a str,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver.
    ///
    /// Lists are requested with a single page of `page_size` entities; larger
    /// inventories are truncated.
    #[must_use]
    pub const fn new(api: &'a dyn Transport, page_size: u32, pvc_prefix: &'a str) -> Self {
        Self {
            api,
            page_size,
            pvc_prefix,
        }
    }

    /// Discovers managed volume groups attached to powered-off VMs tagged
    /// with `cluster_name`.
    ///
    /// The volume group list is only fetched when at least one VM matched.
    /// A volume group referenced by several VMs yields one target, for the
    /// first VM in list order.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when a list call fails or cannot be decoded.
    pub async fn discover(&self, cluster_name: &str) -> Result<Discovery, InventoryError> {
        let vms = self.list_vms().await?;
        let tagged: Vec<VirtualMachine> = vms
            .into_iter()
            .filter(|vm| vm.cluster_tag.as_deref() == Some(cluster_name))
            .collect();
        let tagged_vms = tagged.len();
        let powered_off_vms: Vec<VirtualMachine> =
            tagged.into_iter().filter(VirtualMachine::is_powered_off).collect();
        info!(
            cluster = cluster_name,
            tagged = tagged_vms,
            powered_off = powered_off_vms.len(),
            "resolved cluster VMs"
        );

        if powered_off_vms.is_empty() {
            return Ok(Discovery {
                targets: Vec::new(),
                tagged_vms,
                powered_off_vms,
                volume_groups: BTreeMap::new(),
            });
        }

        let volume_groups = self.volume_group_index().await?;
        let targets = resolve_targets(&powered_off_vms, &volume_groups, self.pvc_prefix);
        info!(targets = targets.len(), "resolved managed volume groups");

        Ok(Discovery {
            targets,
            tagged_vms,
            powered_off_vms,
            volume_groups,
        })
    }

    /// Lists VMs, skipping entities without an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the call fails or cannot be decoded.
    pub async fn list_vms(&self) -> Result<Vec<VirtualMachine>, InventoryError> {
        let entities: Vec<VmEntity> = self.list(VM_LIST_PATH, "vm", "VMs").await?;
        Ok(entities.iter().filter_map(VirtualMachine::from_entity).collect())
    }

    /// Lists volume groups, skipping entities without an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the call fails or cannot be decoded.
    pub async fn list_volume_groups(&self) -> Result<Vec<VolumeGroup>, InventoryError> {
        let entities: Vec<VolumeGroupEntity> = self
            .list(VOLUME_GROUP_LIST_PATH, "volume_group", "volume groups")
            .await?;
        Ok(entities.iter().filter_map(VolumeGroup::from_entity).collect())
    }

    /// Lists volume groups keyed by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when the call fails or cannot be decoded.
    pub async fn volume_group_index(
        &self,
    ) -> Result<BTreeMap<String, VolumeGroup>, InventoryError> {
        Ok(self
            .list_volume_groups()
            .await?
            .into_iter()
            .map(|group| (group.id.clone(), group))
            .collect())
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        kind: &str,
        resource: &str,
    ) -> Result<Vec<T>, InventoryError> {
        let request = ApiRequest::list(path, json!({"kind": kind, "length": self.page_size}));
        let response = self.api.call(&request).await?;
        if !response.is_success() {
            return Err(InventoryError::Rejected {
                resource: resource.to_owned(),
                message: response
                    .error_message()
                    .unwrap_or_else(|| format!("HTTP {}", response.status)),
            });
        }

        let page: ListResponse<T> =
            serde_json::from_str(&response.body).map_err(|err| InventoryError::Parse {
                resource: resource.to_owned(),
                message: err.to_string(),
            })?;
        if let Some(total) = page.metadata.as_ref().and_then(|meta| meta.total_matches)
            && total > u64::from(self.page_size)
        {
            debug!(
                resource,
                total,
                page_size = self.page_size,
                "list truncated to one page"
            );
        }
        Ok(page.entities)
    }
}

/// Maps powered-off VMs to managed volume groups, first VM wins per group.
#[must_use]
pub fn resolve_targets(
    vms: &[VirtualMachine],
    volume_groups: &BTreeMap<String, VolumeGroup>,
    pvc_prefix: &str,
) -> Vec<AttachmentTarget> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for vm in vms {
        for vg_id in &vm.volume_group_ids {
            let Some(group) = volume_groups.get(vg_id) else {
                debug!(vm = %vm.name, volume_group = %vg_id, "referenced volume group not listed");
                continue;
            };
            if !group.is_managed(pvc_prefix) {
                debug!(
                    vm = %vm.name,
                    volume_group = %group.name,
                    "skipping unmanaged volume group"
                );
                continue;
            }
            if seen.insert(group.id.clone()) {
                targets.push(AttachmentTarget::new(group, vm));
            }
        }
    }
    targets
}
