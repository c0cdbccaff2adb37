//! Wire shapes of the primary-generation (v3) list and get responses.
//!
//! Every field is optional: entities returned by different product versions
//! omit different blocks. Domain types in [`crate::inventory`] are built from
//! these once, at the API boundary.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Body of a `.../list` response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListResponse<T> {
    /// Returned entities, bounded by the requested page length.
    #[serde(default = "Vec::new")]
    pub entities: Vec<T>,
    /// Paging metadata.
    #[serde(default)]
    pub metadata: Option<ListMetadata>,
}

/// Paging metadata of a list response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListMetadata {
    /// Total number of matching entities on the server.
    #[serde(default)]
    pub total_matches: Option<u64>,
}

/// Kind/uuid reference to another entity.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Reference {
    /// Entity kind, for example `vm` or `cluster`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Referenced entity identifier.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Display name, when the server includes it.
    #[serde(default)]
    pub name: Option<String>,
}

/// Entity metadata block.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EntityMetadata {
    /// Server-assigned identifier.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Category key/value labels.
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
}

/// VM entity from `vms/list` or `vms/{uuid}`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VmEntity {
    /// Metadata block.
    #[serde(default)]
    pub metadata: EntityMetadata,
    /// Desired specification.
    #[serde(default)]
    pub spec: Option<VmSpec>,
    /// Observed status.
    #[serde(default)]
    pub status: Option<VmStatus>,
}

/// Desired VM specification.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VmSpec {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Categories placed under the spec by some versions.
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
    /// Cluster the VM runs on.
    #[serde(default)]
    pub cluster_reference: Option<Reference>,
    /// Resource block.
    #[serde(default)]
    pub resources: Option<VmResources>,
}

/// Observed VM status.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VmStatus {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Cluster the VM runs on.
    #[serde(default)]
    pub cluster_reference: Option<Reference>,
    /// Resource block.
    #[serde(default)]
    pub resources: Option<VmResources>,
}

/// VM resources shared by spec and status.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VmResources {
    /// `ON`, `OFF`, or another transitional value.
    #[serde(default)]
    pub power_state: Option<String>,
    /// Socket count.
    #[serde(default)]
    pub num_sockets: Option<u32>,
    /// vCPUs per socket.
    #[serde(default)]
    pub num_vcpus_per_socket: Option<u32>,
    /// Memory in MiB.
    #[serde(default)]
    pub memory_size_mib: Option<u64>,
    /// Attached disks.
    #[serde(default)]
    pub disk_list: Vec<DiskEntry>,
}

/// Entry in a VM's disk list.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DiskEntry {
    /// Device properties.
    #[serde(default)]
    pub device_properties: Option<DeviceProperties>,
    /// Volume group backing this disk, if any.
    #[serde(default)]
    pub volume_group_reference: Option<Reference>,
}

/// Disk device properties.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeviceProperties {
    /// `DISK`, `CDROM`, `VOLUME_GROUP`, and so on.
    #[serde(default)]
    pub device_type: Option<String>,
}

/// Volume group entity from `volume_groups/list`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VolumeGroupEntity {
    /// Metadata block.
    #[serde(default)]
    pub metadata: EntityMetadata,
    /// Desired specification.
    #[serde(default)]
    pub spec: Option<VolumeGroupBody>,
    /// Observed status.
    #[serde(default)]
    pub status: Option<VolumeGroupBody>,
}

/// Spec or status block of a volume group.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VolumeGroupBody {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Resource block.
    #[serde(default)]
    pub resources: Option<VolumeGroupResources>,
}

/// Volume group resources.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VolumeGroupResources {
    /// Current VM attachments.
    #[serde(default)]
    pub attachment_list: Vec<VolumeGroupAttachment>,
}

/// One VM attachment of a volume group.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VolumeGroupAttachment {
    /// Attached VM.
    #[serde(default)]
    pub vm_reference: Option<Reference>,
}

/// Cluster entity from `clusters/{uuid}`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClusterEntity {
    /// Desired specification.
    #[serde(default)]
    pub spec: Option<ClusterBody>,
    /// Observed status.
    #[serde(default)]
    pub status: Option<ClusterBody>,
}

/// Spec or status block of a cluster.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClusterBody {
    /// Resource block.
    #[serde(default)]
    pub resources: Option<ClusterResources>,
}

/// Cluster resources.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClusterResources {
    /// Network configuration.
    #[serde(default)]
    pub network: Option<ClusterNetwork>,
}

/// Cluster network configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClusterNetwork {
    /// Cluster virtual IP.
    #[serde(default)]
    pub external_ip: Option<String>,
    /// Data-services IP used for iSCSI.
    #[serde(default)]
    pub external_data_services_ip: Option<String>,
}

impl ClusterEntity {
    /// Returns the first non-empty management address, in priority order:
    /// spec external IP, status external IP, spec data-services IP, status
    /// data-services IP.
    #[must_use]
    pub fn management_address(&self) -> Option<String> {
        fn network(body: Option<&ClusterBody>) -> Option<&ClusterNetwork> {
            body.and_then(|inner| inner.resources.as_ref())
                .and_then(|resources| resources.network.as_ref())
        }

        let spec = network(self.spec.as_ref());
        let status = network(self.status.as_ref());

        [
            spec.and_then(|net| net.external_ip.as_deref()),
            status.and_then(|net| net.external_ip.as_deref()),
            spec.and_then(|net| net.external_data_services_ip.as_deref()),
            status.and_then(|net| net.external_data_services_ip.as_deref()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|address| !address.is_empty())
        .map(str::to_owned)
    }
}
