//! Typed VM, volume group, and attachment-target entities.

use serde::{Deserialize, Serialize};

use crate::prism::types::{DiskEntry, VmEntity, VolumeGroupEntity};

/// Category keys that may carry the Kubernetes cluster name, in lookup order.
pub const CLUSTER_TAG_KEYS: [&str; 2] = ["KubernetesClusterName", "kubernetes_cluster_name"];

/// Power state reported for a VM.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    /// Running.
    On,
    /// Powered off.
    Off,
    /// Transitional or unrecognised state, kept verbatim.
    Other(String),
}

impl PowerState {
    /// Parses a raw power state, case-insensitively.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(state) if state.eq_ignore_ascii_case("ON") => Self::On,
            Some(state) if state.eq_ignore_ascii_case("OFF") => Self::Off,
            Some(state) => Self::Other(state.to_owned()),
            None => Self::Other(String::from("UNKNOWN")),
        }
    }

    /// Returns the state as displayed to operators.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Other(state) => state.as_str(),
        }
    }
}

/// Read-only snapshot of a VM.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualMachine {
    /// Server-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current power state.
    pub power_state: PowerState,
    /// Kubernetes cluster name from the first tag location that has one.
    pub cluster_tag: Option<String>,
    /// Volume groups referenced by the VM's disk list, in disk order.
    pub volume_group_ids: Vec<String>,
    /// Cluster the VM runs on.
    pub cluster_id: Option<String>,
    /// Total vCPUs, when reported.
    pub vcpus: Option<u32>,
    /// Memory in MiB, when reported.
    pub memory_mib: Option<u64>,
}

impl VirtualMachine {
    /// Builds a VM from its wire entity. Entities without a uuid are
    /// rejected.
    #[must_use]
    pub fn from_entity(entity: &VmEntity) -> Option<Self> {
        let id = entity
            .metadata
            .uuid
            .as_deref()
            .map(str::trim)
            .filter(|uuid| !uuid.is_empty())?
            .to_owned();

        let spec = entity.spec.as_ref();
        let status = entity.status.as_ref();
        let spec_resources = spec.and_then(|inner| inner.resources.as_ref());
        let status_resources = status.and_then(|inner| inner.resources.as_ref());

        let name = spec
            .and_then(|inner| inner.name.clone())
            .or_else(|| status.and_then(|inner| inner.name.clone()))
            .unwrap_or_else(|| id.clone());

        let power_state = PowerState::parse(
            status_resources
                .and_then(|resources| resources.power_state.as_deref())
                .or_else(|| spec_resources.and_then(|resources| resources.power_state.as_deref())),
        );

        let disks = spec_resources
            .map(|resources| resources.disk_list.as_slice())
            .filter(|disks| !disks.is_empty())
            .or_else(|| status_resources.map(|resources| resources.disk_list.as_slice()))
            .unwrap_or_default();
        let mut volume_group_ids: Vec<String> = Vec::new();
        for vg_id in disks.iter().filter_map(volume_group_of) {
            if !volume_group_ids.contains(&vg_id) {
                volume_group_ids.push(vg_id);
            }
        }

        let cluster_id = spec
            .and_then(|inner| inner.cluster_reference.as_ref())
            .or_else(|| status.and_then(|inner| inner.cluster_reference.as_ref()))
            .and_then(|reference| reference.uuid.clone());

        let resources = spec_resources.or(status_resources);
        let vcpus = resources.and_then(|res| {
            res.num_sockets
                .map(|sockets| sockets.saturating_mul(res.num_vcpus_per_socket.unwrap_or(1)))
        });

        Some(Self {
            id,
            name,
            power_state,
            cluster_tag: cluster_tag_of(entity),
            volume_group_ids,
            cluster_id,
            vcpus,
            memory_mib: resources.and_then(|res| res.memory_size_mib),
        })
    }

    /// Returns `true` when the VM is powered off.
    #[must_use]
    pub fn is_powered_off(&self) -> bool {
        self.power_state == PowerState::Off
    }
}

/// Reads the cluster tag from metadata then spec categories, trying each key
/// variant in turn. The first non-empty value wins.
fn cluster_tag_of(entity: &VmEntity) -> Option<String> {
    let metadata = Some(&entity.metadata.categories);
    let spec = entity.spec.as_ref().map(|inner| &inner.categories);

    [metadata, spec]
        .into_iter()
        .flatten()
        .flat_map(|categories| CLUSTER_TAG_KEYS.iter().map(move |key| categories.get(*key)))
        .flatten()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_owned)
}

fn volume_group_of(disk: &DiskEntry) -> Option<String> {
    let is_cdrom = disk
        .device_properties
        .as_ref()
        .and_then(|props| props.device_type.as_deref())
        .is_some_and(|device| device.eq_ignore_ascii_case("CDROM"));
    if is_cdrom {
        return None;
    }
    disk.volume_group_reference
        .as_ref()
        .and_then(|reference| reference.uuid.as_deref())
        .map(str::trim)
        .filter(|uuid| !uuid.is_empty())
        .map(str::to_owned)
}

/// Snapshot of a volume group and its current attachments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeGroup {
    /// Server-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Identifiers of VMs the group is attached to.
    pub attached_vm_ids: Vec<String>,
}

impl VolumeGroup {
    /// Builds a volume group from its wire entity. Entities without a uuid
    /// are rejected.
    #[must_use]
    pub fn from_entity(entity: &VolumeGroupEntity) -> Option<Self> {
        let id = entity
            .metadata
            .uuid
            .as_deref()
            .map(str::trim)
            .filter(|uuid| !uuid.is_empty())?
            .to_owned();

        let bodies = [entity.status.as_ref(), entity.spec.as_ref()];
        let name = bodies
            .iter()
            .flatten()
            .find_map(|body| body.name.clone())
            .unwrap_or_default();

        let attached_vm_ids = bodies
            .iter()
            .flatten()
            .filter_map(|body| body.resources.as_ref())
            .map(|resources| {
                resources
                    .attachment_list
                    .iter()
                    .filter_map(|attachment| attachment.vm_reference.as_ref())
                    .filter_map(|reference| reference.uuid.clone())
                    .collect::<Vec<_>>()
            })
            .find(|ids| !ids.is_empty())
            .unwrap_or_default();

        Some(Self {
            id,
            name,
            attached_vm_ids,
        })
    }

    /// Returns `true` when the name follows the persistent-volume-claim
    /// naming convention.
    ///
    /// This is a heuristic: a group created for a claim but renamed by hand
    /// will not match.
    #[must_use]
    pub fn is_managed(&self, pvc_prefix: &str) -> bool {
        !pvc_prefix.is_empty() && self.name.starts_with(pvc_prefix)
    }

    /// Returns `true` when no VM is attached.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.attached_vm_ids.is_empty()
    }
}

/// Unit of work: one volume group and the VM it was found attached to.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AttachmentTarget {
    /// Volume group identifier.
    #[serde(rename = "uuid")]
    pub volume_group_id: String,
    /// Volume group name.
    #[serde(rename = "name")]
    pub volume_group_name: String,
    /// Identifier of the VM the group was attached to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_vm: Option<String>,
    /// Name of the VM the group was attached to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_vm_name: Option<String>,
}

impl AttachmentTarget {
    /// Creates a target for a group attached to a known VM.
    #[must_use]
    pub fn new(volume_group: &VolumeGroup, vm: &VirtualMachine) -> Self {
        Self {
            volume_group_id: volume_group.id.clone(),
            volume_group_name: volume_group.name.clone(),
            attached_vm: Some(vm.id.clone()),
            attached_vm_name: Some(vm.name.clone()),
        }
    }

    /// Returns a `name (id)` label for log lines.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} ({})", self.volume_group_name, self.volume_group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn vm_entity(value: &serde_json::Value) -> VmEntity {
        serde_json::from_value(value.clone()).expect("vm entity")
    }

    #[rstest]
    #[case(Some("ON"), PowerState::On)]
    #[case(Some("off"), PowerState::Off)]
    #[case(Some("PAUSED"), PowerState::Other(String::from("PAUSED")))]
    #[case(None, PowerState::Other(String::from("UNKNOWN")))]
    fn power_state_parses_raw_values(#[case] raw: Option<&str>, #[case] expected: PowerState) {
        assert_eq!(PowerState::parse(raw), expected);
    }

    #[rstest]
    #[case(json!({"metadata": {"categories": {"KubernetesClusterName": "a"}}}), Some("a"))]
    #[case(json!({"metadata": {"categories": {"kubernetes_cluster_name": "b"}}}), Some("b"))]
    #[case(json!({"spec": {"categories": {"KubernetesClusterName": "c"}}}), Some("c"))]
    #[case(json!({"spec": {"categories": {"kubernetes_cluster_name": "d"}}}), Some("d"))]
    #[case(
        json!({
            "metadata": {"categories": {"KubernetesClusterName": " "}},
            "spec": {"categories": {"kubernetes_cluster_name": "e"}}
        }),
        Some("e")
    )]
    #[case(
        json!({
            "metadata": {"categories": {"kubernetes_cluster_name": "first"}},
            "spec": {"categories": {"KubernetesClusterName": "second"}}
        }),
        Some("first")
    )]
    #[case(json!({"metadata": {"categories": {"Project": "x"}}}), None)]
    fn cluster_tag_follows_location_priority(
        #[case] mut raw: serde_json::Value,
        #[case] expected: Option<&str>,
    ) {
        raw["metadata"]["uuid"] = json!("vm-1");
        let vm = VirtualMachine::from_entity(&vm_entity(&raw)).expect("vm");
        assert_eq!(vm.cluster_tag.as_deref(), expected);
    }

    #[test]
    fn vm_collects_volume_group_disks_only() {
        let raw = json!({
            "metadata": {"uuid": "vm-1"},
            "spec": {
                "name": "worker-0",
                "cluster_reference": {"kind": "cluster", "uuid": "cl-1"},
                "resources": {
                    "num_sockets": 2,
                    "num_vcpus_per_socket": 2,
                    "memory_size_mib": 8192,
                    "disk_list": [
                        {"device_properties": {"device_type": "DISK"}},
                        {"device_properties": {"device_type": "CDROM"},
                         "volume_group_reference": {"uuid": "vg-iso"}},
                        {"volume_group_reference": {"kind": "volume_group", "uuid": "vg-1"}},
                        {"device_properties": {"device_type": "DISK"},
                         "volume_group_reference": {"uuid": "vg-1"}}
                    ]
                }
            },
            "status": {"resources": {"power_state": "OFF"}}
        });
        let vm = VirtualMachine::from_entity(&vm_entity(&raw)).expect("vm");

        assert_eq!(vm.name, "worker-0");
        assert!(vm.is_powered_off());
        assert_eq!(vm.volume_group_ids, vec![String::from("vg-1")]);
        assert_eq!(vm.cluster_id.as_deref(), Some("cl-1"));
        assert_eq!(vm.vcpus, Some(4));
        assert_eq!(vm.memory_mib, Some(8192));
    }

    #[test]
    fn vm_without_uuid_is_rejected() {
        assert!(VirtualMachine::from_entity(&vm_entity(&json!({"spec": {"name": "x"}}))).is_none());
    }

    #[test]
    fn volume_group_reads_status_attachments() {
        let entity: VolumeGroupEntity = serde_json::from_value(json!({
            "metadata": {"uuid": "vg-1"},
            "spec": {"name": "pvc-abc"},
            "status": {"resources": {"attachment_list": [
                {"vm_reference": {"kind": "vm", "uuid": "vm-1"}}
            ]}}
        }))
        .expect("vg entity");
        let group = VolumeGroup::from_entity(&entity).expect("vg");

        assert_eq!(group.name, "pvc-abc");
        assert_eq!(group.attached_vm_ids, vec![String::from("vm-1")]);
        assert!(group.is_managed("pvc-"));
        assert!(!group.is_managed(""));
        assert!(!group.is_detached());
    }

    #[test]
    fn attachment_target_serialises_with_short_keys() {
        let target = AttachmentTarget {
            volume_group_id: String::from("vg-1"),
            volume_group_name: String::from("pvc-a"),
            attached_vm: None,
            attached_vm_name: None,
        };
        let rendered = serde_json::to_string(&target).expect("serialise");
        assert_eq!(rendered, r#"{"uuid":"vg-1","name":"pvc-a"}"#);
    }
}
