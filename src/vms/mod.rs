//! Cluster VM report and powered-off VM cleanup for `vgsweep-vms`.
//!
//! Both commands read the same VM and volume group listings the sweep uses.
//! VM deletion refuses any VM that still holds a managed volume group so
//! persistent volumes are never removed together with their node.

use std::collections::BTreeMap;
use std::io::{self, Write};

use tracing::{info, warn};

use crate::inventory::{InventoryError, Resolver, VirtualMachine, VolumeGroup};
use crate::prism::{ApiRequest, Transport};

/// One cluster VM and the managed volume groups still attached to it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmEntry {
    /// VM snapshot.
    pub vm: VirtualMachine,
    /// Managed volume groups referenced by the VM or listing it as attached.
    pub volume_groups: Vec<VolumeGroup>,
}

impl VmEntry {
    /// Returns `true` when the VM can be deleted without losing a volume.
    #[must_use]
    pub fn is_deletable(&self) -> bool {
        self.vm.is_powered_off() && self.volume_groups.is_empty()
    }
}

/// VMs carrying a cluster tag, in listing order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterInventory {
    /// Kubernetes cluster name.
    pub cluster: String,
    /// Tagged VMs.
    pub vms: Vec<VmEntry>,
}

impl ClusterInventory {
    /// Lists the VMs tagged with `cluster` and their managed volume groups.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] when a list call fails or cannot be decoded.
    pub async fn load(
        resolver: &Resolver<'_>,
        cluster: &str,
        pvc_prefix: &str,
    ) -> Result<Self, InventoryError> {
        let tagged: Vec<VirtualMachine> = resolver
            .list_vms()
            .await?
            .into_iter()
            .filter(|vm| vm.cluster_tag.as_deref() == Some(cluster))
            .collect();
        let groups = if tagged.is_empty() {
            BTreeMap::new()
        } else {
            resolver.volume_group_index().await?
        };

        let vms = tagged
            .into_iter()
            .map(|vm| {
                let volume_groups = groups
                    .values()
                    .filter(|group| group.is_managed(pvc_prefix))
                    .filter(|group| {
                        vm.volume_group_ids.contains(&group.id)
                            || group.attached_vm_ids.contains(&vm.id)
                    })
                    .cloned()
                    .collect();
                VmEntry { vm, volume_groups }
            })
            .collect();
        Ok(Self {
            cluster: cluster.to_owned(),
            vms,
        })
    }

    /// Writes a tree of VMs and their volume groups.
    ///
    /// # Errors
    ///
    /// Returns any error raised by `out`.
    pub fn render_tree(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{} ({} VM(s))", self.cluster, self.vms.len())?;
        let mut entries = self.vms.iter().peekable();
        while let Some(entry) = entries.next() {
            let last = entries.peek().is_none();
            let (branch, stem) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            let vm = &entry.vm;
            let vcpus = vm.vcpus.map_or_else(|| String::from("?"), |count| count.to_string());
            let memory = vm
                .memory_mib
                .map_or_else(|| String::from("?"), |mib| format!("{mib} MiB"));
            writeln!(
                out,
                "{branch}{} [{}] vCPU {vcpus}, memory {memory}",
                vm.name,
                vm.power_state.as_str()
            )?;
            let mut groups = entry.volume_groups.iter().peekable();
            while let Some(group) = groups.next() {
                let leaf = if groups.peek().is_none() { "└── " } else { "├── " };
                writeln!(out, "{stem}{leaf}{} ({})", group.name, group.id)?;
            }
        }
        Ok(())
    }

    /// Powered-off VMs with no managed volume group left.
    #[must_use]
    pub fn deletable(&self) -> Vec<&VirtualMachine> {
        self.vms
            .iter()
            .filter(|entry| entry.is_deletable())
            .map(|entry| &entry.vm)
            .collect()
    }

    /// Powered-off VMs still holding managed volume groups.
    #[must_use]
    pub fn blocked(&self) -> Vec<&VmEntry> {
        self.vms
            .iter()
            .filter(|entry| entry.vm.is_powered_off() && !entry.volume_groups.is_empty())
            .collect()
    }
}

/// Result of a VM deletion pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VmDeleteSummary {
    /// VMs deleted.
    pub deleted: usize,
    /// `(VM name, error text)` for each failed delete.
    pub failures: Vec<(String, String)>,
}

/// Deletes each VM in turn. Failures are recorded, not propagated.
pub async fn delete_vms(api: &dyn Transport, vms: &[&VirtualMachine]) -> VmDeleteSummary {
    let mut summary = VmDeleteSummary::default();
    for vm in vms {
        let request = ApiRequest::delete(format!("/api/nutanix/v3/vms/{}", vm.id));
        let failure = match api.call(&request).await {
            Ok(response) => response.error_message(),
            Err(err) => Some(err.to_string()),
        };
        match failure {
            None => {
                info!(vm = %vm.name, id = %vm.id, "VM deleted");
                summary.deleted += 1;
            }
            Some(message) => {
                warn!(vm = %vm.name, id = %vm.id, error = %message, "VM delete failed");
                summary.failures.push((vm.name.clone(), message));
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, list_json, vg_json, vm_json};
    use rstest::{fixture, rstest};

    #[fixture]
    fn api() -> ScriptedTransport {
        let api = ScriptedTransport::new();
        api.push_json(&list_json(vec![
            vm_json("vm-1", "ctrl-0", "OFF", "mgmt", &[]),
            vm_json("vm-2", "worker-0", "OFF", "mgmt", &["vg-1"]),
            vm_json("vm-3", "worker-1", "ON", "mgmt", &[]),
            vm_json("vm-4", "other", "OFF", "prod", &[]),
        ]));
        api.push_json(&list_json(vec![
            vg_json("vg-1", "pvc-data", &["vm-2"]),
            vg_json("vg-2", "boot-disks", &["vm-1"]),
        ]));
        api
    }

    async fn inventory(api: &ScriptedTransport) -> ClusterInventory {
        let resolver = Resolver::new(api, 500, "pvc-");
        ClusterInventory::load(&resolver, "mgmt", "pvc-")
            .await
            .expect("inventory")
    }

    #[rstest]
    #[tokio::test]
    async fn only_unattached_powered_off_vms_are_deletable(api: ScriptedTransport) {
        let cluster = inventory(&api).await;

        let deletable: Vec<&str> = cluster.deletable().iter().map(|vm| vm.id.as_str()).collect();
        assert_eq!(deletable, vec!["vm-1"]);
        let blocked: Vec<&str> = cluster
            .blocked()
            .iter()
            .map(|entry| entry.vm.id.as_str())
            .collect();
        assert_eq!(blocked, vec!["vm-2"]);
    }

    #[rstest]
    #[tokio::test]
    async fn tree_lists_vms_and_managed_groups(api: ScriptedTransport) {
        let cluster = inventory(&api).await;
        let mut out = Vec::new();

        cluster.render_tree(&mut out).expect("render");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("mgmt (3 VM(s))\n"), "{text}");
        assert!(text.contains("├── worker-0 [OFF] vCPU 2, memory 4096 MiB"), "{text}");
        assert!(text.contains("│   └── pvc-data (vg-1)"), "{text}");
        assert!(text.contains("└── worker-1 [ON]"), "{text}");
        assert!(!text.contains("boot-disks"), "{text}");
    }

    #[tokio::test]
    async fn empty_cluster_skips_volume_group_listing() {
        let api = ScriptedTransport::new();
        api.push_json(&list_json(vec![vm_json("vm-4", "other", "OFF", "prod", &[])]));

        let cluster = inventory(&api).await;

        assert!(cluster.vms.is_empty());
        assert_eq!(api.requests().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn delete_records_failures_and_continues(api: ScriptedTransport) {
        let cluster = inventory(&api).await;
        let running = cluster
            .vms
            .iter()
            .find(|entry| entry.vm.id == "vm-3")
            .map(|entry| entry.vm.clone())
            .expect("vm-3");
        api.push(409, r#"{"message_list":[{"message":"VM is running"}]}"#);
        api.push(202, r#"{"status":{"state":"PENDING"}}"#);
        let deletable = cluster.deletable();
        let targets: Vec<&VirtualMachine> = std::iter::once(&running).chain(deletable).collect();

        let summary = delete_vms(&api, &targets).await;

        assert_eq!(summary.deleted, 1);
        assert_eq!(
            summary.failures,
            vec![(String::from("worker-1"), String::from("VM is running"))]
        );
        assert_eq!(
            api.calls().get(2..).map(<[String]>::to_vec),
            Some(vec![
                String::from("DELETE /api/nutanix/v3/vms/vm-3"),
                String::from("DELETE /api/nutanix/v3/vms/vm-1"),
            ])
        );
    }
}
