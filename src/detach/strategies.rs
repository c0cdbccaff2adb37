//! The five detach mechanisms, newest-compatible first.

use serde_json::{Map, Value, json};

use super::{Attempt, AttemptFuture, DetachRequest, DetachStrategy};
use crate::inventory::VirtualMachine;
use crate::prism::types::{ClusterEntity, VmEntity};
use crate::prism::{ApiRequest, ApiResponse, PrismError, Transport};

fn primary_detach_path(volume_group_id: &str) -> String {
    format!("/api/nutanix/v3/volume_groups/{volume_group_id}/detach")
}

fn vm_path(vm_id: &str) -> String {
    format!("/api/nutanix/v3/vms/{vm_id}")
}

/// Collapses a transport result into an [`Attempt`] using `succeeded` to
/// judge the response.
fn judge(
    result: Result<ApiResponse, PrismError>,
    succeeded: impl FnOnce(&ApiResponse) -> bool,
) -> Attempt {
    match result {
        Ok(response) if succeeded(&response) => Attempt::Detached,
        Ok(response) => Attempt::Failed(response.error_message()),
        Err(err) => Attempt::failed(err.to_string()),
    }
}

/// Accepted when the response is 2xx and either empty or free of any error
/// shape.
fn accepted_without_error(response: &ApiResponse) -> bool {
    response.is_success() && (response.is_empty() || response.envelope().error_message().is_none())
}

/// Primary generation, VM named as a single reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrimarySingleRef;

impl DetachStrategy for PrimarySingleRef {
    fn name(&self) -> &'static str {
        "v3-vm-reference"
    }

    fn attempt<'a>(
        &'a self,
        api: &'a dyn Transport,
        request: &'a DetachRequest,
    ) -> AttemptFuture<'a> {
        Box::pin(async move {
            let call = ApiRequest::action(
                primary_detach_path(&request.volume_group_id),
                json!({"vm_reference": {"kind": "vm", "uuid": request.vm_id}}),
            );
            judge(api.call(&call).await, |response| {
                response.envelope().is_complete()
            })
        })
    }
}

/// Primary generation, VM named in a one-element reference list.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrimaryListRef;

impl DetachStrategy for PrimaryListRef {
    fn name(&self) -> &'static str {
        "v3-vm-reference-list"
    }

    fn attempt<'a>(
        &'a self,
        api: &'a dyn Transport,
        request: &'a DetachRequest,
    ) -> AttemptFuture<'a> {
        Box::pin(async move {
            let call = ApiRequest::action(
                primary_detach_path(&request.volume_group_id),
                json!({"vm_reference_list": [{"kind": "vm", "uuid": request.vm_id}]}),
            );
            judge(api.call(&call).await, |response| {
                response.envelope().is_complete()
            })
        })
    }
}

/// Newer generation `$actions/detach-vm`.
///
/// Success is a task identifier in `data`, a non-empty 2xx body with no
/// error shape, or an empty 2xx body.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActionDetach;

impl DetachStrategy for ActionDetach {
    fn name(&self) -> &'static str {
        "v4-detach-vm"
    }

    fn attempt<'a>(
        &'a self,
        api: &'a dyn Transport,
        request: &'a DetachRequest,
    ) -> AttemptFuture<'a> {
        Box::pin(async move {
            let call = ApiRequest::action(
                format!(
                    "/api/storage/v4.0/config/volume-groups/{}/$actions/detach-vm",
                    request.volume_group_id
                ),
                json!({"extId": request.vm_id}),
            );
            judge(api.call(&call).await, |response| {
                response.envelope().data_identifier().is_some() || accepted_without_error(response)
            })
        })
    }
}

/// Legacy generation, sent directly to the VM's own cluster.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterDetach;

impl ClusterDetach {
    async fn management_address(
        api: &dyn Transport,
        vm_id: &str,
    ) -> Result<String, String> {
        let vm: VmEntity = get_json(api, &vm_path(vm_id)).await?;
        let cluster_id = VirtualMachine::from_entity(&vm)
            .and_then(|parsed| parsed.cluster_id)
            .ok_or_else(|| format!("VM {vm_id} has no cluster reference"))?;
        let cluster: ClusterEntity =
            get_json(api, &format!("/api/nutanix/v3/clusters/{cluster_id}")).await?;
        cluster
            .management_address()
            .ok_or_else(|| format!("cluster {cluster_id} reports no management address"))
    }
}

impl DetachStrategy for ClusterDetach {
    fn name(&self) -> &'static str {
        "v2-cluster"
    }

    fn attempt<'a>(
        &'a self,
        api: &'a dyn Transport,
        request: &'a DetachRequest,
    ) -> AttemptFuture<'a> {
        Box::pin(async move {
            let address = match Self::management_address(api, &request.vm_id).await {
                Ok(address) => address,
                Err(message) => return Attempt::Failed(Some(message)),
            };
            let call = ApiRequest::action(
                format!(
                    "/api/nutanix/v2.0/volume_groups/{}/detach",
                    request.volume_group_id
                ),
                json!({"vm_uuid": request.vm_id, "operation": "DETACH"}),
            )
            .on_cluster(address);
            judge(api.call(&call).await, |response| {
                response.is_success()
                    && (response.envelope().has_task_marker() || accepted_without_error(response))
            })
        })
    }
}

/// Last resort: rewrite the VM's disk list without the volume group.
///
/// Only attempted for powered-off VMs. The full specification is sent back
/// with the original metadata; the server rejects updates without it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskListEdit;

impl DiskListEdit {
    async fn run(api: &dyn Transport, request: &DetachRequest) -> Result<Attempt, String> {
        let path = vm_path(&request.vm_id);
        let raw: Value = get_json(api, &path).await?;

        let entity: VmEntity = serde_json::from_value(raw.clone())
            .map_err(|err| format!("unexpected VM payload: {err}"))?;
        let powered_off = VirtualMachine::from_entity(&entity)
            .is_some_and(|vm| vm.is_powered_off());
        if !powered_off {
            return Err(format!(
                "VM {} is not powered off; refusing to edit its disk list",
                request.vm_id
            ));
        }

        let payload = strip_volume_group(raw, &request.volume_group_id)?;
        let response = api
            .call(&ApiRequest::put(path, payload))
            .await
            .map_err(|err| err.to_string())?;
        if response.is_success() && response.envelope().echoed_uuid().is_some() {
            Ok(Attempt::Detached)
        } else {
            Ok(Attempt::Failed(response.error_message()))
        }
    }
}

impl DetachStrategy for DiskListEdit {
    fn name(&self) -> &'static str {
        "v3-disk-list-edit"
    }

    fn attempt<'a>(
        &'a self,
        api: &'a dyn Transport,
        request: &'a DetachRequest,
    ) -> AttemptFuture<'a> {
        Box::pin(async move {
            Self::run(api, request)
                .await
                .unwrap_or_else(|message| Attempt::Failed(Some(message)))
        })
    }
}

/// Builds the update payload: original metadata plus the specification with
/// every disk referencing `volume_group_id` removed. Unknown fields are kept.
fn strip_volume_group(raw: Value, volume_group_id: &str) -> Result<Value, String> {
    let Value::Object(mut entity) = raw else {
        return Err(String::from("VM payload is not an object"));
    };
    let metadata = entity
        .remove("metadata")
        .ok_or_else(|| String::from("VM payload has no metadata"))?;
    let mut spec = entity
        .remove("spec")
        .ok_or_else(|| String::from("VM payload has no spec"))?;

    let disks = spec
        .pointer_mut("/resources/disk_list")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| String::from("VM spec has no disk list"))?;
    let before = disks.len();
    disks.retain(|disk| {
        disk.pointer("/volume_group_reference/uuid")
            .and_then(Value::as_str)
            != Some(volume_group_id)
    });
    if disks.len() == before {
        return Err(format!(
            "volume group {volume_group_id} is not in the VM disk list"
        ));
    }

    let mut payload = Map::new();
    payload.insert(String::from("metadata"), metadata);
    payload.insert(String::from("spec"), spec);
    Ok(Value::Object(payload))
}

async fn get_json<T: serde::de::DeserializeOwned>(
    api: &dyn Transport,
    path: &str,
) -> Result<T, String> {
    let response = api
        .call(&ApiRequest::get(path))
        .await
        .map_err(|err| err.to_string())?;
    if !response.is_success() {
        return Err(response
            .error_message()
            .unwrap_or_else(|| format!("HTTP {}", response.status)));
    }
    serde_json::from_str(&response.body)
        .map_err(|err| format!("unexpected response from {path}: {err}"))
}
