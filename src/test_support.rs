//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::io;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde_json::{Value, json};
use tokio::sync::{Mutex, MutexGuard};

use crate::prism::{ApiRequest, ApiResponse, PrismError, Transport, TransportFuture};
use crate::sweep::Confirmation;

/// A queued reply: either a response or a transport-level failure.
#[derive(Clone, Debug)]
enum Reply {
    Response(ApiResponse),
    Failure(PrismError),
}

/// Scripted transport that returns pre-seeded responses in FIFO order.
///
/// Every request is recorded so tests can assert call order and payloads.
/// When the queue runs dry the call fails with a transport error.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    responses: Arc<StdMutex<VecDeque<Reply>>>,
    requests: Arc<StdMutex<Vec<ApiRequest>>>,
}

impl ScriptedTransport {
    /// Creates a transport with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response with the given status and body.
    pub fn push(&self, status: u16, body: impl Into<String>) {
        self.push_result(Ok(ApiResponse::new(status, body)));
    }

    /// Queues a 200 response carrying `body` as JSON.
    pub fn push_json(&self, body: &Value) {
        self.push(200, body.to_string());
    }

    /// Queues a transport-level failure such as a timeout.
    pub fn push_transport_error(&self, message: &str) {
        self.push_result(Err(PrismError::Transport {
            method: String::from("POST"),
            path: String::from("/scripted"),
            message: message.to_owned(),
        }));
    }

    /// Queues an explicit result.
    pub fn push_result(&self, result: Result<ApiResponse, PrismError>) {
        let reply = match result {
            Ok(response) => Reply::Response(response),
            Err(err) => Reply::Failure(err),
        };
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Returns a snapshot of every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `METHOD path` strings for each request, for compact assertions.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| format!("{} {}", request.method, request.path))
            .collect()
    }

    /// Returns the number of responses still queued.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for ScriptedTransport {
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let result = match next {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Failure(err)) => Err(err),
            None => Err(PrismError::Transport {
                method: request.method.to_string(),
                path: request.path.clone(),
                message: String::from("no scripted response available"),
            }),
        };
        Box::pin(async move { result })
    }
}

/// Confirmation double that always gives the same answer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FixedConfirmation {
    /// Answer returned for every prompt.
    pub answer: bool,
    /// Number of times the gate was consulted.
    pub asked: usize,
}

impl FixedConfirmation {
    /// Creates a confirmation that answers `answer`.
    #[must_use]
    pub const fn new(answer: bool) -> Self {
        Self { answer, asked: 0 }
    }
}

impl Confirmation for FixedConfirmation {
    fn confirm(&mut self) -> io::Result<bool> {
        self.asked += 1;
        Ok(self.answer)
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs, &[]).await
    }

    /// Sets `pairs` and removes `unset` while holding the global mutex.
    pub async fn apply(pairs: &[(&str, &str)], unset: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(unset.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + unset.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in unset {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Builds a v3 VM entity tagged with `cluster` and one disk per volume group.
#[must_use]
pub fn vm_json(
    id: &str,
    name: &str,
    power_state: &str,
    cluster: &str,
    volume_groups: &[&str],
) -> Value {
    let disks: Vec<Value> = volume_groups
        .iter()
        .map(|vg| {
            json!({
                "device_properties": {"device_type": "DISK"},
                "volume_group_reference": {"kind": "volume_group", "uuid": vg}
            })
        })
        .collect();
    json!({
        "metadata": {
            "uuid": id,
            "categories": {"KubernetesClusterName": cluster}
        },
        "spec": {
            "name": name,
            "cluster_reference": {"kind": "cluster", "uuid": "cluster-1"},
            "resources": {
                "num_sockets": 2,
                "num_vcpus_per_socket": 1,
                "memory_size_mib": 4096,
                "disk_list": disks
            }
        },
        "status": {
            "name": name,
            "resources": {"power_state": power_state}
        }
    })
}

/// Builds a v3 volume group entity attached to `attached_vms`.
#[must_use]
pub fn vg_json(id: &str, name: &str, attached_vms: &[&str]) -> Value {
    let attachments: Vec<Value> = attached_vms
        .iter()
        .map(|vm| json!({"vm_reference": {"kind": "vm", "uuid": vm}}))
        .collect();
    json!({
        "metadata": {"uuid": id},
        "spec": {"name": name},
        "status": {"name": name, "resources": {"attachment_list": attachments}}
    })
}

/// Wraps entities in a v3 list response body.
#[must_use]
pub fn list_json(entities: Vec<Value>) -> Value {
    let total = entities.len();
    json!({
        "entities": entities,
        "metadata": {"total_matches": total}
    })
}

/// Primary-generation task response reporting completion.
#[must_use]
pub fn complete_json() -> Value {
    json!({"status": {"state": "COMPLETE"}})
}

/// Primary-generation response carrying an error message.
#[must_use]
pub fn message_list_json(message: &str) -> Value {
    json!({"message_list": [{"message": message}]})
}
