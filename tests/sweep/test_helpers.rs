//! Shared fixtures for sweep BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::fixture;
use tempfile::TempDir;
use vgsweep::prism::Method;
use vgsweep::test_support::ScriptedTransport;
use vgsweep::{DeletionRetrier, SweepOutcome, SweepSettings};

/// Volume group identifier used by every scenario.
pub const VOLUME_GROUP_ID: &str = "vg-1";

/// Attached VM identifier used by every scenario.
pub const VM_ID: &str = "vm-1";

#[derive(Clone, Debug)]
pub enum SweepResult {
    Finished(SweepOutcome),
    Failed(String),
}

/// A reply queued for the scripted API, replayed in order once the run starts.
#[derive(Clone, Debug)]
pub struct ScriptedReply {
    pub status: u16,
    pub body: String,
}

/// A request the run sent, captured after it finishes.
#[derive(Clone, Debug)]
pub struct SentCall {
    pub method: Method,
    pub path: String,
    pub mutating: bool,
}

impl SentCall {
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Clone, Debug)]
pub struct SweepContext {
    pub script: Vec<ScriptedReply>,
    pub sent: Vec<SentCall>,
    pub worklist: Utf8PathBuf,
    pub outcome: Option<SweepResult>,
    _workdir: Arc<TempDir>,
}

impl SweepContext {
    /// Queues a reply with `status` and `body`.
    pub fn reply(mut self, status: u16, body: impl Into<String>) -> Self {
        self.script.push(ScriptedReply {
            status,
            body: body.into(),
        });
        self
    }

    /// Queues a 200 reply carrying `body` as JSON.
    pub fn reply_json(self, body: &serde_json::Value) -> Self {
        self.reply(200, body.to_string())
    }

    /// Builds a transport replaying the queued replies.
    pub fn transport(&self) -> ScriptedTransport {
        let api = ScriptedTransport::new();
        for reply in &self.script {
            api.push(reply.status, reply.body.clone());
        }
        api
    }

    /// Records what `api` received.
    pub fn capture(&mut self, api: &ScriptedTransport) {
        self.sent = api
            .requests()
            .into_iter()
            .map(|request| SentCall {
                method: request.method,
                path: request.path,
                mutating: request.mutating,
            })
            .collect();
    }
}

#[fixture]
pub fn sweep_context() -> SweepContext {
    let workdir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let worklist = Utf8PathBuf::from_path_buf(workdir.path().join("detached.jsonl"))
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    SweepContext {
        script: Vec::new(),
        sent: Vec::new(),
        worklist,
        outcome: None,
        _workdir: Arc::new(workdir),
    }
}

/// Settings with every pause removed so scenarios run instantly.
pub fn instant_settings() -> SweepSettings {
    SweepSettings {
        inter_target_delay: Duration::ZERO,
        post_detach_wait: Duration::ZERO,
        retrier: DeletionRetrier::new(3, Vec::new()),
        ..SweepSettings::default()
    }
}
