//! Raw responses and the loosely-shaped envelope shared by every API
//! generation.
//!
//! The management plane reports success and failure in several incompatible
//! shapes depending on the API generation. [`Envelope`] decodes the union of
//! the fields we care about once, so detach and delete strategies can ask
//! typed questions instead of probing JSON by hand.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Status code and body of a completed HTTP exchange.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body, possibly empty.
    pub body: String,
}

impl ApiResponse {
    /// Creates a response from its parts.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns `true` when the body carries nothing but whitespace.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Parses the body as JSON, returning `None` for empty or non-JSON bodies.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }

    /// Decodes the shared envelope. Empty or non-JSON bodies yield an empty
    /// envelope.
    #[must_use]
    pub fn envelope(&self) -> Envelope {
        if self.is_empty() {
            return Envelope::default();
        }
        serde_json::from_str(&self.body).unwrap_or_default()
    }

    /// Returns the error text carried by the body or, failing that, a
    /// description of a non-2xx status.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.envelope().error_message().or_else(|| {
            (!self.is_success()).then(|| format!("HTTP {}", self.status))
        })
    }
}

/// Union of the status, data, and error fields used across API generations.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Envelope {
    /// Primary-generation status block.
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<StatusBlock>,
    /// Bare state field used by some task responses.
    #[serde(default)]
    pub state: Option<String>,
    /// Newer-generation payload.
    #[serde(default)]
    pub data: Option<Value>,
    /// Resource metadata echoed back by updates.
    #[serde(default, deserialize_with = "lenient")]
    pub metadata: Option<EnvelopeMetadata>,
    /// Primary-generation error list.
    #[serde(default, deserialize_with = "lenient_list")]
    pub message_list: Vec<MessageEntry>,
    /// Flat error message.
    #[serde(default)]
    pub message: Option<Value>,
    /// Error given as a string or an object with a message.
    #[serde(default)]
    pub error: Option<Value>,
    /// Legacy-generation error detail.
    #[serde(default)]
    pub error_detail: Option<String>,
    /// Legacy-generation task marker.
    #[serde(default)]
    pub task_uuid: Option<String>,
    /// Legacy-generation boolean or value result.
    #[serde(default)]
    pub value: Option<Value>,
}

/// Status block of a primary-generation response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StatusBlock {
    /// Lifecycle state, for example `COMPLETE` or `SUCCEEDED`.
    #[serde(default)]
    pub state: Option<String>,
    /// Errors reported inside the status block.
    #[serde(default, deserialize_with = "lenient_list")]
    pub message_list: Vec<MessageEntry>,
    /// Task context for asynchronous operations.
    #[serde(default)]
    pub execution_context: Option<ExecutionContext>,
}

/// Task context attached to an asynchronous response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExecutionContext {
    /// Identifier of the task tracking the operation.
    #[serde(default)]
    pub task_uuid: Option<Value>,
}

/// Metadata echoed back for an updated resource.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EnvelopeMetadata {
    /// Identifier of the resource.
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Entry of a `message_list` array.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessageEntry {
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Machine-readable reason.
    #[serde(default)]
    pub reason: Option<String>,
}

impl Envelope {
    /// Returns the reported state, preferring the status block.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.state.as_deref())
            .or(self.state.as_deref())
    }

    /// Returns `true` when the state explicitly reports completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state().is_some_and(|state| {
            state.eq_ignore_ascii_case("COMPLETE") || state.eq_ignore_ascii_case("SUCCEEDED")
        })
    }

    /// Returns the identifier carried by a newer-generation `data` block,
    /// usually the task tracking the operation.
    #[must_use]
    pub fn data_identifier(&self) -> Option<String> {
        let data = self.data.as_ref()?;
        if data.get("error").is_some() {
            return None;
        }
        ["extId", "ext_id", "uuid"]
            .iter()
            .find_map(|key| data.get(*key).and_then(value_text))
    }

    /// Returns `true` when the body carries a legacy task or value marker.
    #[must_use]
    pub fn has_task_marker(&self) -> bool {
        self.task_uuid.as_deref().is_some_and(|task| !task.is_empty())
            || self.value.as_ref().is_some_and(|value| !value.is_null())
            || self
                .status
                .as_ref()
                .and_then(|status| status.execution_context.as_ref())
                .and_then(|context| context.task_uuid.as_ref())
                .is_some_and(|task| !task.is_null())
    }

    /// Returns the resource identifier echoed in `metadata.uuid`.
    #[must_use]
    pub fn echoed_uuid(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.uuid.as_deref())
            .filter(|uuid| !uuid.is_empty())
    }

    /// Returns the first non-empty error message found in any known error
    /// location.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let from_list = |entries: &[MessageEntry]| {
            entries.iter().find_map(|entry| {
                entry
                    .message
                    .clone()
                    .or_else(|| entry.reason.clone())
                    .filter(|text| !text.trim().is_empty())
            })
        };

        from_list(&self.message_list)
            .or_else(|| {
                self.status
                    .as_ref()
                    .and_then(|status| from_list(&status.message_list))
            })
            .or_else(|| self.message.as_ref().and_then(value_text))
            .or_else(|| self.error.as_ref().and_then(error_text))
            .or_else(|| {
                self.data
                    .as_ref()
                    .and_then(|data| data.get("error"))
                    .and_then(error_text)
            })
            .or_else(|| self.error_detail.clone().filter(|text| !text.trim().is_empty()))
    }
}

/// Decodes a field that some API generations fill with an unrelated shape;
/// anything that does not fit becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).ok())
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(error_text),
        Value::Object(map) => map.get("message").and_then(value_text),
        other => value_text(other),
    }
}
