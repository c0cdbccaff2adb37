//! Prism Central HTTP transport.
//!
//! Every API interaction flows through the [`Transport`] trait so the
//! reconciliation engine can be driven by the real [`PrismClient`] or by the
//! scripted transport in [`crate::test_support`]. The transport performs the
//! call and hands back the raw body; interpreting it is the caller's job.

mod client;
mod error;
mod response;
pub mod types;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

pub use client::{PRISM_PORT, PrismClient, REQUEST_ID_HEADER};
pub use error::PrismError;
pub use response::{ApiResponse, Envelope};

/// Future returned by [`Transport::call`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ApiResponse, PrismError>> + Send + 'a>>;

/// HTTP verbs used against the management plane.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// Read a resource.
    Get,
    /// List resources or trigger an action.
    Post,
    /// Replace a resource specification.
    Put,
    /// Remove a resource.
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(verb)
    }
}

/// Which management endpoint a request is addressed to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    /// The configured Prism Central endpoint.
    Central,
    /// A per-cluster management address reached directly on port 9440.
    Cluster(String),
}

/// A single API call.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// Endpoint receiving the call.
    pub target: Target,
    /// HTTP verb.
    pub method: Method,
    /// Path relative to the endpoint root, starting with `/`.
    pub path: String,
    /// Optional JSON body.
    pub body: Option<Value>,
    /// Whether the call changes server state and needs a request id.
    pub mutating: bool,
}

impl ApiRequest {
    /// Builds a read-only GET against Prism Central.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            target: Target::Central,
            method: Method::Get,
            path: path.into(),
            body: None,
            mutating: false,
        }
    }

    /// Builds a list POST; list calls do not mutate and carry no request id.
    #[must_use]
    pub fn list(path: impl Into<String>, body: Value) -> Self {
        Self {
            target: Target::Central,
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            mutating: false,
        }
    }

    /// Builds an action POST.
    #[must_use]
    pub fn action(path: impl Into<String>, body: Value) -> Self {
        Self {
            target: Target::Central,
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            mutating: true,
        }
    }

    /// Builds a full-replacement PUT.
    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            target: Target::Central,
            method: Method::Put,
            path: path.into(),
            body: Some(body),
            mutating: true,
        }
    }

    /// Builds a DELETE.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            target: Target::Central,
            method: Method::Delete,
            path: path.into(),
            body: None,
            mutating: true,
        }
    }

    /// Redirects the request to a per-cluster management address.
    #[must_use]
    pub fn on_cluster(mut self, address: impl Into<String>) -> Self {
        self.target = Target::Cluster(address.into());
        self
    }
}

/// Minimal interface for issuing management-plane calls.
pub trait Transport: Send + Sync {
    /// Performs the call and returns the status and raw body.
    ///
    /// Only connection-level failures are errors; HTTP error statuses are
    /// returned as responses so callers can read the error body.
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a>;
}

impl fmt::Debug for dyn Transport + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Transport")
    }
}
