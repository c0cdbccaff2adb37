//! `reqwest`-backed transport for Prism Central and per-cluster endpoints.

use std::net::Ipv6Addr;
use std::time::Duration;

use reqwest::Url;
use tracing::debug;
use uuid::Uuid;

use super::{ApiRequest, ApiResponse, Method, PrismError, Target, Transport, TransportFuture};

/// Port the management plane listens on, for Prism Central and Prism Element
/// alike.
pub const PRISM_PORT: u16 = 9440;

/// Header carrying the per-call idempotency token on mutating requests.
pub const REQUEST_ID_HEADER: &str = "NTNX-Request-Id";

/// Authenticated HTTPS client for the management plane.
///
/// Certificate validation is disabled because management endpoints ship with
/// self-signed certificates.
#[derive(Clone, Debug)]
pub struct PrismClient {
    http: reqwest::Client,
    endpoint: Url,
    username: String,
    password: String,
}

impl PrismClient {
    /// Builds a client for `endpoint` using basic authentication.
    ///
    /// A bare host name is expanded to `https://<host>:9440`.
    ///
    /// # Errors
    ///
    /// Returns [`PrismError::InvalidEndpoint`] when the endpoint cannot be
    /// parsed, or [`PrismError::Client`] when the TLS client cannot be built.
    pub fn new(
        endpoint: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PrismError> {
        let parsed = normalise_endpoint(endpoint)?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|err| PrismError::Client(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: parsed,
            username: username.into(),
            password: password.into(),
        })
    }

    /// Returns the normalised Prism Central base URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        match &request.target {
            Target::Central => format!(
                "{}{}",
                self.endpoint.as_str().trim_end_matches('/'),
                request.path
            ),
            Target::Cluster(address) => match address.parse::<Ipv6Addr>() {
                Ok(v6) => format!("https://[{v6}]:{PRISM_PORT}{}", request.path),
                Err(_) => format!("https://{address}:{PRISM_PORT}{}", request.path),
            },
        }
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, PrismError> {
        let url = self.url_for(request);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json");
        if request.mutating {
            builder = builder.header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, %url, "sending request");
        let transport_error = |err: reqwest::Error| PrismError::Transport {
            method: request.method.to_string(),
            path: request.path.clone(),
            message: err.to_string(),
        };
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        debug!(method = %request.method, %url, status, body = %body, "received response");

        Ok(ApiResponse::new(status, body))
    }
}

impl Transport for PrismClient {
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        Box::pin(self.execute(request))
    }
}

fn normalise_endpoint(raw: &str) -> Result<Url, PrismError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let candidate = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}:{PRISM_PORT}")
    };

    let url = Url::parse(&candidate).map_err(|err| PrismError::InvalidEndpoint {
        endpoint: raw.to_owned(),
        message: err.to_string(),
    })?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(PrismError::InvalidEndpoint {
            endpoint: raw.to_owned(),
            message: String::from("endpoint has no host"),
        });
    }
    Ok(url)
}
