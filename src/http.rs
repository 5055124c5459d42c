use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::error::{Result, VaultError};
use crate::request::RequestSpec;

/// What was actually sent, echoed back with the response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEcho {
    pub method: String,
    /// Path and query as seen on the wire, e.g. `/v1/sys/health?standbyok=true`.
    pub path: String,
}

/// Full response envelope. Every status is data; nothing here is an error yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
    pub request: RequestEcho,
}

/// Sends a [`RequestSpec`] and returns the raw envelope.
///
/// Implementations must not fail on non-2xx statuses; only failures that
/// prevent a response from forming are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, spec: &RequestSpec) -> Result<RawResponse>;
}

/// [`Transport`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(skip_tls_verify: bool) -> Result<Self> {
        if skip_tls_verify {
            warn!("TLS certificate verification is disabled");
        }
        let client = Client::builder()
            .user_agent(concat!("vault-client/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()
            .map_err(VaultError::Transport)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, spec: &RequestSpec) -> Result<RawResponse> {
        let method = reqwest::Method::from_bytes(spec.method.as_str().as_bytes())
            .map_err(|_| VaultError::invalid_arguments(format!("bad method {}", spec.method)))?;

        debug!(method = %spec.method, uri = %spec.uri, "sending request");
        let mut req = self.client.request(method, spec.uri.as_str());
        for (name, value) in &spec.headers {
            req = req.header(name, value);
        }
        if !spec.body.is_empty() {
            trace!(keys = ?body_keys(&spec.body), "request body");
            req = req.json(&spec.body);
        }
        if let Some(timeout) = spec.timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await.map_err(VaultError::Transport)?;
        let status = resp.status().as_u16();
        let url = resp.url();
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let text = resp.text().await.map_err(VaultError::Transport)?;
        debug!(status, path = %path, "received response");

        Ok(RawResponse {
            status,
            body: parse_body(text),
            request: RequestEcho {
                method: spec.method.to_string(),
                path,
            },
        })
    }
}

/// Body values carry secrets; only the field names are logged.
fn body_keys(body: &Map<String, Value>) -> Vec<&str> {
    body.keys().map(String::as_str).collect()
}

fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
