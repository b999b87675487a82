use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName};

use crate::error::{OrchestratorError, Result};
use crate::models::ForwarderConfig;

use super::orchestrator::Orchestrator;

/// Request headers never copied to the upstream. Cookies and bearer tokens
/// belong to the gateway session and must not reach user code.
const SKIPPED_HEADERS: [HeaderName; 11] = [
    header::AUTHORIZATION,
    header::COOKIE,
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMethod {
    Get,
    Post,
}

impl ForwardMethod {
    /// Only GET and POST are forwarded.
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

/// Upstream response relayed verbatim.
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Proxies single requests into running microservices.
pub struct Forwarder {
    orchestrator: Arc<Orchestrator>,
    client: reqwest::Client,
    upstream_host: String,
}

impl Forwarder {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &ForwarderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| OrchestratorError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            orchestrator,
            client,
            upstream_host: config.upstream_host.clone(),
        })
    }

    pub fn target_url(&self, host_port: u16, query: Option<&str>) -> String {
        match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("http://{}:{host_port}/?{q}", self.upstream_host),
            None => format!("http://{}:{host_port}/", self.upstream_host),
        }
    }

    /// Send one request to the root handler of `name`.
    ///
    /// The endpoint is resolved from live engine state on every call.
    pub async fn forward(
        &self,
        name: &str,
        method: ForwardMethod,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedResponse> {
        let status = self.orchestrator.status(name).await?;
        if !status.running {
            return Err(OrchestratorError::NotRunning(name.to_string()));
        }
        let host_port = status
            .host_port
            .ok_or_else(|| OrchestratorError::PortUnavailable(name.to_string()))?;

        let url = self.target_url(host_port, query);
        tracing::debug!(name, %url, ?method, "forwarding request");

        let mut request = self
            .client
            .request(method.as_reqwest(), &url)
            .headers(forwardable_headers(headers));
        if method == ForwardMethod::Post {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OrchestratorError::UpstreamUnreachable {
                detail: format!("{url}: {e}"),
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| OrchestratorError::UpstreamUnreachable {
                detail: format!("{url}: reading body: {e}"),
            })?;

        Ok(ForwardedResponse {
            status,
            content_type,
            body,
        })
    }
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in SKIPPED_HEADERS.iter() {
        out.remove(name);
    }
    out.remove("keep-alive");
    out
}
