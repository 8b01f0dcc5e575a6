//! HTTP transport shared by every service handler.
//!
//! This module provides the `Transport` struct: one HTTP session per
//! handler, an API root, mutable session headers, and the generic
//! "send, validate status code, fail on mismatch" request used by
//! the Quay, Nexus and SonarQube handlers alike.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use super::error::{ApiError, Error, Result};
use crate::config::{Credentials, ServiceConfig};

// ============================================================================
// Constants
// ============================================================================

/// Content type sent with every API request
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Accept header sent with every API request
const DEFAULT_ACCEPT: &str = "application/json, text/plain";

/// Timeout for the pre-flight reachability check
const CHECK_ONLINE_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// Request / response types
// ============================================================================

/// How a request payload is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadEncoding {
    /// Serialized JSON request body
    #[default]
    Json,
    /// URL query parameters (SonarQube web services)
    Query,
}

#[derive(Debug, Clone)]
pub enum Payload {
    /// Encoded according to the transport's `PayloadEncoding`
    Data(Value),
    /// Sent verbatim as a `text/plain` body
    Text(String),
}

/// Description of a single API call relative to the API root.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    endpoint: String,
    payload: Option<Payload>,
    query: Vec<(String, String)>,
    accepted: Vec<u16>,
}

impl RequestSpec {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            payload: None,
            query: Vec::new(),
            accepted: vec![200],
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn data(mut self, payload: Value) -> Self {
        self.payload = Some(Payload::Data(payload));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.payload = Some(Payload::Text(body.into()));
        self
    }

    /// Add a URL query parameter. Applied whatever the payload encoding
    /// is, and percent-encoded on the wire.
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Replace the accepted status codes (default is `[200]`)
    pub fn accept(mut self, codes: &[u16]) -> Self {
        self.accepted = codes.to_vec();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn accepted(&self) -> &[u16] {
        &self.accepted
    }
}

/// A fully read response. The body is buffered so it can be logged and
/// carried inside an `ApiError`.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    /// Fail with `ApiError` unless the status code is one of `accepted`
    pub fn ensure_accepted(self, accepted: &[u16]) -> Result<Self> {
        if accepted.contains(&self.status.as_u16()) {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body).into())
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// One HTTP session against one service.
///
/// The underlying client only exists between `open()` and `close()`;
/// requests issued outside that window fail with `Error::SessionClosed`.
pub struct Transport {
    service: &'static str,
    api_root: String,
    credentials: Credentials,
    basic_auth: bool,
    encoding: PayloadEncoding,
    headers: HeaderMap,
    timeout: Duration,
    accept_invalid_certs: bool,
    client: Option<Client>,
}

impl Transport {
    /// Create a closed transport rooted at `<base_url>/<base_endpoint>`
    pub fn new(service: &'static str, config: &ServiceConfig, base_endpoint: &str) -> Self {
        Self {
            service,
            api_root: config.api_root(base_endpoint),
            credentials: config.credentials.clone(),
            basic_auth: false,
            encoding: PayloadEncoding::Json,
            headers: HeaderMap::new(),
            timeout: config.timeout,
            accept_invalid_certs: config.accept_invalid_certs,
            client: None,
        }
    }

    /// Attach the login credentials as HTTP basic auth on every request
    pub fn with_basic_auth(mut self) -> Self {
        self.basic_auth = true;
        self
    }

    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    /// Start a session. Opening an already open transport keeps the
    /// existing client and headers.
    pub fn open(&mut self) -> Result<()> {
        if self.client.is_none() {
            debug!(service = self.service, "Creating new session");
            let client = Client::builder()
                .timeout(self.timeout)
                .danger_accept_invalid_certs(self.accept_invalid_certs)
                .build()?;
            self.client = Some(client);
        }
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
        );
        self.headers
            .insert(header::ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        Ok(())
    }

    /// Drop the client (and its pooled connections) and forget session
    /// headers. Idempotent.
    pub fn close(&mut self) {
        if self.client.take().is_some() {
            debug!(service = self.service, "Session closed");
        }
        self.headers.clear();
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeader(name.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidHeader(name.as_str().to_string()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or(Error::SessionClosed)
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_root, endpoint.trim_start_matches('/'))
    }

    /// Plain GET of a page outside the API root (no session headers).
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client()?.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        info!(service = self.service, url = url, status = status.as_u16(), "GET page");
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body).into());
        }
        Ok(body)
    }

    /// Send a request and buffer the response without judging its status.
    pub async fn send(&self, spec: &RequestSpec) -> Result<ApiResponse> {
        let client = self.client()?;
        let url = self.endpoint_url(spec.endpoint());

        let mut headers = self.headers.clone();
        if let Some(Payload::Text(_)) = spec.payload() {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        }

        let mut request = client.request(spec.method().clone(), &url).headers(headers);
        if !spec.query_params().is_empty() {
            request = request.query(spec.query_params());
        }
        if self.basic_auth {
            request = request.basic_auth(&self.credentials.username, Some(&self.credentials.password));
        }
        request = match (spec.payload(), self.encoding) {
            (Some(Payload::Data(data)), PayloadEncoding::Json) => request.json(data),
            (Some(Payload::Data(data)), PayloadEncoding::Query) => request.query(data),
            (Some(Payload::Text(body)), _) => request.body(body.clone()),
            (None, _) => request,
        };

        debug!(
            service = self.service,
            method = %spec.method(),
            url = %url,
            payload = ?spec.payload(),
            "Making API request"
        );

        let response = request.send().await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response.text().await?;

        info!(
            service = self.service,
            method = %spec.method(),
            url = %url,
            status = status.as_u16(),
            "API request completed"
        );
        debug!(service = self.service, headers = ?response_headers, "Response headers");
        debug!(service = self.service, body = %body, "Response body");

        Ok(ApiResponse {
            status,
            headers: response_headers,
            body,
        })
    }

    /// Send a request and fail with `ApiError` unless the status code is
    /// listed in the request's accepted codes.
    pub async fn request(&self, spec: RequestSpec) -> Result<ApiResponse> {
        self.send(&spec).await?.ensure_accepted(spec.accepted())
    }

    /// Pre-flight check: the URL must answer a GET with 200.
    pub async fn check_online(url: &str, accept_invalid_certs: bool) -> Result<()> {
        let unreachable = |reason: String| Error::ServiceUnreachable {
            url: url.to_string(),
            reason,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(CHECK_ONLINE_TIMEOUT_SECS))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(unreachable(format!("status {}", response.status())));
        }
        Ok(())
    }
}
