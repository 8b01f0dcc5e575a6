//! Connection configuration shared by every service handler.
//!
//! A `ServiceConfig` carries the target URL, the login credentials and the
//! HTTP client knobs. Nothing here is persisted; the CLI builds one per
//! invocation from flags and environment variables.

use std::time::Duration;

/// HTTP request timeout in seconds.
/// Provisioning calls are small; 30s tolerates a busy cluster.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    /// Workshop clusters usually serve self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl ServiceConfig {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: Credentials::new(username, password),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            accept_invalid_certs: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Base URL joined with a service's versioned path segment
    pub fn api_root(&self, base_endpoint: &str) -> String {
        format!("{}/{}", self.base_url(), base_endpoint.trim_matches('/'))
    }
}
