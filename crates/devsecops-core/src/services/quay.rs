//! Quay container registry handler.
//!
//! Quay protects its API with a CSRF token. Sign-in scrapes the initial
//! token from the login page; afterwards every response may carry a
//! replacement in `X-Next-CSRF-Token`, which must be used for the very next
//! request.

use serde_json::json;
use tracing::{debug, info};
use urlencoding::encode;

use super::absent_on_api_error;
use crate::api::{ApiResponse, Error, RequestSpec, Result, Transport};
use crate::auth::Authenticator;
use crate::config::ServiceConfig;
use crate::models::{Application, Organization, Repository, RobotAccount, Visibility};

// ============================================================================
// Constants
// ============================================================================

const SERVICE_NAME: &str = "Quay";

const BASE_ENDPOINT: &str = "api/v1";

/// Request header carrying the current CSRF token
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Response header carrying the token to use next
pub const NEXT_CSRF_HEADER: &str = "X-Next-CSRF-Token";

/// Marker on the login page line that embeds the initial token
const TOKEN_MARKER: &str = "__token";

/// Find the first line containing the token marker and return the text
/// between its first pair of single quotes.
pub fn scrape_csrf_token(page: &str) -> Option<String> {
    let line = page.lines().find(|line| line.contains(TOKEN_MARKER))?;
    let token = line.split('\'').nth(1)?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub struct Quay {
    transport: Transport,
    base_url: String,
    username: String,
    password: String,
}

impl Quay {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            transport: Transport::new(SERVICE_NAME, config, BASE_ENDPOINT),
            base_url: config.base_url().to_string(),
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
        }
    }

    /// Check the instance answers before building a handler for it
    pub async fn connect(config: &ServiceConfig) -> Result<Self> {
        Transport::check_online(config.base_url(), config.accept_invalid_certs).await?;
        Ok(Self::new(config))
    }

    /// The token the next request will carry
    #[cfg(test)]
    fn csrf_token(&self) -> Option<&str> {
        self.transport.header(CSRF_HEADER)
    }

    /// Issue a request, then adopt the next CSRF token (if any) before the
    /// status is judged, so a rejected call cannot leave a stale token.
    async fn request(&mut self, spec: RequestSpec) -> Result<ApiResponse> {
        let response = self.transport.send(&spec).await?;
        if let Some(next) = response.header(NEXT_CSRF_HEADER) {
            debug!(service = SERVICE_NAME, "Rotating CSRF token");
            let next = next.to_string();
            self.transport.set_header(CSRF_HEADER, &next)?;
        }
        response.ensure_accepted(spec.accepted())
    }

    // ===== Users =====

    /// Create a user. `None` when Quay refused (typically: already exists).
    pub async fn add_user(&mut self, username: &str, password: &str) -> Result<Option<()>> {
        let spec = RequestSpec::post("user").data(json!({
            "username": username,
            "password": password,
        }));
        let result = self.request(spec).await.map(|_| ());
        absent_on_api_error(SERVICE_NAME, "add user", username, result)
    }

    // ===== Organizations =====

    pub async fn get_organization(&mut self, name: &str) -> Result<Option<Organization>> {
        let spec = RequestSpec::get(format!("organization/{}", encode(name)));
        let result = self.request(spec).await.and_then(|response| response.json());
        absent_on_api_error(SERVICE_NAME, "find organization", name, result)
    }

    /// Create an organization. The contact email defaults to
    /// `<name>@example.com`.
    pub async fn add_organization(&mut self, name: &str, email: Option<&str>) -> Result<Option<()>> {
        let email = email
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}@example.com", name));
        let spec = RequestSpec::post("organization/")
            .data(json!({ "name": name, "email": email }))
            .accept(&[200, 201]);
        let result = self.request(spec).await.map(|_| ());
        absent_on_api_error(SERVICE_NAME, "add organization", name, result)
    }

    // ===== Applications =====

    pub async fn add_application(
        &mut self,
        organization: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<Application>> {
        let spec = RequestSpec::post(format!("organization/{}/applications", encode(organization)))
            .data(json!({
                "name": name,
                "description": description.unwrap_or_default(),
                "application_uri": "",
                "redirect_uri": "",
            }))
            .accept(&[200, 201]);
        let result = self.request(spec).await.and_then(|response| response.json());
        absent_on_api_error(SERVICE_NAME, "add application", name, result)
    }

    // ===== Repositories =====

    pub async fn get_repository(&mut self, organization: &str, name: &str) -> Result<Option<Repository>> {
        let spec = RequestSpec::get(format!("repository/{}/{}", encode(organization), encode(name)));
        let result = self.request(spec).await.and_then(|response| response.json());
        absent_on_api_error(SERVICE_NAME, "find repository", name, result)
    }

    pub async fn add_repository(
        &mut self,
        organization: &str,
        name: &str,
        description: Option<&str>,
        visibility: Visibility,
    ) -> Result<Option<()>> {
        let spec = RequestSpec::post("repository")
            .data(json!({
                "namespace": organization,
                "repository": name,
                "description": description.unwrap_or_default(),
                "visibility": visibility,
                "repo_kind": "image",
            }))
            .accept(&[200, 201]);
        let result = self.request(spec).await.map(|_| ());
        absent_on_api_error(SERVICE_NAME, "add repository", name, result)
    }

    // ===== Robot accounts =====

    /// Create (or update) a robot account; Quay answers with its token.
    pub async fn add_robot(
        &mut self,
        organization: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<RobotAccount>> {
        let endpoint = format!("organization/{}/robots/{}", encode(organization), encode(name));
        let spec = RequestSpec::put(endpoint)
            .data(json!({ "description": description.unwrap_or_default() }))
            .accept(&[200, 201]);
        let result = self.request(spec).await.and_then(|response| response.json());
        absent_on_api_error(SERVICE_NAME, "add robot", name, result)
    }
}

impl Authenticator for Quay {
    fn transport(&self) -> &Transport {
        &self.transport
    }

    fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    async fn sign_in(&mut self) -> Result<()> {
        self.transport.open()?;

        let page = self.transport.fetch_page(&self.base_url).await?;
        let token = scrape_csrf_token(&page).ok_or_else(|| {
            Error::Authentication(format!(
                "no CSRF token found on the login page at {}",
                self.base_url
            ))
        })?;
        self.transport.set_header(CSRF_HEADER, &token)?;

        let spec = RequestSpec::post("signin").data(json!({
            "username": self.username,
            "password": self.password,
        }));
        match self.request(spec).await {
            Ok(_) => {
                info!(service = SERVICE_NAME, username = %self.username, "Signed in");
                Ok(())
            }
            Err(Error::Api(err)) => Err(Error::Authentication(format!(
                "sign-in rejected for {}: {}",
                self.username,
                err.message()
            ))),
            Err(err) => Err(err),
        }
    }

    async fn sign_out(&mut self) -> Result<()> {
        let result = self.request(RequestSpec::post("signout")).await;
        self.transport.close();
        result.map(|_| ())
    }
}
