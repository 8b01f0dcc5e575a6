//! Nexus repository manager handler.
//!
//! Nexus wants base64-encoded credentials posted to its UI authentication
//! endpoint, answering with a ticket that must accompany later calls in
//! `X-NX-AuthTicket`. Basic credentials are sent on every request as well.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use urlencoding::encode;

use super::absent_on_api_error;
use crate::api::{Error, RequestSpec, Result, Transport};
use crate::auth::Authenticator;
use crate::config::ServiceConfig;
use crate::models::{NexusRepository, NexusUser, Script, ScriptResult};
use crate::utils::filter_matches;

// ============================================================================
// Constants
// ============================================================================

const SERVICE_NAME: &str = "Nexus";

const BASE_ENDPOINT: &str = "service/rest";

/// Session header carrying the authentication ticket
pub const AUTH_TICKET_HEADER: &str = "X-NX-AuthTicket";

/// Roles granted to users created by this tool
const DEFAULT_USER_ROLES: &[&str] = &["nx-admin"];

/// Cleanup policy attached to hosted maven repositories
const CLEANUP_POLICY: &str = "weekly-cleanup";

#[derive(Debug, Deserialize)]
struct AuthTicket {
    #[serde(rename = "t")]
    ticket: Option<String>,
}

pub struct Nexus {
    transport: Transport,
}

impl Nexus {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            transport: Transport::new(SERVICE_NAME, config, BASE_ENDPOINT).with_basic_auth(),
        }
    }

    /// Check the instance answers before building a handler for it
    pub async fn connect(config: &ServiceConfig) -> Result<Self> {
        Transport::check_online(config.base_url(), config.accept_invalid_certs).await?;
        Ok(Self::new(config))
    }

    #[cfg(test)]
    fn auth_ticket(&self) -> Option<&str> {
        self.transport.header(AUTH_TICKET_HEADER)
    }

    // ===== Users =====

    /// Create a local admin user. `None` when Nexus refused.
    pub async fn add_user(&mut self, username: &str, password: &str) -> Result<Option<()>> {
        let spec = RequestSpec::post("beta/security/users").data(json!({
            "userId": username,
            "firstName": username,
            "lastName": username,
            "password": password,
            "emailAddress": format!("{}@example.com", username),
            "status": "active",
            "roles": DEFAULT_USER_ROLES,
        }));
        let result = self.transport.request(spec).await.map(|_| ());
        absent_on_api_error(SERVICE_NAME, "add user", username, result)
    }

    pub async fn list_users(&mut self) -> Result<Vec<NexusUser>> {
        let result = self
            .transport
            .request(RequestSpec::get("beta/security/users"))
            .await
            .and_then(|response| response.json());
        Ok(absent_on_api_error(SERVICE_NAME, "list users", "*", result)?.unwrap_or_default())
    }

    /// Server-side lookup; Nexus treats `userId` as a prefix.
    pub async fn search_users(&mut self, user: &str) -> Result<Vec<NexusUser>> {
        let spec = RequestSpec::get("beta/security/users").query("userId", user);
        let result = self
            .transport
            .request(spec)
            .await
            .and_then(|response| response.json());
        Ok(absent_on_api_error(SERVICE_NAME, "search users", user, result)?.unwrap_or_default())
    }

    /// Client-side substring match over the full user listing.
    pub async fn find_users(&mut self, query: &str) -> Result<Vec<NexusUser>> {
        let users = self.list_users().await?;
        Ok(filter_matches(users, query, |user| user.user_id.as_str()))
    }

    // ===== Repositories =====

    pub async fn list_repositories(&mut self) -> Result<Vec<NexusRepository>> {
        let result = self
            .transport
            .request(RequestSpec::get("beta/repositories"))
            .await
            .and_then(|response| response.json());
        Ok(absent_on_api_error(SERVICE_NAME, "list repositories", "*", result)?.unwrap_or_default())
    }

    /// Create a hosted maven repository with the workshop defaults.
    pub async fn add_repository(&mut self, name: &str) -> Result<Option<()>> {
        let spec = RequestSpec::post("beta/repositories/maven/hosted")
            .data(json!({
                "name": name,
                "online": true,
                "storage": {
                    "blobStoreName": "default",
                    "strictContentTypeValidation": true,
                    "writePolicy": "allow_once",
                },
                "cleanup": {
                    "policyName": CLEANUP_POLICY,
                },
                "maven": {
                    "versionPolicy": "mixed",
                    "layoutPolicy": "strict",
                },
            }))
            .accept(&[200, 201]);
        let result = self.transport.request(spec).await.map(|_| ());
        absent_on_api_error(SERVICE_NAME, "add repository", name, result)
    }

    // ===== Scripts =====

    pub async fn list_scripts(&mut self) -> Result<Vec<Script>> {
        let result = self
            .transport
            .request(RequestSpec::get("v1/script"))
            .await
            .and_then(|response| response.json());
        Ok(absent_on_api_error(SERVICE_NAME, "list scripts", "*", result)?.unwrap_or_default())
    }

    /// Upload a groovy script under `name`.
    pub async fn add_script(&mut self, name: &str, content: &str) -> Result<Option<()>> {
        let spec = RequestSpec::post("v1/script")
            .data(json!({ "name": name, "type": "groovy", "content": content }))
            .accept(&[204]);
        let result = self.transport.request(spec).await.map(|_| ());
        absent_on_api_error(SERVICE_NAME, "add script", name, result)
    }

    /// Replace the content of an existing script.
    pub async fn update_script(&mut self, name: &str, content: &str) -> Result<Option<()>> {
        let spec = RequestSpec::put(format!("v1/script/{}", encode(name)))
            .data(json!({ "name": name, "type": "groovy", "content": content }))
            .accept(&[204]);
        let result = self.transport.request(spec).await.map(|_| ());
        absent_on_api_error(SERVICE_NAME, "update script", name, result)
    }

    /// Run a stored script; `args` is handed to it as a plain text body.
    pub async fn run_script(&mut self, name: &str, args: &str) -> Result<Option<ScriptResult>> {
        let spec = RequestSpec::post(format!("v1/script/{}/run", encode(name))).text(args);
        let result = self
            .transport
            .request(spec)
            .await
            .and_then(|response| response.json());
        absent_on_api_error(SERVICE_NAME, "run script", name, result)
    }
}

impl Authenticator for Nexus {
    fn transport(&self) -> &Transport {
        &self.transport
    }

    fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    async fn sign_in(&mut self) -> Result<()> {
        self.transport.open()?;

        let credentials = self.transport.credentials().clone();
        let login = json!({
            "u": STANDARD.encode(credentials.username.as_bytes()),
            "p": STANDARD.encode(credentials.password.as_bytes()),
        });

        let response = match self
            .transport
            .request(RequestSpec::post("wonderland/authenticate").data(login))
            .await
        {
            Ok(response) => response,
            Err(Error::Api(err)) => {
                return Err(Error::Authentication(format!(
                    "sign-in rejected for {}: {}",
                    credentials.username,
                    err.message()
                )))
            }
            Err(err) => return Err(err),
        };

        let ticket = response
            .json::<AuthTicket>()?
            .ticket
            .ok_or_else(|| Error::Authentication("no authentication ticket returned".to_string()))?;
        self.transport.set_header(AUTH_TICKET_HEADER, &ticket)?;
        info!(service = SERVICE_NAME, username = %credentials.username, "Signed in");
        Ok(())
    }

    /// Nexus has no logout call worth making; just drop the session.
    async fn sign_out(&mut self) -> Result<()> {
        self.transport.close();
        Ok(())
    }
}
