//! SonarQube handler.
//!
//! SonarQube takes basic credentials on every call and form-style query
//! parameters instead of JSON bodies. Sign-in is a validation loop over
//! `PasswordSlots`, so a run that changes the admin password can be
//! repeated against a server where the change already happened.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use super::absent_on_api_error;
use crate::api::{Error, PayloadEncoding, RequestSpec, Result, Transport};
use crate::auth::{Authenticator, PasswordSlots};
use crate::config::{Credentials, ServiceConfig};
use crate::models::sonarqube::{ProjectEnvelope, UserEnvelope, UsersSearchResponse, ValidateResponse};
use crate::models::{Project, SonarUser, UserToken};

// ============================================================================
// Constants
// ============================================================================

const SERVICE_NAME: &str = "SonarQube";

const BASE_ENDPOINT: &str = "api";

/// Validation attempts before sign-in gives up
pub const MAX_SIGN_IN_ATTEMPTS: u32 = 4;

/// Pause between validation attempts.
/// A fresh instance needs a moment before the built-in admin can log in.
pub const SIGN_IN_RETRY_DELAY: Duration = Duration::from_secs(3);

pub struct SonarQube {
    transport: Transport,
    username: String,
    slots: PasswordSlots,
    retry_delay: Duration,
}

impl SonarQube {
    /// `new_password`, when given, replaces the login password during
    /// sign-in (or is recognised as already in place).
    pub fn new(config: &ServiceConfig, new_password: Option<String>) -> Self {
        let transport = Transport::new(SERVICE_NAME, config, BASE_ENDPOINT)
            .with_basic_auth()
            .with_encoding(PayloadEncoding::Query);
        Self {
            transport,
            username: config.credentials.username.clone(),
            slots: PasswordSlots::new(config.credentials.password.clone(), new_password),
            retry_delay: SIGN_IN_RETRY_DELAY,
        }
    }

    pub async fn connect(config: &ServiceConfig, new_password: Option<String>) -> Result<Self> {
        Transport::check_online(config.base_url(), config.accept_invalid_certs).await?;
        Ok(Self::new(config, new_password))
    }

    #[cfg(test)]
    pub(crate) fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[cfg(test)]
    fn slot_state(&self) -> crate::auth::SlotState {
        self.slots.state()
    }

    /// Password the session currently authenticates with
    #[cfg(test)]
    fn active_password(&self) -> &str {
        self.slots.current()
    }

    fn swap_passwords(&mut self) {
        self.slots.swap();
        self.transport
            .set_credentials(Credentials::new(self.username.clone(), self.slots.current()));
        debug!(service = SERVICE_NAME, state = ?self.slots.state(), "Swapped login password");
    }

    /// Ask the server whether the current credentials are good. A rejected
    /// call counts as "not valid".
    async fn validate(&self) -> Result<bool> {
        let response = self
            .transport
            .send(&RequestSpec::post("authentication/validate"))
            .await?;
        if response.status.as_u16() != 200 {
            debug!(service = SERVICE_NAME, status = response.status.as_u16(), "Validation rejected");
            return Ok(false);
        }
        Ok(response.json::<ValidateResponse>()?.valid)
    }

    async fn validate_with_retries(&mut self) -> Result<()> {
        for attempt in 1..=MAX_SIGN_IN_ATTEMPTS {
            if self.validate().await? {
                return Ok(());
            }
            warn!(service = SERVICE_NAME, attempt = attempt, "Login not accepted");
            if attempt == MAX_SIGN_IN_ATTEMPTS {
                break;
            }
            self.swap_passwords();
            tokio::time::sleep(self.retry_delay).await;
        }
        Err(Error::Authentication(format!(
            "unable to log in to {} as {}",
            SERVICE_NAME, self.username
        )))
    }

    async fn change_password(&mut self) -> Result<()> {
        let Some(new_password) = self.slots.pending().map(str::to_string) else {
            return Ok(());
        };
        let spec = RequestSpec::post("users/change_password")
            .data(json!({
                "login": self.username,
                "previousPassword": self.slots.current(),
                "password": new_password,
            }))
            .accept(&[204]);
        self.transport.request(spec).await?;
        info!(service = SERVICE_NAME, username = %self.username, "Changed login password");

        self.swap_passwords();
        self.sign_out().await?;
        self.transport.open()?;
        if !self.validate().await? {
            return Err(Error::Authentication(
                "unable to log back in after changing password".to_string(),
            ));
        }
        Ok(())
    }

    // ===== Users =====

    /// Create a local user. `None` when SonarQube refused.
    pub async fn add_user(&mut self, username: &str, password: &str) -> Result<Option<SonarUser>> {
        let spec = RequestSpec::post("users/create").data(json!({
            "login": username,
            "password": password,
            "name": username,
        }));
        let result = self
            .transport
            .request(spec)
            .await
            .and_then(|response| response.json::<UserEnvelope>())
            .map(|envelope| envelope.user);
        absent_on_api_error(SERVICE_NAME, "add user", username, result)
    }

    pub async fn search_users(&mut self, query: &str) -> Result<Vec<SonarUser>> {
        let spec = RequestSpec::post("users/search").data(json!({ "q": query }));
        let result = self
            .transport
            .request(spec)
            .await
            .and_then(|response| response.json::<UsersSearchResponse>())
            .map(|found| found.users);
        Ok(absent_on_api_error(SERVICE_NAME, "search users", query, result)?.unwrap_or_default())
    }

    // ===== Settings, projects, tokens =====

    pub async fn update_setting(&mut self, key: &str, value: &str) -> Result<Option<()>> {
        let spec = RequestSpec::post("settings/set")
            .data(json!({ "key": key, "value": value }))
            .accept(&[204]);
        let result = self.transport.request(spec).await.map(|_| ());
        absent_on_api_error(SERVICE_NAME, "update setting", key, result)
    }

    pub async fn add_project(&mut self, key: &str, name: &str) -> Result<Option<Project>> {
        let spec = RequestSpec::post("projects/create").data(json!({ "project": key, "name": name }));
        let result = self
            .transport
            .request(spec)
            .await
            .and_then(|response| response.json::<ProjectEnvelope>())
            .map(|envelope| envelope.project);
        absent_on_api_error(SERVICE_NAME, "add project", key, result)
    }

    /// Generate a user token for the signed-in account.
    pub async fn generate_token(&mut self, name: &str) -> Result<Option<UserToken>> {
        let spec = RequestSpec::post("user_tokens/generate").data(json!({ "name": name }));
        let result = self
            .transport
            .request(spec)
            .await
            .and_then(|response| response.json());
        absent_on_api_error(SERVICE_NAME, "generate token", name, result)
    }
}

impl Authenticator for SonarQube {
    fn transport(&self) -> &Transport {
        &self.transport
    }

    fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    async fn sign_in(&mut self) -> Result<()> {
        self.transport.open()?;
        self.validate_with_retries().await?;
        if self.slots.has_pending() {
            self.change_password().await?;
        }
        info!(service = SERVICE_NAME, username = %self.username, "Signed in");
        Ok(())
    }

    async fn sign_out(&mut self) -> Result<()> {
        let spec = RequestSpec::post("authentication/logout").accept(&[200, 204]);
        let result = self.transport.request(spec).await.map(|_| ());
        self.transport.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::auth::{with_session, SlotState};
    use httpmock::prelude::*;
    use serde_json::json;

    const AUTH_ADMIN: &str = "Basic YWRtaW46YWRtaW4=";
    const AUTH_S3CRET: &str = "Basic YWRtaW46czNjcmV0";

    const TEST_DELAY: Duration = Duration::from_millis(20);

    fn handler(server: &MockServer, new_password: Option<&str>) -> SonarQube {
        let config = ServiceConfig::new(server.base_url(), "admin", "admin");
        SonarQube::new(&config, new_password.map(str::to_string)).with_retry_delay(TEST_DELAY)
    }

    fn mock_validate<'a>(server: &'a MockServer, auth: &str, valid: bool) -> httpmock::Mock<'a> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/authentication/validate")
                .header("authorization", auth);
            then.status(200).json_body(json!({ "valid": valid }));
        })
    }

    fn mock_logout(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST).path("/api/authentication/logout");
            then.status(204);
        })
    }

    #[tokio::test]
    async fn test_sign_in_and_out_release_session() {
        let server = MockServer::start_async().await;
        let validate = mock_validate(&server, AUTH_ADMIN, true);
        let logout = mock_logout(&server);

        let mut sonar = handler(&server, None);
        sonar.sign_in().await.unwrap();
        assert!(sonar.transport().is_open());
        sonar.sign_out().await.unwrap();
        assert!(!sonar.transport().is_open());

        validate.assert();
        logout.assert();
    }

    #[tokio::test]
    async fn test_new_password_already_active() {
        let server = MockServer::start_async().await;
        let old = mock_validate(&server, AUTH_ADMIN, false);
        let new = mock_validate(&server, AUTH_S3CRET, true);
        let change = server.mock(|when, then| {
            when.method(POST).path("/api/users/change_password");
            then.status(204);
        });

        let mut sonar = handler(&server, Some("s3cret"));
        sonar.sign_in().await.unwrap();

        assert_eq!(sonar.active_password(), "s3cret");
        assert_eq!(sonar.slot_state(), SlotState::UsingPending);
        old.assert_calls(1);
        new.assert_calls(1);
        change.assert_calls(0);
    }

    #[tokio::test]
    async fn test_wrong_credentials_give_up_after_four_validations() {
        let server = MockServer::start_async().await;
        let validate = server.mock(|when, then| {
            when.method(POST).path("/api/authentication/validate");
            then.status(200).json_body(json!({ "valid": false }));
        });

        let mut sonar = handler(&server, None);
        let started = Instant::now();
        let err = sonar.sign_in().await.unwrap_err();

        assert!(matches!(err, Error::Authentication(_)));
        validate.assert_calls(4);
        assert!(started.elapsed() >= TEST_DELAY * 3);
    }

    #[tokio::test]
    async fn test_rejected_validation_counts_as_failed_attempt() {
        let server = MockServer::start_async().await;
        let rejected = server.mock(|when, then| {
            when.method(POST)
                .path("/api/authentication/validate")
                .header("authorization", AUTH_ADMIN);
            then.status(401);
        });
        let accepted = mock_validate(&server, AUTH_S3CRET, true);

        let mut sonar = handler(&server, Some("s3cret"));
        sonar.sign_in().await.unwrap();
        rejected.assert();
        accepted.assert();
    }

    #[tokio::test]
    async fn test_change_password_then_log_back_in() {
        let server = MockServer::start_async().await;
        let old = mock_validate(&server, AUTH_ADMIN, true);
        let new = mock_validate(&server, AUTH_S3CRET, true);
        let change = server.mock(|when, then| {
            when.method(POST)
                .path("/api/users/change_password")
                .header("authorization", AUTH_ADMIN)
                .query_param("login", "admin")
                .query_param("previousPassword", "admin")
                .query_param("password", "s3cret");
            then.status(204);
        });
        let logout = mock_logout(&server);

        let mut sonar = handler(&server, Some("s3cret"));
        sonar.sign_in().await.unwrap();

        assert!(sonar.transport().is_open());
        assert_eq!(sonar.active_password(), "s3cret");
        assert_eq!(sonar.transport().credentials().password, "s3cret");
        old.assert();
        change.assert();
        logout.assert();
        new.assert();
    }

    #[tokio::test]
    async fn test_failed_relogin_after_change() {
        let server = MockServer::start_async().await;
        mock_validate(&server, AUTH_ADMIN, true);
        mock_validate(&server, AUTH_S3CRET, false);
        server.mock(|when, then| {
            when.method(POST).path("/api/users/change_password");
            then.status(204);
        });
        mock_logout(&server);

        let mut sonar = handler(&server, Some("s3cret"));
        let err = sonar.sign_in().await.unwrap_err();
        match err {
            Error::Authentication(message) => assert!(message.contains("log back in")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_operations_use_query_parameters() {
        let server = MockServer::start_async().await;
        mock_validate(&server, AUTH_ADMIN, true);
        mock_logout(&server);
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/api/users/create")
                .query_param("login", "dev")
                .query_param("password", "pw")
                .query_param("name", "dev");
            then.status(200)
                .json_body(json!({"user": {"login": "dev", "name": "dev", "active": true, "local": true}}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/users/search").query_param("q", "dev");
            then.status(200).json_body(json!({"users": [{"login": "dev"}]}));
        });
        let setting = server.mock(|when, then| {
            when.method(POST)
                .path("/api/settings/set")
                .query_param("key", "sonar.forceAuthentication")
                .query_param("value", "true");
            then.status(204);
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/projects/create")
                .query_param("project", "demo")
                .query_param("name", "Demo");
            then.status(200).json_body(json!({"project": {"key": "demo", "name": "Demo"}}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/user_tokens/generate").query_param("name", "ci");
            then.status(200)
                .json_body(json!({"login": "admin", "name": "ci", "token": "squ_123"}));
        });

        let sonar = handler(&server, None);
        with_session(sonar, async |api: &mut SonarQube| {
            let user = api.add_user("dev", "pw").await?.unwrap();
            assert_eq!(user.login, "dev");
            assert_eq!(api.search_users("dev").await?.len(), 1);
            assert!(api.update_setting("sonar.forceAuthentication", "true").await?.is_some());
            assert_eq!(api.add_project("demo", "Demo").await?.unwrap().key, "demo");
            assert_eq!(api.generate_token("ci").await?.unwrap().token, "squ_123");
            Ok::<_, Error>(())
        })
        .await
        .unwrap();

        create.assert();
        setting.assert();
    }

    #[tokio::test]
    async fn test_add_user_error_message_is_absent() {
        let server = MockServer::start_async().await;
        mock_validate(&server, AUTH_ADMIN, true);
        server.mock(|when, then| {
            when.method(POST).path("/api/users/create");
            then.status(400)
                .json_body(json!({"errors": [{"msg": "An active user with login 'dev' already exists"}]}));
        });

        let mut sonar = handler(&server, None);
        sonar.sign_in().await.unwrap();
        assert!(sonar.add_user("dev", "pw").await.unwrap().is_none());
    }
}
