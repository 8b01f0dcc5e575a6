use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::utils::truncate_string;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// A response whose status code was outside the accepted set.
#[derive(Error, Debug, Clone)]
#[error("Unexpected status {status}: {}", truncate_string(.body, MAX_ERROR_BODY_LENGTH))]
pub struct ApiError {
    pub status: StatusCode,
    pub body: String,
}

impl ApiError {
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    /// Extract the service's own error message from a JSON error body.
    ///
    /// Quay reports `error_message`, Nexus `message`, and SonarQube a list of
    /// `errors[].msg`. Falls back to the (truncated) raw body.
    pub fn message(&self) -> String {
        if let Ok(value) = serde_json::from_str::<Value>(&self.body) {
            if let Some(msg) = value.get("error_message").and_then(Value::as_str) {
                return msg.to_string();
            }
            if let Some(msg) = value.get("message").and_then(Value::as_str) {
                return msg.to_string();
            }
            if let Some(errors) = value.get("errors").and_then(Value::as_array) {
                let msgs: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("msg").and_then(Value::as_str))
                    .collect();
                if !msgs.is_empty() {
                    return msgs.join("; ");
                }
            }
        }
        truncate_string(self.body.trim(), MAX_ERROR_BODY_LENGTH)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{url} appears to be offline and is not responding to requests ({reason})")]
    ServiceUnreachable { url: String, reason: String },

    #[error("Session is closed - sign in before issuing requests")]
    SessionClosed,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Invalid header {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_prefers_service_fields() {
        let quay = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"error_message": "The username already exists"}"#,
        );
        assert_eq!(quay.message(), "The username already exists");

        let nexus = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"message": "duplicate"}"#);
        assert_eq!(nexus.message(), "duplicate");

        let sonar = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"errors": [{"msg": "An active user with login 'dev' already exists"}]}"#,
        );
        assert_eq!(sonar.message(), "An active user with login 'dev' already exists");
    }

    #[test]
    fn test_message_falls_back_to_body() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "  boom \n");
        assert_eq!(err.message(), "boom");

        let long = "x".repeat(600);
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, &long);
        assert!(err.message().ends_with("..."));
        assert!(err.to_string().starts_with("Unexpected status 502 Bad Gateway"));
    }
}
