//! Service handlers: one per provisioned product.
//!
//! Each handler owns a `Transport`, implements `Authenticator` for its own
//! sign-in handshake, and exposes verb-style operations. Operations swallow
//! `ApiError`s: the service's message is logged and the caller receives
//! `None` (or an empty list), which is how "already exists" and other
//! rejected writes are told apart from success. Transport and session
//! failures still propagate.

pub mod nexus;
pub mod quay;
pub mod sonarqube;

pub use nexus::Nexus;
pub use quay::Quay;
pub use sonarqube::SonarQube;

use tracing::{info, warn};

use crate::api::{Error, Result};

/// Convert an `ApiError` into an absent result, logging the service's
/// error message. Other errors pass through.
pub(crate) fn absent_on_api_error<T>(
    service: &str,
    action: &str,
    target: &str,
    result: Result<T>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::Api(err)) => {
            warn!(service = service, target = target, status = err.status.as_u16(), "Unable to {}", action);
            info!(service = service, message = %err.message(), "Service response");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
