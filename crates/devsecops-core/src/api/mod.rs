//! REST plumbing shared by the service handlers.
//!
//! This module provides the `Transport` wrapper around a single HTTP
//! session and the error taxonomy every handler reports through. A request
//! succeeds only when the response status is in the caller's accepted set;
//! anything else becomes an `ApiError` carrying the response body.

pub mod error;
pub mod transport;

pub use error::{ApiError, Error, Result};
pub use transport::{ApiResponse, Payload, PayloadEncoding, RequestSpec, Transport};
