//! devsecops-core - provisioning clients for Quay, Nexus and SonarQube.
//!
//! This crate holds everything that talks to the services: the shared HTTP
//! transport, the sign-in handshakes, and the per-service operations used
//! to seed a workshop cluster with users, organizations, repositories and
//! settings. The `devsecops-api` binary is a thin layer on top.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use api::{ApiError, Error, Result, Transport};
pub use auth::{with_session, Authenticator, PasswordSlots, ScopedSession, SlotState};
pub use config::{Credentials, ServiceConfig, DEFAULT_TIMEOUT_SECS};
pub use services::{Nexus, Quay, SonarQube};
