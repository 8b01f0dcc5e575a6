//! Data models for the provisioned services.
//!
//! This module contains the request and response shapes used by the
//! service handlers:
//!
//! - Quay: `Repository`, `Organization`, `Application`, `RobotAccount`
//! - Nexus: `NexusUser`, `NexusRepository`, `Script`, `ScriptResult`
//! - SonarQube: `SonarUser`, `Project`, `UserToken`

pub mod nexus;
pub mod quay;
pub mod sonarqube;

pub use nexus::{NexusRepository, NexusUser, Script, ScriptResult};
pub use quay::{Application, Organization, Repository, RobotAccount, Visibility};
pub use sonarqube::{Project, SonarUser, UserToken};
