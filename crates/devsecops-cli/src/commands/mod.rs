//! Command implementations, one module per service.
//!
//! Each command checks the service is reachable, signs in for the length
//! of the command, and prints one line per item through a `Report`.

pub mod nexus;
pub mod quay;
pub mod sonarqube;
