//! Authentication layered on the shared transport.
//!
//! This module provides:
//! - `Authenticator`: the sign-in / sign-out capability every service
//!   handler implements over its own `Transport`
//! - `ScopedSession` / `with_session`: sign-in on entry, guaranteed
//!   sign-out and connection release on exit
//! - `PasswordSlots`: the credential rotation used by SonarQube sign-in

pub mod credentials;
pub mod session;

pub use credentials::{PasswordSlots, SlotState};
pub use session::{with_session, ScopedSession};

use crate::api::{Result, Transport};

/// Sign-in / sign-out around a service's transport.
///
/// Implementors compose a `Transport` rather than extend one; they differ
/// only in how a session is established and torn down.
#[allow(async_fn_in_trait)]
pub trait Authenticator {
    fn transport(&self) -> &Transport;

    fn transport_mut(&mut self) -> &mut Transport;

    /// Open the transport and establish whatever headers or tokens the
    /// service requires.
    async fn sign_in(&mut self) -> Result<()>;

    /// End the session. Must leave the transport closed.
    async fn sign_out(&mut self) -> Result<()>;
}
