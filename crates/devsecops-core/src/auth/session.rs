use std::ops::{AsyncFnOnce, Deref, DerefMut};

use tracing::{debug, warn};

use super::Authenticator;
use crate::api::{Error, Result};

/// A signed-in handler.
///
/// `open` signs in, `close` signs out. Dropping the guard without calling
/// `close` (an early return or a panic) still closes the transport, so the
/// HTTP session never outlives the scope.
pub struct ScopedSession<A: Authenticator> {
    inner: A,
    signed_out: bool,
}

impl<A: Authenticator> ScopedSession<A> {
    pub async fn open(mut inner: A) -> Result<Self> {
        if let Err(err) = inner.sign_in().await {
            inner.transport_mut().close();
            return Err(err);
        }
        debug!(service = inner.transport().service(), "Sign-in complete");
        Ok(Self {
            inner,
            signed_out: false,
        })
    }

    /// Sign out. The transport is closed even if the sign-out call fails.
    pub async fn close(mut self) -> Result<()> {
        self.signed_out = true;
        let result = self.inner.sign_out().await;
        self.inner.transport_mut().close();
        debug!(service = self.inner.transport().service(), "Sign-out complete");
        result
    }
}

impl<A: Authenticator> Deref for ScopedSession<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.inner
    }
}

impl<A: Authenticator> DerefMut for ScopedSession<A> {
    fn deref_mut(&mut self) -> &mut A {
        &mut self.inner
    }
}

impl<A: Authenticator> Drop for ScopedSession<A> {
    fn drop(&mut self) {
        if !self.signed_out {
            warn!(
                service = self.inner.transport().service(),
                "Session dropped without sign-out, closing connection"
            );
            self.inner.transport_mut().close();
        }
    }
}

/// Run `body` between sign-in and sign-out.
///
/// Sign-out runs whether or not the body succeeded. The body's error wins
/// over a sign-out error.
pub async fn with_session<A, T, E, F>(inner: A, body: F) -> std::result::Result<T, E>
where
    A: Authenticator,
    E: From<Error>,
    F: AsyncFnOnce(&mut A) -> std::result::Result<T, E>,
{
    let mut session = ScopedSession::open(inner).await?;
    let outcome = body(&mut *session).await;
    let closed = session.close().await;

    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "Sign-out failed after an earlier error");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::api::Transport;
    use crate::config::ServiceConfig;

    /// Authenticator that only toggles the transport.
    struct Offline {
        transport: Transport,
        sign_outs: Rc<Cell<u32>>,
        fail_sign_in: bool,
    }

    impl Offline {
        fn new(fail_sign_in: bool) -> (Self, Rc<Cell<u32>>) {
            let config = ServiceConfig::new("http://127.0.0.1:9", "admin", "admin");
            let sign_outs = Rc::new(Cell::new(0));
            let offline = Self {
                transport: Transport::new("Offline", &config, "api"),
                sign_outs: Rc::clone(&sign_outs),
                fail_sign_in,
            };
            (offline, sign_outs)
        }
    }

    impl Authenticator for Offline {
        fn transport(&self) -> &Transport {
            &self.transport
        }

        fn transport_mut(&mut self) -> &mut Transport {
            &mut self.transport
        }

        async fn sign_in(&mut self) -> Result<()> {
            self.transport.open()?;
            if self.fail_sign_in {
                return Err(Error::Authentication("rejected".to_string()));
            }
            Ok(())
        }

        async fn sign_out(&mut self) -> Result<()> {
            self.sign_outs.set(self.sign_outs.get() + 1);
            self.transport.close();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_open_then_close_signs_out_once() {
        let (offline, sign_outs) = Offline::new(false);
        let session = ScopedSession::open(offline).await.unwrap();
        assert!(session.transport().is_open());
        session.close().await.unwrap();
        assert_eq!(sign_outs.get(), 1);
    }

    #[tokio::test]
    async fn test_failed_sign_in_skips_sign_out() {
        let (offline, sign_outs) = Offline::new(true);
        let err = ScopedSession::open(offline).await.err().unwrap();
        assert!(matches!(err, Error::Authentication(_)));
        assert_eq!(sign_outs.get(), 0);
    }

    #[tokio::test]
    async fn test_with_session_signs_out_after_body_error() {
        let (offline, sign_outs) = Offline::new(false);
        let result: std::result::Result<(), Error> =
            with_session(offline, async |api: &mut Offline| {
                assert!(api.transport().is_open());
                Err(Error::SessionClosed)
            })
            .await;
        assert!(matches!(result, Err(Error::SessionClosed)));
        assert_eq!(sign_outs.get(), 1);
    }

    #[tokio::test]
    async fn test_with_session_returns_body_value() {
        let (offline, sign_outs) = Offline::new(false);
        let value = with_session(offline, async |api: &mut Offline| {
            Ok::<_, Error>(api.transport().service())
        })
        .await
        .unwrap();
        assert_eq!(value, "Offline");
        assert_eq!(sign_outs.get(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_close_skips_sign_out() {
        let (offline, sign_outs) = Offline::new(false);
        let session = ScopedSession::open(offline).await.unwrap();
        drop(session);
        assert_eq!(sign_outs.get(), 0);
    }
}
