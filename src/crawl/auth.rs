//! Credential rotation
//!
//! Candidates are tried in order against a fixed login and port; the first
//! one that yields a live session wins. The returned [`SessionGuard`] closes
//! the session when dropped, so a worker holds at most one open session and
//! releases it on every exit path, including unwinding.

use crate::device::{Connector, Session};
use crate::error::RouterError;
use std::net::Ipv4Addr;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, trace};

/// Owns a session and closes it on drop
pub struct SessionGuard {
    session: Box<dyn Session>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn Session>) -> Self {
        Self { session }
    }
}

impl Deref for SessionGuard {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
    }
}

/// Tries candidate passwords against one router
#[derive(Clone)]
pub struct Authenticator {
    connector: Arc<dyn Connector>,
    login: String,
    port: u16,
}

impl Authenticator {
    pub fn new(connector: Arc<dyn Connector>, login: impl Into<String>, port: u16) -> Self {
        Self {
            connector,
            login: login.into(),
            port,
        }
    }

    /// Return the first live session, or `AuthExhausted`
    pub fn authenticate(
        &self,
        address: Ipv4Addr,
        candidates: &[String],
    ) -> Result<SessionGuard, RouterError> {
        for (idx, password) in candidates.iter().enumerate() {
            match self.connector.connect(address, self.port, &self.login, password) {
                Ok(session) => {
                    // guard first so a dead session is still closed
                    let guard = SessionGuard::new(session);
                    if guard.is_alive() {
                        debug!(router = %address, candidate = idx + 1, "Authenticated");
                        return Ok(guard);
                    }
                    trace!(router = %address, candidate = idx + 1, "Session not live");
                }
                Err(e) => {
                    trace!(
                        router = %address,
                        candidate = idx + 1,
                        error = %e,
                        "Login attempt failed"
                    );
                }
            }
        }

        Err(RouterError::AuthExhausted {
            address,
            attempts: candidates.len(),
        })
    }
}
