//! Hooks notified when sessions open and close.

use serde::Serialize;

use sessiond_core::Result;

use crate::session::Session;

/// Why a session is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Closed by its own holder (logout, transport teardown)
    Explicit,
    /// Evicted after exceeding the idle threshold
    IdleTimeout,
    /// Terminated by another actor (administrative or remote revocation)
    Terminated,
    /// Its user was deleted
    UserDeleted,
    /// The registry is shutting down
    Shutdown,
}

impl CloseReason {
    /// Whether the client should be told its session was taken away.
    pub fn notifies_client(self) -> bool {
        matches!(self, CloseReason::Terminated)
    }
}

/// Collaborator that holds resources tied to a session's lifetime.
///
/// Failures are reported back to the registry, which logs them and carries
/// on with the remaining handlers and sessions.
pub trait SessionHandler: Send + Sync {
    /// Handler name used in logs and errors.
    fn name(&self) -> &str;

    /// Called once before a new session becomes visible in the registry.
    ///
    /// Runs under the registry lock, so it must not call back into the
    /// session manager.
    fn on_session_opened(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    /// Called once while a session is being closed.
    fn on_session_closed(&self, session: &Session, reason: CloseReason) -> Result<()>;
}
