//! Session manager coordinating creation, restore, lookup and closing.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use sessiond_core::{
    AuthController, Clock, Error, EventSink, Result, SessionEvent, SessionId, SessionSettings,
    SessionVariant, SystemClock,
};

use crate::handler::{CloseReason, SessionHandler};
use crate::session::Session;
use crate::store::{Lookup, SessionStore};

/// Configuration for session manager.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Idle time after which a session is evicted
    pub max_idle_time: Duration,

    /// Create sessions fresh without consulting the auth controller
    pub configuration_mode: bool,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SessionManagerConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            max_idle_time: settings.max_idle_time(),
            configuration_mode: settings.configuration_mode,
        }
    }
}

/// The session registry.
///
/// Owns the [`SessionStore`] and is the only component that adds or removes
/// sessions. Construct one at startup, share it behind an `Arc`, and call
/// [`SessionManager::shutdown`] when the process stops.
pub struct SessionManager {
    store: SessionStore,
    auth: Arc<dyn AuthController>,
    events: Arc<dyn EventSink>,
    handlers: Vec<Arc<dyn SessionHandler>>,
    clock: Arc<dyn Clock>,
    config: SessionManagerConfig,
}

impl SessionManager {
    /// Create a new session manager with default configuration.
    pub fn new(auth: Arc<dyn AuthController>, events: Arc<dyn EventSink>) -> Self {
        Self::with_config(auth, events, SessionManagerConfig::default())
    }

    /// Create a new session manager with custom configuration.
    pub fn with_config(
        auth: Arc<dyn AuthController>,
        events: Arc<dyn EventSink>,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            store: SessionStore::new(),
            auth,
            events,
            handlers: Vec::new(),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Register a handler told about every session open and close.
    pub fn with_handler(mut self, handler: Arc<dyn SessionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Replace the clock used for access times and idle checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Manager configuration.
    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolve the interactive session behind a transport session id.
    ///
    /// Returns the registered session if there is one. Otherwise a new
    /// interactive session is built and prior authentication is restored
    /// through the auth controller. When nothing can be restored, the
    /// transport session is not new and `error_if_missing` is set, fails with
    /// [`Error::SessionExpired`]. Building, restoring, opening handlers and
    /// registering happen in one critical section of the store. A session
    /// closed before its start event went out also fails with
    /// [`Error::SessionExpired`].
    pub fn resolve_session(
        &self,
        transport_id: &str,
        is_new_transport_session: bool,
        error_if_missing: bool,
    ) -> Result<Arc<Session>> {
        let now = self.now();
        let lookup = self.store.get_or_try_insert_with(transport_id, || {
            let session = self.new_session(transport_id, SessionVariant::Interactive, now);

            if self.config.configuration_mode {
                debug!(session_id = %transport_id, "New session in configuration mode");
                self.open_handlers(&session);
                return Ok(Some(session));
            }

            let restored = self.restore_into(&session);
            if !restored && error_if_missing && !is_new_transport_session {
                return Err(Error::SessionExpired(transport_id.to_string()));
            }

            debug!(
                session_id = %transport_id,
                restored,
                "{} web session",
                if restored { "Restored" } else { "New" }
            );
            session.set_cache_expired(!is_new_transport_session);
            self.open_handlers(&session);
            Ok(Some(session))
        })?;

        match lookup {
            Lookup::Existing(session) => {
                Self::expect_variant(&session, SessionVariant::Interactive)?;
                session.touch(now);
                Ok(session)
            }
            Lookup::Created(session) => self.publish_started(session),
            Lookup::Vacant => Err(Error::SessionExpired(transport_id.to_string())),
        }
    }

    /// Return the registered interactive session or restore it from the auth
    /// controller. Never creates an unauthenticated session.
    ///
    /// `Ok(None)` means there is nothing to restore. A registered headless
    /// session under the same id fails with [`Error::SessionTypeConflict`].
    pub fn get_or_restore_session(&self, transport_id: &str) -> Result<Option<Arc<Session>>> {
        let now = self.now();
        let lookup = self.store.get_or_try_insert_with(transport_id, || {
            let info = match self.auth.restore_user_session(transport_id) {
                Ok(Some(info)) => info,
                Ok(None) => {
                    debug!(session_id = %transport_id, "Couldn't restore previous user session");
                    return Ok(None);
                }
                Err(e) => {
                    error!(session_id = %transport_id, error = %e, "Failed to restore previous user session");
                    return Ok(None);
                }
            };

            let session = self.new_session(transport_id, SessionVariant::Interactive, now);
            session.user_context().authenticate(&info);
            debug!(session_id = %transport_id, "Web session restored");
            self.open_handlers(&session);
            Ok::<_, Error>(Some(session))
        })?;

        match lookup {
            Lookup::Existing(session) => {
                Self::expect_variant(&session, SessionVariant::Interactive)?;
                session.touch(now);
                Ok(Some(session))
            }
            Lookup::Created(session) => self.publish_started(session).map(Some),
            Lookup::Vacant => Ok(None),
        }
    }

    /// Return or create the headless session a bearer token maps to.
    ///
    /// The session id is `requested_id` if given, else the auth-manager
    /// session id embedded in the token's permissions. A registered headless
    /// session has its credentials refreshed when the token changed. A
    /// registered interactive session under the same id yields `Ok(None)`:
    /// the two identity spaces are never merged.
    pub fn get_or_create_headless_session(
        &self,
        token: &str,
        requested_id: Option<&str>,
        create: bool,
    ) -> Result<Option<Arc<Session>>> {
        if token.is_empty() {
            return Ok(None);
        }

        let permissions = self.auth.resolve_permissions(token)?;
        let session_id = requested_id
            .map(str::to_string)
            .unwrap_or_else(|| permissions.session_id.clone());

        let now = self.now();
        let lookup = self.store.get_or_try_insert_with(&session_id, || {
            if !create {
                return Ok(None);
            }
            let session = self.new_session(&session_id, SessionVariant::Headless, now);
            session.user_context().refresh(token, None, &permissions);
            self.open_handlers(&session);
            Ok::<_, Error>(Some(session))
        })?;

        match lookup {
            Lookup::Existing(session) if session.is_headless() => {
                if session
                    .user_context()
                    .refresh_if_changed(token, &permissions)
                {
                    debug!(session_id = %session_id, "Headless session credentials refreshed");
                }
                session.touch(now);
                Ok(Some(session))
            }
            Lookup::Existing(_) => {
                debug!(session_id = %session_id, "Session exists but is not headless");
                Ok(None)
            }
            Lookup::Created(session) => self.publish_started(session).map(Some),
            Lookup::Vacant => Ok(None),
        }
    }

    /// Record client state reported by the browser of an interactive session.
    ///
    /// `None` leaves the corresponding value unchanged. Headless sessions have
    /// no client state and fail with [`Error::SessionTypeConflict`].
    pub fn update_client_state(
        &self,
        session: &Session,
        locale: Option<String>,
        action_parameters: Option<BTreeMap<String, Value>>,
    ) -> Result<()> {
        Self::expect_variant(session, SessionVariant::Interactive)?;
        let Some(state) = session.interactive_state() else {
            return Ok(());
        };
        if let Some(locale) = locale {
            state.set_locale(Some(locale));
        }
        if let Some(parameters) = action_parameters {
            state.set_action_parameters(parameters);
        }
        Ok(())
    }

    /// Get a session of either variant by ID, without touching it.
    pub fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.store.get(session_id)
    }

    /// Look up a registered interactive session. Never creates or restores.
    pub fn find_session(
        &self,
        transport_id: &str,
        error_if_missing: bool,
    ) -> Result<Option<Arc<Session>>> {
        match self.store.get(transport_id) {
            Some(session) if !session.is_headless() => {
                session.touch(self.now());
                Ok(Some(session))
            }
            _ if error_if_missing => Err(Error::SessionExpired(transport_id.to_string())),
            _ => Ok(None),
        }
    }

    /// Snapshot of all registered sessions.
    pub fn all_active_sessions(&self) -> Vec<Arc<Session>> {
        self.store.snapshot()
    }

    /// List all registered sessions.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let now = self.now();
        self.store
            .snapshot()
            .iter()
            .map(|session| SessionInfo::new(session, now, self.config.max_idle_time))
            .collect()
    }

    /// Describe one session as of now.
    pub fn describe(&self, session: &Session) -> SessionInfo {
        SessionInfo::new(session, self.now(), self.config.max_idle_time)
    }

    /// Get the number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    /// Close a session by ID.
    ///
    /// Returns the removed session, or `None` if nothing was registered.
    pub fn close_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let session = self.store.remove(session_id)?;
        debug!(session_id = %session_id, "> Close session");
        self.close_removed(&session, CloseReason::Explicit);
        Some(session)
    }

    /// Close every session.
    ///
    /// The session matching `initiator_id` is closed quietly; every other
    /// session is told it was terminated by another actor.
    pub fn close_all_sessions(&self, initiator_id: Option<&str>) -> usize {
        let sessions = self.store.drain();
        for session in &sessions {
            let reason = if Some(session.id().as_str()) == initiator_id {
                CloseReason::Explicit
            } else {
                CloseReason::Terminated
            };
            self.close_removed(session, reason);
        }
        info!(closed = sessions.len(), "Closed all sessions");
        sessions.len()
    }

    /// Close every session whose auth-manager session id is in
    /// `sm_session_ids`.
    pub fn close_sessions_by_external_ids<S>(&self, sm_session_ids: &[S]) -> usize
    where
        S: AsRef<str>,
    {
        let wanted: HashSet<&str> = sm_session_ids.iter().map(|id| id.as_ref()).collect();
        let sessions = self.store.remove_where(|session| {
            session
                .user_context()
                .sm_session_id()
                .is_some_and(|sm_id| wanted.contains(sm_id.as_str()))
        });
        for session in &sessions {
            self.close_removed(session, CloseReason::Terminated);
        }
        sessions.len()
    }

    /// Evict every session idle for at least `max_idle`.
    ///
    /// Works on a snapshot; each removal re-checks that the entry is still the
    /// same object and still idle, and the slow close runs outside the lock.
    pub fn evict_idle_sessions(&self, max_idle: Duration) -> usize {
        let max_idle_ms = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        let now = self.now();

        let expired: Vec<Arc<Session>> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|session| session.idle_millis(now) >= max_idle_ms)
            .filter(|session| {
                self.store
                    .remove_if_current(session, |s| s.idle_millis(now) >= max_idle_ms)
            })
            .collect();

        for session in &expired {
            debug!(session_id = %session.id(), "> Expire session");
            self.close_removed(session, CloseReason::IdleTimeout);
        }

        if !expired.is_empty() {
            info!(evicted = expired.len(), "Evicted idle sessions");
        }
        expired.len()
    }

    /// Evict idle sessions using the configured threshold.
    pub fn expire_idle_sessions(&self) -> usize {
        self.evict_idle_sessions(self.config.max_idle_time)
    }

    /// Push a state snapshot to every authenticated interactive session.
    ///
    /// A failure for one session is logged and does not stop the others.
    /// Returns the number of snapshots delivered.
    pub fn broadcast_session_states(&self) -> usize {
        let now = self.now();
        let mut delivered = 0;
        for session in self.store.snapshot() {
            if session.is_headless() || !session.is_authenticated() {
                continue;
            }
            let event = session.state_event(now, self.config.max_idle_time);
            match session.publish(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    error!(session_id = %session.id(), error = %e, "Failed to refresh session state");
                }
            }
        }
        delivered
    }

    /// Close every session belonging to a deleted user.
    ///
    /// Headless sessions this call removes get a [`SessionEvent::UserDeleted`]
    /// before they are closed. A session already closed by someone else is
    /// skipped without an event.
    pub fn close_sessions_for_deleted_user(&self, user_id: &str) -> usize {
        let owned_by_user =
            |session: &Session| session.user_context().user_id().as_deref() == Some(user_id);

        let mut closed = 0;
        for session in self.store.snapshot() {
            if !owned_by_user(&session) || !self.store.remove_if_current(&session, owned_by_user) {
                continue;
            }
            if session.is_headless() {
                session.notify(SessionEvent::UserDeleted {
                    user_id: user_id.to_string(),
                });
            }
            self.close_removed(&session, CloseReason::UserDeleted);
            closed += 1;
        }
        closed
    }

    /// Delete a user through the auth controller and close their sessions.
    ///
    /// Sessions are closed even when the auth controller no longer knows the
    /// user, so live sessions of an already deleted user do not outlive it.
    /// [`Error::UserNotFound`] is returned only when the user is unknown and
    /// nothing was closed.
    pub fn delete_user(&self, user_id: &str) -> Result<usize> {
        match self.auth.delete_user(user_id) {
            Ok(()) => {
                info!(user_id = %user_id, "User deleted");
                Ok(self.close_sessions_for_deleted_user(user_id))
            }
            Err(Error::UserNotFound(id)) => {
                let closed = self.close_sessions_for_deleted_user(user_id);
                if closed == 0 {
                    return Err(Error::UserNotFound(id));
                }
                warn!(user_id = %user_id, closed, "Closed sessions of unknown user");
                Ok(closed)
            }
            Err(e) => Err(e),
        }
    }

    /// Close every session; used when the registry is torn down.
    pub fn shutdown(&self) -> usize {
        let sessions = self.store.drain();
        for session in &sessions {
            self.close_removed(session, CloseReason::Shutdown);
        }
        info!(closed = sessions.len(), "Session manager shut down");
        sessions.len()
    }

    fn new_session(&self, id: &str, variant: SessionVariant, now: DateTime<Utc>) -> Session {
        let id = SessionId::from(id);
        let events = Arc::clone(&self.events);
        match variant {
            SessionVariant::Interactive => Session::interactive(id, now, events),
            SessionVariant::Headless => Session::headless(id, now, events),
        }
    }

    fn restore_into(&self, session: &Session) -> bool {
        match self.auth.restore_user_session(session.id().as_str()) {
            Ok(Some(info)) => {
                session.user_context().authenticate(&info);
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(session_id = %session.id(), error = %e, "Failed to restore previous user session");
                false
            }
        }
    }

    fn open_handlers(&self, session: &Session) {
        for handler in &self.handlers {
            if let Err(e) = handler.on_session_opened(session) {
                warn!(
                    session_id = %session.id(),
                    handler = handler.name(),
                    error = %e,
                    "Session handler failed on open"
                );
            }
        }
    }

    fn publish_started(&self, session: Arc<Session>) -> Result<Arc<Session>> {
        if session.is_valid() {
            session.notify(SessionEvent::SessionStarted);
        }
        // Closed while starting: the close already ran the handlers.
        if !session.is_valid() {
            debug!(session_id = %session.id(), "Session closed before it started");
            return Err(Error::SessionExpired(session.id().to_string()));
        }
        Ok(session)
    }

    fn close_removed(&self, session: &Session, reason: CloseReason) {
        if let Err(e) = session.close(reason, &self.handlers) {
            error!(session_id = %session.id(), error = %e, "Failed to close session cleanly");
        }
    }

    fn expect_variant(session: &Session, expected: SessionVariant) -> Result<()> {
        let found = session.variant();
        if found == expected {
            return Ok(());
        }
        warn!(session_id = %session.id(), %expected, %found, "Unexpected session type");
        Err(Error::SessionTypeConflict {
            id: session.id().to_string(),
            expected,
            found,
        })
    }
}

/// Information about a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Session ID
    pub session_id: SessionId,

    /// Session variant
    pub variant: SessionVariant,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last access time
    pub last_access_at: DateTime<Utc>,

    /// Milliseconds left before idle eviction
    pub remaining_time_ms: u64,

    /// Whether the session holds credentials
    pub authenticated: bool,

    /// Authenticated user
    pub user_id: Option<String>,

    /// Whether cached derived state must be rebuilt
    pub cache_expired: bool,
}

impl SessionInfo {
    fn new(session: &Session, now: DateTime<Utc>, max_idle: Duration) -> Self {
        Self {
            session_id: session.id().clone(),
            variant: session.variant(),
            created_at: session.created_at(),
            last_access_at: session.last_access_at(),
            remaining_time_ms: session.remaining_time_millis(now, max_idle),
            authenticated: session.is_authenticated(),
            user_id: session.user_context().user_id(),
            cache_expired: session.is_cache_expired(),
        }
    }
}
