//! Registered sessions and their variant-specific state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use sessiond_core::{Error, EventSink, Result, SessionEvent, SessionId, SessionVariant};

use crate::handler::{CloseReason, SessionHandler};
use crate::user_context::UserContext;

/// Browser-side state carried only by interactive sessions.
#[derive(Debug, Default)]
pub struct InteractiveState {
    locale: RwLock<Option<String>>,
    action_parameters: RwLock<BTreeMap<String, Value>>,
}

impl InteractiveState {
    /// Client locale.
    pub fn locale(&self) -> Option<String> {
        self.locale
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the client locale.
    pub fn set_locale(&self, locale: Option<String>) {
        *self.locale.write().unwrap_or_else(PoisonError::into_inner) = locale;
    }

    /// Pending UI action parameters.
    pub fn action_parameters(&self) -> BTreeMap<String, Value> {
        self.action_parameters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the pending UI action parameters.
    pub fn set_action_parameters(&self, parameters: BTreeMap<String, Value>) {
        *self
            .action_parameters
            .write()
            .unwrap_or_else(PoisonError::into_inner) = parameters;
    }
}

/// Variant tag plus variant-specific state.
#[derive(Debug)]
pub enum SessionKind {
    /// Bound to a browser transport session
    Interactive(InteractiveState),
    /// Bound only to a bearer token
    Headless,
}

impl SessionKind {
    /// The variant tag.
    pub fn variant(&self) -> SessionVariant {
        match self {
            SessionKind::Interactive(_) => SessionVariant::Interactive,
            SessionKind::Headless => SessionVariant::Headless,
        }
    }
}

/// A session held by the registry.
///
/// Shared as `Arc<Session>`; every mutable field is internally synchronized.
pub struct Session {
    id: SessionId,
    kind: SessionKind,
    created_at: DateTime<Utc>,
    last_access_ms: AtomicI64,
    valid: AtomicBool,
    cache_expired: AtomicBool,
    user_context: UserContext,
    events: Arc<dyn EventSink>,
}

impl Session {
    /// Create an interactive session.
    pub fn interactive(id: SessionId, now: DateTime<Utc>, events: Arc<dyn EventSink>) -> Self {
        Self::with_kind(
            id,
            SessionKind::Interactive(InteractiveState::default()),
            now,
            events,
        )
    }

    /// Create a headless session.
    pub fn headless(id: SessionId, now: DateTime<Utc>, events: Arc<dyn EventSink>) -> Self {
        Self::with_kind(id, SessionKind::Headless, now, events)
    }

    fn with_kind(
        id: SessionId,
        kind: SessionKind,
        now: DateTime<Utc>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        debug!(session_id = %id, variant = %kind.variant(), "Creating session");
        Self {
            id,
            kind,
            created_at: now,
            last_access_ms: AtomicI64::new(now.timestamp_millis()),
            valid: AtomicBool::new(true),
            cache_expired: AtomicBool::new(false),
            user_context: UserContext::new(),
            events,
        }
    }

    /// Get the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Get the variant tag.
    pub fn variant(&self) -> SessionVariant {
        self.kind.variant()
    }

    /// Get the variant and its state.
    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    /// Interactive state, if this is an interactive session.
    pub fn interactive_state(&self) -> Option<&InteractiveState> {
        match &self.kind {
            SessionKind::Interactive(state) => Some(state),
            SessionKind::Headless => None,
        }
    }

    /// Whether this is a headless session.
    pub fn is_headless(&self) -> bool {
        matches!(self.kind, SessionKind::Headless)
    }

    /// Get the session creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last time the session was looked up or touched.
    pub fn last_access_at(&self) -> DateTime<Utc> {
        let millis = self.last_access_ms.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(self.created_at)
    }

    /// Record an access. Never moves the access time backwards.
    pub fn touch(&self, now: DateTime<Utc>) {
        self.last_access_ms
            .fetch_max(now.timestamp_millis(), Ordering::AcqRel);
    }

    /// Milliseconds since the last access.
    pub fn idle_millis(&self, now: DateTime<Utc>) -> u64 {
        let idle = now.timestamp_millis() - self.last_access_ms.load(Ordering::Acquire);
        u64::try_from(idle).unwrap_or(0)
    }

    /// Milliseconds left before the session crosses `max_idle`.
    pub fn remaining_time_millis(&self, now: DateTime<Utc>, max_idle: Duration) -> u64 {
        let max_idle = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        max_idle.saturating_sub(self.idle_millis(now))
    }

    /// Whether the session has not been closed.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Whether cached derived state must be rebuilt.
    pub fn is_cache_expired(&self) -> bool {
        self.cache_expired.load(Ordering::Acquire)
    }

    /// Mark cached derived state as stale or fresh.
    pub fn set_cache_expired(&self, expired: bool) {
        self.cache_expired.store(expired, Ordering::Release);
    }

    /// Authentication state of this session.
    pub fn user_context(&self) -> &UserContext {
        &self.user_context
    }

    /// Whether the session holds active credentials.
    pub fn is_authenticated(&self) -> bool {
        self.user_context.is_authenticated()
    }

    /// Push an event to this session's client.
    pub fn publish(&self, event: SessionEvent) -> Result<()> {
        self.events.publish(self.id.as_str(), event)
    }

    /// Push an event, logging instead of returning a failure.
    pub fn notify(&self, event: SessionEvent) {
        if let Err(e) = self.publish(event) {
            warn!(session_id = %self.id, error = %e, "Failed to publish session event");
        }
    }

    /// Snapshot of the session state for the client.
    pub fn state_event(&self, now: DateTime<Utc>, max_idle: Duration) -> SessionEvent {
        let (locale, action_parameters) = match &self.kind {
            SessionKind::Interactive(state) => (state.locale(), state.action_parameters()),
            SessionKind::Headless => (None, BTreeMap::new()),
        };
        SessionEvent::SessionState {
            last_accessed_at: self.last_access_at(),
            remaining_time_ms: self.remaining_time_millis(now, max_idle),
            valid: self.is_valid(),
            cache_expired: self.is_cache_expired(),
            locale,
            action_parameters,
        }
    }

    /// Invalidate the session and release what it holds.
    ///
    /// Only the first call does anything. Every handler runs even if an
    /// earlier one fails; the first failure is returned.
    pub(crate) fn close(
        &self,
        reason: CloseReason,
        handlers: &[Arc<dyn SessionHandler>],
    ) -> Result<()> {
        if !self.valid.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(session_id = %self.id, ?reason, "Closing session");

        if reason.notifies_client() {
            self.notify(SessionEvent::SessionExpired);
        }

        let mut first_error = None;
        for handler in handlers {
            if let Err(e) = handler.on_session_closed(self, reason) {
                warn!(
                    session_id = %self.id,
                    handler = handler.name(),
                    error = %e,
                    "Session handler failed on close"
                );
                first_error.get_or_insert(Error::Handler {
                    handler: handler.name().to_string(),
                    message: e.to_string(),
                });
            }
        }

        self.user_context.reset();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("variant", &self.variant())
            .field("created_at", &self.created_at)
            .field("last_access_at", &self.last_access_at())
            .field("valid", &self.is_valid())
            .field("cache_expired", &self.is_cache_expired())
            .finish_non_exhaustive()
    }
}
