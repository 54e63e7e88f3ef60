//! Concurrency-safe map from session id to session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sessiond_core::SessionId;

use crate::session::Session;

/// Outcome of [`SessionStore::get_or_try_insert_with`].
#[derive(Debug, Clone)]
pub enum Lookup {
    /// A session was already registered under the id
    Existing(Arc<Session>),
    /// The factory ran and its session was registered
    Created(Arc<Session>),
    /// Nothing was registered and the factory declined to create one
    Vacant,
}

/// The single source of truth for which sessions exist in memory.
///
/// One mutex guards the whole map. Every observe-then-modify operation runs
/// inside one critical section, so at most one session object ever exists per
/// id and a factory never runs twice for the same vacant id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a session by ID.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.lock().get(id).cloned()
    }

    /// Return the registered session or register the one `factory` builds.
    ///
    /// The factory runs under the store lock, at most once, and only when `id`
    /// is vacant. It may decline (`Ok(None)`) or fail; neither registers
    /// anything.
    pub fn get_or_try_insert_with<F, E>(&self, id: &str, factory: F) -> Result<Lookup, E>
    where
        F: FnOnce() -> Result<Option<Session>, E>,
    {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(id) {
            return Ok(Lookup::Existing(Arc::clone(existing)));
        }

        match factory()? {
            Some(session) => {
                debug_assert_eq!(session.id().as_str(), id);
                let session = Arc::new(session);
                sessions.insert(SessionId::from(id), Arc::clone(&session));
                Ok(Lookup::Created(session))
            }
            None => Ok(Lookup::Vacant),
        }
    }

    /// Return the registered session or register the one `factory` builds.
    pub fn put_if_absent_with<F>(&self, id: &str, factory: F) -> Arc<Session>
    where
        F: FnOnce() -> Session,
    {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(id) {
            return Arc::clone(existing);
        }
        let session = Arc::new(factory());
        debug_assert_eq!(session.id().as_str(), id);
        sessions.insert(SessionId::from(id), Arc::clone(&session));
        session
    }

    /// Remove a session by ID.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.lock().remove(id)
    }

    /// Remove `session` only if it is still the object registered under its id
    /// and `predicate` still holds for it.
    pub fn remove_if_current<P>(&self, session: &Arc<Session>, predicate: P) -> bool
    where
        P: FnOnce(&Session) -> bool,
    {
        let mut sessions = self.lock();
        let current = sessions
            .get(session.id().as_str())
            .is_some_and(|registered| Arc::ptr_eq(registered, session));
        if current && predicate(session) {
            sessions.remove(session.id().as_str());
            true
        } else {
            false
        }
    }

    /// Remove every session matching `predicate` in one critical section.
    pub fn remove_where<P>(&self, mut predicate: P) -> Vec<Arc<Session>>
    where
        P: FnMut(&Session) -> bool,
    {
        let mut sessions = self.lock();
        let ids: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, session)| predicate(session))
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| sessions.remove(id.as_str()))
            .collect()
    }

    /// Remove and return every session.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.lock().drain().map(|(_, session)| session).collect()
    }

    /// Copy out every registered session.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.lock().values().cloned().collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
