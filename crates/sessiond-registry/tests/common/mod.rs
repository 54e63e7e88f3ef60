//! Fakes shared by the registry integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use sessiond_core::{AuthInfo, Error, EventSink, ManualClock, Result, SessionEvent};
use sessiond_registry::{
    CloseReason, InMemoryAuthController, Session, SessionHandler, SessionManager,
    SessionManagerConfig,
};

/// Sink that records every event and can be told to reject some sessions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, SessionEvent)>>,
    rejected: Mutex<HashSet<String>>,
}

impl RecordingSink {
    pub fn reject(&self, session_id: &str) {
        self.rejected.lock().unwrap().insert(session_id.to_string());
    }

    pub fn events_for(&self, session_id: &str) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn count_matching(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| pred(event))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, session_id: &str, event: SessionEvent) -> Result<()> {
        if self.rejected.lock().unwrap().contains(session_id) {
            return Err(Error::EventDispatch(format!("client {session_id} gone")));
        }
        self.events
            .lock()
            .unwrap()
            .push((session_id.to_string(), event));
        Ok(())
    }
}

/// Handler counting opens/closes and failing closes for chosen sessions.
#[derive(Default)]
pub struct CountingHandler {
    opened: AtomicUsize,
    closed: Mutex<Vec<(String, CloseReason)>>,
    failing: Mutex<HashSet<String>>,
}

impl CountingHandler {
    pub fn fail_on(&self, session_id: &str) {
        self.failing.lock().unwrap().insert(session_id.to_string());
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_reason(&self, session_id: &str) -> Option<CloseReason> {
        self.closed
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == session_id)
            .map(|(_, reason)| *reason)
    }
}

impl SessionHandler for CountingHandler {
    fn name(&self) -> &str {
        "counting"
    }

    fn on_session_opened(&self, _session: &Session) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_session_closed(&self, session: &Session, reason: CloseReason) -> Result<()> {
        let id = session.id().to_string();
        self.closed.lock().unwrap().push((id.clone(), reason));
        if self.failing.lock().unwrap().contains(&id) {
            return Err(Error::Other(format!("cannot release resources of {id}")));
        }
        Ok(())
    }
}

/// Everything a test needs to poke at a manager.
pub struct Fixture {
    pub manager: Arc<SessionManager>,
    pub auth: Arc<InMemoryAuthController>,
    pub sink: Arc<RecordingSink>,
    pub handler: Arc<CountingHandler>,
    pub clock: Arc<ManualClock>,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn fixture() -> Fixture {
    fixture_with(SessionManagerConfig::default())
}

pub fn fixture_with(config: SessionManagerConfig) -> Fixture {
    let auth = Arc::new(InMemoryAuthController::new());
    let sink = Arc::new(RecordingSink::default());
    let handler = Arc::new(CountingHandler::default());
    let clock = Arc::new(ManualClock::new(t0()));
    let manager = SessionManager::with_config(auth.clone(), sink.clone(), config)
        .with_handler(handler.clone())
        .with_clock(clock.clone());
    Fixture {
        manager: Arc::new(manager),
        auth,
        sink,
        handler,
        clock,
    }
}

pub fn auth_info(user: &str, sm_session_id: &str) -> AuthInfo {
    AuthInfo {
        sm_session_id: sm_session_id.to_string(),
        user_id: Some(user.to_string()),
        access_token: format!("token-{user}-{sm_session_id}"),
        refresh_token: None,
        permissions: BTreeSet::new(),
    }
}
