//! Races on first access to the same session id.

mod common;

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use sessiond_core::{Error, EventSink, Permissions, Result, SessionEvent};
use sessiond_registry::{
    CloseReason, InMemoryAuthController, Session, SessionHandler, SessionManager,
};

use common::{auth_info, fixture};

const RACERS: usize = 16;

fn race<F>(manager: &Arc<SessionManager>, op: F) -> Vec<Arc<Session>>
where
    F: Fn(&SessionManager) -> Arc<Session> + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(RACERS));
    let op = Arc::new(op);
    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let manager = Arc::clone(manager);
            let barrier = Arc::clone(&barrier);
            let op = Arc::clone(&op);
            thread::spawn(move || {
                barrier.wait();
                (*op)(&*manager)
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().expect("racer panicked"))
        .collect()
}

fn assert_all_same(sessions: &[Arc<Session>]) {
    let first = &sessions[0];
    for session in sessions {
        assert!(
            Arc::ptr_eq(first, session),
            "two distinct objects handed out for {}",
            first.id()
        );
    }
}

#[test]
fn test_concurrent_resolve_returns_one_object() {
    let fx = fixture();
    fx.auth.register_session("http-1", auth_info("alice", "sm-1"));

    let sessions = race(&fx.manager, |manager| {
        manager.resolve_session("http-1", false, true).unwrap()
    });

    assert_all_same(&sessions);
    assert_eq!(fx.manager.session_count(), 1);
}

#[test]
fn test_concurrent_resolve_constructs_once() {
    let fx = fixture();

    race(&fx.manager, |manager| {
        manager.resolve_session("fresh", true, false).unwrap()
    });

    assert_eq!(fx.auth.restore_calls(), 1);
    assert_eq!(fx.handler.opened(), 1);
}

#[test]
fn test_concurrent_restore_constructs_once() {
    let fx = fixture();
    fx.auth.register_session("http-2", auth_info("bob", "sm-2"));

    let sessions = race(&fx.manager, |manager| {
        manager.get_or_restore_session("http-2").unwrap().unwrap()
    });

    assert_all_same(&sessions);
    assert_eq!(fx.auth.restore_calls(), 1);
    assert_eq!(fx.handler.opened(), 1);
}

#[test]
fn test_concurrent_headless_creation_constructs_once() {
    let fx = fixture();
    fx.auth
        .register_token("bot-token", Permissions::new("sm-bot").with_user("bot"));

    let sessions = race(&fx.manager, |manager| {
        manager
            .get_or_create_headless_session("bot-token", None, true)
            .unwrap()
            .unwrap()
    });

    assert_all_same(&sessions);
    assert!(sessions[0].is_headless());
    assert_eq!(fx.handler.opened(), 1);
}

#[test]
fn test_concurrent_mixed_ids_stay_distinct() {
    let fx = fixture();
    let ids: Vec<String> = (0..8).map(|i| format!("tab-{i}")).collect();

    let barrier = Arc::new(Barrier::new(ids.len() * 2));
    let handles: Vec<_> = ids
        .iter()
        .chain(ids.iter())
        .cloned()
        .map(|id| {
            let manager = Arc::clone(&fx.manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.resolve_session(&id, true, true).unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("racer panicked");
    }

    assert_eq!(fx.manager.session_count(), ids.len());
    assert_eq!(fx.handler.opened(), ids.len());
}

#[test]
fn test_concurrent_close_hands_session_to_one_closer() {
    let fx = fixture();
    fx.manager.resolve_session("http-1", true, true).unwrap();

    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let manager = Arc::clone(&fx.manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.close_session("http-1").is_some()
            })
        })
        .collect();

    let closers = handles
        .into_iter()
        .map(|handle| handle.join().expect("closer panicked"))
        .filter(|closed| *closed)
        .count();
    assert_eq!(closers, 1);
    assert_eq!(fx.manager.session_count(), 0);
}

/// Sink that parks the publisher of a start event until released.
struct PausingSink {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl EventSink for PausingSink {
    fn publish(&self, _session_id: &str, event: SessionEvent) -> Result<()> {
        if event == SessionEvent::SessionStarted {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        Ok(())
    }
}

/// Handler logging open and close calls in the order they happen.
#[derive(Default)]
struct OrderingHandler {
    calls: Mutex<Vec<String>>,
}

impl SessionHandler for OrderingHandler {
    fn name(&self) -> &str {
        "ordering"
    }

    fn on_session_opened(&self, session: &Session) -> Result<()> {
        let call = format!("opened valid={}", session.is_valid());
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn on_session_closed(&self, _session: &Session, reason: CloseReason) -> Result<()> {
        self.calls.lock().unwrap().push(format!("closed {reason:?}"));
        Ok(())
    }
}

#[test]
fn test_close_during_start_runs_open_before_close() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let sink = Arc::new(PausingSink {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let handler = Arc::new(OrderingHandler::default());
    let manager = Arc::new(
        SessionManager::new(Arc::new(InMemoryAuthController::new()), sink)
            .with_handler(handler.clone()),
    );

    let resolver = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.resolve_session("s", true, true))
    };

    entered_rx.recv().unwrap();
    assert!(manager.get_session("s").is_some());
    assert!(manager.close_session("s").is_some());
    release_tx.send(()).unwrap();

    let result = resolver.join().expect("resolver panicked");
    assert!(matches!(result, Err(Error::SessionExpired(_))));
    assert_eq!(
        *handler.calls.lock().unwrap(),
        vec!["opened valid=true".to_string(), "closed Explicit".to_string()]
    );
    assert_eq!(manager.session_count(), 0);
}
