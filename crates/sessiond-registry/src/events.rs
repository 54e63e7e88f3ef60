//! Channel-backed event sink.

use serde::Serialize;
use tokio::sync::mpsc;

use sessiond_core::{Error, EventSink, Result, SessionEvent};

/// An event addressed to one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    /// Target session
    pub session_id: String,
    /// The event
    pub event: SessionEvent,
}

/// Event sink that forwards into an unbounded channel.
///
/// Publishing never blocks; it only fails once the receiving side is gone.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, session_id: &str, event: SessionEvent) -> Result<()> {
        self.tx
            .send(EventEnvelope {
                session_id: session_id.to_string(),
                event,
            })
            .map_err(|_| Error::EventDispatch("event receiver closed".to_string()))
    }
}
