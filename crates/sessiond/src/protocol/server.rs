//! Registry Server Implementation
//!
//! Routes driver requests to the session manager and writes responses and
//! session events back as JSON lines.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use sessiond_core::Result;
use sessiond_registry::{EventEnvelope, Session, SessionManager};

use crate::messages::{EventLine, Request, Response};

/// Registry Server
///
/// Thin front of a shared [`SessionManager`]. Cloning is cheap.
#[derive(Clone)]
pub struct RegistryServer {
    manager: Arc<SessionManager>,
}

impl RegistryServer {
    /// Create a server over `manager`.
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// The session manager requests are routed to.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Execute one request.
    #[instrument(skip_all)]
    pub fn handle(&self, request: Request) -> Response {
        debug!(op = request.op(), "Handling request");
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Request failed");
                Response::from(e)
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        let manager = &self.manager;
        match request {
            Request::Resolve {
                session_id,
                is_new,
                error_if_missing,
                locale,
                action_parameters,
            } => {
                let session = manager.resolve_session(&session_id, is_new, error_if_missing)?;
                manager.update_client_state(&session, locale, action_parameters)?;
                self.session_result(Some(session))
            }
            Request::Restore { session_id } => {
                let session = manager.get_or_restore_session(&session_id)?;
                self.session_result(session)
            }
            Request::Headless {
                token,
                session_id,
                create,
            } => {
                let session =
                    manager.get_or_create_headless_session(&token, session_id.as_deref(), create)?;
                self.session_result(session)
            }
            Request::Find {
                session_id,
                error_if_missing,
            } => {
                let session = manager.find_session(&session_id, error_if_missing)?;
                self.session_result(session)
            }
            Request::Close { session_id } => {
                let closed = manager.close_session(&session_id).is_some();
                Ok(Response::success(json!({ "closed": closed })))
            }
            Request::CloseAll { initiator } => {
                let closed = manager.close_all_sessions(initiator.as_deref());
                Ok(Response::success(json!({ "closed": closed })))
            }
            Request::CloseExternal { sm_session_ids } => {
                let closed = manager.close_sessions_by_external_ids(&sm_session_ids);
                Ok(Response::success(json!({ "closed": closed })))
            }
            Request::DeleteUser { user_id } => {
                let closed = manager.delete_user(&user_id)?;
                Ok(Response::success(json!({ "closed": closed })))
            }
            Request::List => {
                let sessions = manager.list_sessions();
                Ok(Response::success(json!({
                    "count": sessions.len(),
                    "sessions": serde_json::to_value(&sessions)?,
                })))
            }
            Request::Evict { max_idle_ms } => {
                let evicted = match max_idle_ms {
                    Some(ms) => manager.evict_idle_sessions(Duration::from_millis(ms)),
                    None => manager.expire_idle_sessions(),
                };
                Ok(Response::success(json!({ "evicted": evicted })))
            }
            Request::Broadcast => {
                let delivered = manager.broadcast_session_states();
                Ok(Response::success(json!({ "delivered": delivered })))
            }
        }
    }

    fn session_result(&self, session: Option<Arc<Session>>) -> Result<Response> {
        let value = match session {
            Some(session) => serde_json::to_value(self.manager.describe(&session))?,
            None => serde_json::Value::Null,
        };
        Ok(Response::success(value))
    }

    /// Parse and execute one request line on the blocking pool.
    pub async fn handle_line(&self, line: &str) -> Response {
        let request = match serde_json::from_str::<Request>(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed request");
                return Response::failure("invalid_request", e.to_string());
            }
        };

        let server = self.clone();
        match tokio::task::spawn_blocking(move || server.handle(request)).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Request handler panicked");
                Response::failure("internal", e.to_string())
            }
        }
    }

    /// Serve requests from `reader` until it reaches EOF.
    ///
    /// Events raised while a request runs are written before its response;
    /// events raised in the background are written as they arrive.
    pub async fn serve<R, W>(
        &self,
        reader: R,
        mut writer: W,
        mut events: mpsc::UnboundedReceiver<EventEnvelope>,
    ) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut handled = 0usize;

        loop {
            tokio::select! {
                biased;

                Some(envelope) = events.recv() => {
                    write_line(&mut writer, &EventLine { event: &envelope }).await?;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let response = self.handle_line(&line).await;
                    while let Ok(envelope) = events.try_recv() {
                        write_line(&mut writer, &EventLine { event: &envelope }).await?;
                    }
                    write_line(&mut writer, &response).await?;
                    handled += 1;
                }
            }
        }

        while let Ok(envelope) = events.try_recv() {
            write_line(&mut writer, &EventLine { event: &envelope }).await?;
        }
        writer.flush().await?;
        info!(handled, "Driver input closed");
        Ok(())
    }
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessiond_core::NoopEventSink;
    use sessiond_registry::InMemoryAuthController;

    fn server() -> RegistryServer {
        let manager = SessionManager::new(
            Arc::new(InMemoryAuthController::new()),
            Arc::new(NoopEventSink),
        );
        RegistryServer::new(Arc::new(manager))
    }

    #[test]
    fn test_resolve_then_list() {
        let server = server();
        let response = server.handle(Request::Resolve {
            session_id: "http-1".to_string(),
            is_new: true,
            error_if_missing: true,
            locale: None,
            action_parameters: None,
        });
        assert!(response.ok);
        assert_eq!(response.result.unwrap()["session_id"], "http-1");

        let response = server.handle(Request::List);
        assert_eq!(response.result.unwrap()["count"], 1);
    }

    #[test]
    fn test_resolve_expired() {
        let response = server().handle(Request::Resolve {
            session_id: "http-1".to_string(),
            is_new: false,
            error_if_missing: true,
            locale: None,
            action_parameters: None,
        });
        assert!(!response.ok);
        assert_eq!(response.error_kind(), Some("session_expired"));
    }

    #[test]
    fn test_restore_nothing_is_null() {
        let response = server().handle(Request::Restore {
            session_id: "http-1".to_string(),
        });
        assert!(response.ok);
        assert_eq!(response.result, Some(serde_json::Value::Null));
    }

    #[test]
    fn test_close_unknown() {
        let response = server().handle(Request::Close {
            session_id: "nope".to_string(),
        });
        assert_eq!(response.result.unwrap()["closed"], false);
    }
}
