//! Driver Request and Response Types
//!
//! One JSON object per line in each direction. Requests are tagged by
//! `op`; every request gets exactly one [`Response`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sessiond_core::Error;
use sessiond_registry::EventEnvelope;

fn default_true() -> bool {
    true
}

// =============================================================================
// Requests
// =============================================================================

/// A request read from the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Resolve the interactive session behind a transport session id
    Resolve {
        /// Transport session id
        session_id: String,

        /// Whether the transport session was just created
        #[serde(default)]
        is_new: bool,

        /// Fail instead of creating an unauthenticated session
        #[serde(default = "default_true")]
        error_if_missing: bool,

        /// Client locale reported by the browser
        #[serde(default)]
        locale: Option<String>,

        /// UI action parameters reported by the browser
        #[serde(default)]
        action_parameters: Option<BTreeMap<String, Value>>,
    },

    /// Return a registered interactive session or restore it
    Restore {
        /// Transport session id
        session_id: String,
    },

    /// Return or create the headless session for a bearer token
    Headless {
        /// Bearer token
        token: String,

        /// Session id to use instead of the token's auth-manager session id
        #[serde(default)]
        session_id: Option<String>,

        /// Create the session if it is not registered
        #[serde(default = "default_true")]
        create: bool,
    },

    /// Look up a registered interactive session
    Find {
        /// Transport session id
        session_id: String,

        /// Fail when nothing is registered
        #[serde(default)]
        error_if_missing: bool,
    },

    /// Close one session
    Close {
        /// Session id
        session_id: String,
    },

    /// Close every session
    CloseAll {
        /// Session that asked for it; it is not told it was terminated
        #[serde(default)]
        initiator: Option<String>,
    },

    /// Close sessions by auth-manager session id
    CloseExternal {
        /// Auth-manager session ids
        sm_session_ids: Vec<String>,
    },

    /// Delete a user and close their sessions
    DeleteUser {
        /// User id
        user_id: String,
    },

    /// List registered sessions
    List,

    /// Run an idle eviction pass
    Evict {
        /// Idle threshold; defaults to the configured one
        #[serde(default)]
        max_idle_ms: Option<u64>,
    },

    /// Push state snapshots to authenticated interactive sessions
    Broadcast,
}

impl Request {
    /// The `op` tag of this request.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Resolve { .. } => "resolve",
            Request::Restore { .. } => "restore",
            Request::Headless { .. } => "headless",
            Request::Find { .. } => "find",
            Request::Close { .. } => "close",
            Request::CloseAll { .. } => "close_all",
            Request::CloseExternal { .. } => "close_external",
            Request::DeleteUser { .. } => "delete_user",
            Request::List => "list",
            Request::Evict { .. } => "evict",
            Request::Broadcast => "broadcast",
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Error body of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error kind
    pub kind: String,

    /// Human-readable message
    pub message: String,
}

/// Reply to one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request succeeded
    pub ok: bool,

    /// Operation result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// A successful response carrying `result`.
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// A failed response with an explicit kind.
    pub fn failure(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                kind: kind.to_string(),
                message: message.into(),
            }),
        }
    }

    /// Kind of the failure, if this is one.
    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|error| error.kind.as_str())
    }
}

impl From<Error> for Response {
    fn from(error: Error) -> Self {
        Self::failure(error.kind(), error.to_string())
    }
}

/// Output line carrying an event for the driver.
#[derive(Debug, Serialize)]
pub struct EventLine<'a> {
    /// The addressed event
    pub event: &'a EventEnvelope,
}
