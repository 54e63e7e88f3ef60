//! In-memory auth controller.
//!
//! Backs the sessiond binary with seed data from the YAML config, and stands
//! in for a real auth backend in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use sessiond_core::{AuthController, AuthInfo, AuthSettings, Error, Permissions, Result};

/// Auth controller holding tokens and restorable sessions in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuthController {
    tokens: RwLock<HashMap<String, Permissions>>,
    sessions: RwLock<HashMap<String, AuthInfo>>,
    restore_calls: AtomicUsize,
}

impl InMemoryAuthController {
    /// Create an empty controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller seeded from configuration.
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let controller = Self::new();
        for token in &settings.tokens {
            let permissions = Permissions {
                session_id: token.sm_session_id.clone(),
                user_id: token.user_id.clone(),
                permissions: token.permissions.clone(),
            };
            controller.register_token(&token.token, permissions);
        }
        for session in &settings.sessions {
            controller.register_session(&session.session_id, session.auth.clone());
        }
        controller
    }

    /// Accept `token` as granting `permissions`.
    pub fn register_token(&self, token: &str, permissions: Permissions) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string(), permissions);
    }

    /// Stop accepting `token`.
    pub fn revoke_token(&self, token: &str) -> bool {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }

    /// Record authentication restorable for a transport session id.
    pub fn register_session(&self, session_id: &str, info: AuthInfo) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), info);
    }

    /// Number of `restore_user_session` calls served so far.
    pub fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::SeqCst)
    }
}

impl AuthController for InMemoryAuthController {
    fn restore_user_session(&self, session_id: &str) -> Result<Option<AuthInfo>> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned())
    }

    fn resolve_permissions(&self, token: &str) -> Result<Permissions> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or_else(|| Error::InvalidToken("unknown or expired token".to_string()))
    }

    fn delete_user(&self, user_id: &str) -> Result<()> {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        let before = tokens.len() + sessions.len();
        tokens.retain(|_, perms| perms.user_id.as_deref() != Some(user_id));
        sessions.retain(|_, info| info.user_id.as_deref() != Some(user_id));
        let removed = before - tokens.len() - sessions.len();

        if removed == 0 {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        debug!(user_id = %user_id, removed, "Removed user credentials");
        Ok(())
    }
}
