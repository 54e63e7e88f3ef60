//! Per-session authentication state.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use sessiond_core::{AuthInfo, Permissions};

/// Credentials currently held by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCredentials {
    /// Access token issued by the auth controller
    pub access_token: String,
    /// Refresh token, if issued
    pub refresh_token: Option<String>,
}

/// Copy of a user context at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserState {
    /// Authenticated user
    pub user_id: Option<String>,
    /// Auth-manager session id
    pub sm_session_id: Option<String>,
    /// Active credentials
    pub credentials: Option<UserCredentials>,
    /// Granted permissions
    pub permissions: BTreeSet<String>,
}

/// Authentication context owned by exactly one session.
///
/// Concurrent requests for the same session share this object, so every
/// mutation happens under its own lock and credential refreshes are
/// compare-then-update.
#[derive(Debug, Default)]
pub struct UserContext {
    state: RwLock<UserState>,
}

impl UserContext {
    /// Create an unauthenticated context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb authentication restored from a previous session.
    pub fn authenticate(&self, info: &AuthInfo) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.user_id = info.user_id.clone();
        state.sm_session_id = Some(info.sm_session_id.clone());
        state.credentials = Some(UserCredentials {
            access_token: info.access_token.clone(),
            refresh_token: info.refresh_token.clone(),
        });
        state.permissions = info.permissions.clone();
    }

    /// Replace credentials and permissions unconditionally.
    pub fn refresh(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
        permissions: &Permissions,
    ) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::apply(&mut state, access_token, refresh_token, permissions);
    }

    /// Refresh only if `access_token` differs from the active one.
    ///
    /// Returns `true` when the context was updated.
    pub fn refresh_if_changed(&self, access_token: &str, permissions: &Permissions) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let unchanged = state
            .credentials
            .as_ref()
            .is_some_and(|creds| creds.access_token == access_token);
        if unchanged {
            return false;
        }
        Self::apply(&mut state, access_token, None, permissions);
        true
    }

    fn apply(
        state: &mut UserState,
        access_token: &str,
        refresh_token: Option<String>,
        permissions: &Permissions,
    ) {
        state.user_id = permissions.user_id.clone();
        state.sm_session_id = Some(permissions.session_id.clone());
        state.credentials = Some(UserCredentials {
            access_token: access_token.to_string(),
            refresh_token,
        });
        state.permissions = permissions.permissions.clone();
    }

    /// Drop all credentials.
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = UserState::default();
    }

    /// Whether the context holds active credentials.
    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .credentials
            .is_some()
    }

    /// Authenticated user id.
    pub fn user_id(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user_id
            .clone()
    }

    /// Auth-manager session id.
    pub fn sm_session_id(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sm_session_id
            .clone()
    }

    /// Active access token.
    pub fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .credentials
            .as_ref()
            .map(|creds| creds.access_token.clone())
    }

    /// Copy the whole state.
    pub fn snapshot(&self) -> UserState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
