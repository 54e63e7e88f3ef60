//! Contract with the external authentication controller.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Permission set resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Auth-manager session id the token belongs to
    pub session_id: String,
    /// Owning user, if the token is bound to one
    #[serde(default)]
    pub user_id: Option<String>,
    /// Granted permissions
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Permissions {
    /// Create a permission set for an auth-manager session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            permissions: BTreeSet::new(),
        }
    }

    /// Bind the set to a user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Add a granted permission.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

/// Authentication state recovered for a session id that was logged in before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// Auth-manager session id
    pub sm_session_id: String,
    /// Authenticated user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Active access token
    pub access_token: String,
    /// Refresh token, if issued
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted permissions
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

/// Authentication collaborator the registry delegates to.
///
/// Implementations own all persistent "who is logged in" state; the registry
/// only asks questions and never stores anything on their behalf.
pub trait AuthController: Send + Sync {
    /// Recover prior authentication for a transport session id.
    ///
    /// Returns `Ok(None)` when nothing was recorded for `session_id`.
    fn restore_user_session(&self, session_id: &str) -> Result<Option<AuthInfo>>;

    /// Resolve the permissions a bearer token grants.
    ///
    /// Fails with [`crate::Error::InvalidToken`] for unknown or expired tokens.
    fn resolve_permissions(&self, token: &str) -> Result<Permissions>;

    /// Delete a user from the backing store.
    fn delete_user(&self, user_id: &str) -> Result<()>;
}
