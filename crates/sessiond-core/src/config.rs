//! Configuration types for sessiond.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use crate::{AuthInfo, Error};

/// Registry configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Session lifecycle settings
    pub sessions: SessionSettings,
    /// Seed data for the in-memory auth controller
    pub auth: AuthSettings,
}

impl RegistryConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: RegistryConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.sessions.max_idle_time_ms == 0 {
            return Err(Error::Config(
                "sessions.max_idle_time_ms must be > 0".to_string(),
            ));
        }

        if self.sessions.expire_check_interval_ms == 0 {
            return Err(Error::Config(
                "sessions.expire_check_interval_ms must be > 0".to_string(),
            ));
        }

        for token in &self.auth.tokens {
            token.validate()?;
        }

        for session in &self.auth.sessions {
            if session.session_id.trim().is_empty() {
                return Err(Error::Config(
                    "auth.sessions entry session_id cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Idle time after which a session is evicted, in milliseconds
    pub max_idle_time_ms: u64,
    /// Period of the idle eviction sweep, in milliseconds
    pub expire_check_interval_ms: u64,
    /// Period of session state broadcasts, in milliseconds (0 = disabled)
    pub state_broadcast_interval_ms: u64,
    /// Server is not configured yet; skip restoring prior sessions
    pub configuration_mode: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_idle_time_ms: 30 * 60 * 1000,
            expire_check_interval_ms: 60 * 1000,
            state_broadcast_interval_ms: 30 * 1000,
            configuration_mode: false,
        }
    }
}

impl SessionSettings {
    /// Idle threshold as a duration.
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    /// Eviction sweep period as a duration.
    pub fn expire_check_interval(&self) -> Duration {
        Duration::from_millis(self.expire_check_interval_ms)
    }

    /// Broadcast period, or `None` when broadcasting is disabled.
    pub fn state_broadcast_interval(&self) -> Option<Duration> {
        (self.state_broadcast_interval_ms > 0)
            .then(|| Duration::from_millis(self.state_broadcast_interval_ms))
    }
}

/// Seed data for the in-memory auth controller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthSettings {
    /// Known bearer tokens
    pub tokens: Vec<TokenConfig>,
    /// Previously authenticated transport sessions
    pub sessions: Vec<RestorableSessionConfig>,
}

/// A bearer token and what it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token value
    pub token: String,
    /// Auth-manager session id
    pub sm_session_id: String,
    /// Owning user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Granted permissions
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl TokenConfig {
    /// Validate the token entry.
    pub fn validate(&self) -> crate::Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::Config("auth token cannot be empty".to_string()));
        }
        if self.sm_session_id.trim().is_empty() {
            return Err(Error::Config(format!(
                "auth token for '{}' has an empty sm_session_id",
                self.user_id.as_deref().unwrap_or("<anonymous>")
            )));
        }
        Ok(())
    }
}

/// A transport session whose authentication can be restored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorableSessionConfig {
    /// Transport session id
    pub session_id: String,
    /// Recorded authentication
    #[serde(flatten)]
    pub auth: AuthInfo,
}
