//! # sessiond-core
//!
//! Core types for the sessiond session registry.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other sessiond crates. It provides:
//!
//! - Session identity types (SessionId, SessionVariant)
//! - The error taxonomy
//! - YAML configuration
//! - The auth collaborator contract (AuthController, AuthInfo, Permissions)
//! - Session events and the EventSink contract
//! - Clock sources
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other sessiond crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod session;

// Re-export commonly used types
pub use auth::{AuthController, AuthInfo, Permissions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AuthSettings, RegistryConfig, RestorableSessionConfig, ServerSettings, SessionSettings,
    TokenConfig,
};
pub use error::{Error, Result};
pub use event::{EventSink, NoopEventSink, SessionEvent};
pub use session::{SessionId, SessionVariant};
