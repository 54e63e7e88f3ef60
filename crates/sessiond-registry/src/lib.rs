//! # sessiond-registry
//!
//! Session registry and lifecycle management for sessiond.
//!
//! This crate provides:
//! - Interactive and headless sessions with per-session auth state
//! - The session store (one object per id, ever)
//! - Session creation, restore, lookup and closing
//! - Idle eviction and state broadcasts on a schedule
//! - Nested task progress reporting
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on sessiond-core and
//! talks to the auth controller and event sink only through the traits
//! defined there.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod handler;
pub mod manager;
pub mod memory;
pub mod progress;
pub mod session;
pub mod store;
pub mod sweeper;
pub mod user_context;

// Re-export commonly used types
pub use events::{ChannelEventSink, EventEnvelope};
pub use handler::{CloseReason, SessionHandler};
pub use manager::{SessionInfo, SessionManager, SessionManagerConfig};
pub use memory::InMemoryAuthController;
pub use progress::{ProgressDisplay, ProgressSink, ProgressView, TaskFrame, TaskProgressMonitor};
pub use session::{InteractiveState, Session, SessionKind};
pub use store::{Lookup, SessionStore};
pub use sweeper::{SessionSweeper, SweeperConfig};
pub use user_context::{UserContext, UserCredentials, UserState};
