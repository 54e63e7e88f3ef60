//! sessiond Server Library
//!
//! This library contains the driver protocol types and the request router.
//! The actual server binary is in main.rs.

pub mod messages;
pub mod protocol;

// Re-export commonly used types
pub use messages::{ErrorBody, EventLine, Request, Response};
pub use protocol::RegistryServer;
