//! Driver Protocol Layer
//!
//! Line-delimited JSON over a byte stream, usually stdin/stdout. Requests
//! are routed to the [`sessiond_registry::SessionManager`] and session events
//! are interleaved with the responses.

pub mod server;

pub use server::RegistryServer;
