//! # sessiond
//!
//! Session registry daemon for browser-driven and token-driven backend
//! sessions.
//!
//! ## Overview
//!
//! The daemon reads one JSON request per line on stdin and provides:
//! - Session resolution, restore and headless creation
//! - Closing by id, by auth-manager session id, by user, or all at once
//! - Idle eviction and state broadcasts on a schedule
//!
//! Responses and session events are written as JSON lines on stdout; logs
//! go to stderr.
//!
//! ## Architecture
//!
//! This is Layer 1 - the binary that ties together:
//! - sessiond-core: Core types, configuration and traits
//! - sessiond-registry: Session store and lifecycle management

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;

use sessiond::RegistryServer;
use sessiond_core::RegistryConfig;
use sessiond_registry::{
    ChannelEventSink, InMemoryAuthController, SessionManager, SessionManagerConfig,
    SessionSweeper, SweeperConfig,
};

fn config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match config_path() {
        Some(path) => RegistryConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RegistryConfig::default(),
    };
    config.validate()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "sessiond v{} starting (max idle {}ms)",
        env!("CARGO_PKG_VERSION"),
        config.sessions.max_idle_time_ms
    );

    let auth = Arc::new(InMemoryAuthController::from_settings(&config.auth));
    let (sink, events) = ChannelEventSink::new();
    let manager = Arc::new(SessionManager::with_config(
        auth,
        Arc::new(sink),
        SessionManagerConfig::from(&config.sessions),
    ));

    let sweeper = SessionSweeper::start(
        Arc::clone(&manager),
        SweeperConfig::from(&config.sessions),
    );
    let server = RegistryServer::new(Arc::clone(&manager));

    tracing::info!("Server initialized, reading requests on stdio...");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let served = tokio::select! {
        result = server.serve(stdin, stdout, events) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
    };
    if let Err(e) = &served {
        tracing::error!("Error serving driver: {}", e);
    }

    sweeper.shutdown().await;
    let closed = manager.shutdown();

    tracing::info!("sessiond shutting down ({} sessions closed)", closed);

    served
}
