//! Periodic idle eviction and session state broadcasts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use sessiond_core::SessionSettings;

use crate::manager::SessionManager;

/// Timing for the background tasks.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Period of the idle eviction pass
    pub expire_check_interval: Duration,

    /// Period of state broadcasts (`None` = disabled)
    pub state_broadcast_interval: Option<Duration>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SweeperConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            expire_check_interval: settings.expire_check_interval(),
            state_broadcast_interval: settings.state_broadcast_interval(),
        }
    }
}

/// Handle to the running background tasks.
#[derive(Debug)]
pub struct SessionSweeper {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionSweeper {
    /// Spawn the eviction task and, if enabled, the broadcast task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(manager: Arc<SessionManager>, config: SweeperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(2);

        let evict_manager = Arc::clone(&manager);
        tasks.push(spawn_periodic(
            "idle-eviction",
            config.expire_check_interval,
            shutdown_rx.clone(),
            move || {
                evict_manager.expire_idle_sessions();
            },
        ));

        if let Some(period) = config.state_broadcast_interval {
            let broadcast_manager = Arc::clone(&manager);
            tasks.push(spawn_periodic(
                "state-broadcast",
                period,
                shutdown_rx,
                move || {
                    let delivered = broadcast_manager.broadcast_session_states();
                    debug!(delivered, "Session states broadcast");
                },
            ));
        }

        info!(
            expire_check_interval_ms = config.expire_check_interval.as_millis() as u64,
            broadcast = config.state_broadcast_interval.is_some(),
            "Session sweeper started"
        );

        Self { shutdown_tx, tasks }
    }

    /// Stop the background tasks and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Sweeper task ended abnormally");
            }
        }
        info!("Session sweeper stopped");
    }
}

/// Run `work` every `period` on the blocking pool until shutdown is signalled.
///
/// The first tick fires after one full period.
fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    work: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    let work = Arc::new(work);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let work = Arc::clone(&work);
                    if let Err(e) = tokio::task::spawn_blocking(move || (*work)()).await {
                        error!(task = name, error = %e, "Periodic session task panicked");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(task = name, "Periodic session task shutting down");
                        break;
                    }
                }
            }
        }
    })
}
