//! Periodic liveness eviction across every room in a directory.

use crate::directory::RoomDirectory;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Background task disconnecting sessions that went silent.
///
/// Owned explicitly: it runs from [`TimeoutSweeper::start`] until
/// [`TimeoutSweeper::stop`].
pub struct TimeoutSweeper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TimeoutSweeper {
    pub fn start(directory: Arc<RoomDirectory>, period: Duration, timeout_ms: i64) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        for room in directory.rooms() {
                            let evicted = room.sweep_timeouts(timeout_ms).await;
                            if !evicted.is_empty() {
                                info!(
                                    "Timed out {} players in room {}: {:?}",
                                    evicted.len(),
                                    room.id(),
                                    evicted
                                );
                            }
                        }
                    }
                }
            }
            debug!("Timeout sweeper stopped");
        });

        info!(
            "Timeout sweeper started (period: {:?}, timeout: {} ms)",
            period, timeout_ms
        );
        Self { shutdown, task }
    }

    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            error!("Timeout sweeper ended abnormally: {}", e);
        }
    }
}
