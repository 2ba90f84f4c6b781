//! Periodic health monitoring.

use super::Inner;
use compact_str::CompactString;
use serde::Serialize;
use std::{sync::Weak, time::Duration};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

/// Outcome of one provider's probe in a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// The probed provider.
    pub provider: CompactString,
    /// Whether the probe succeeded.
    pub healthy: bool,
    /// Probe latency, zero when the probe errored.
    pub latency: Duration,
    /// Failure detail.
    pub error: Option<String>,
}

/// A running sweep loop.
pub(super) struct HealthTask {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl HealthTask {
    /// Sweep every `interval`, first tick one interval from now.
    ///
    /// The loop holds the manager weakly and exits once it is gone.
    pub fn spawn(manager: Weak<Inner>, interval: Duration) -> Self {
        let (shutdown, mut rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("health checks started every {interval:?}");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            return;
                        };
                        manager.check_all().await;
                    }
                    _ = rx.recv() => {
                        tracing::info!("health checks stopped");
                        return;
                    }
                }
            }
        });
        Self { shutdown, handle }
    }

    pub fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.abort();
    }
}
