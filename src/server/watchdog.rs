//! Idle connection watchdog
//!
//! Periodically evicts clients that have not sent anything for longer than
//! the idle timeout. This is the only path that reclaims connections which
//! go quiet without ever signalling a disconnect.

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval};

use crate::client::ClientRegistry;
use crate::error::DisconnectReason;

pub struct IdleWatchdog {
    registry: Arc<ClientRegistry>,
    interval: Duration,
    idle_timeout: Duration,
}

impl IdleWatchdog {
    pub fn new(registry: Arc<ClientRegistry>, interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            registry,
            interval,
            idle_timeout,
        }
    }

    /// Sweeps every `interval` forever.
    pub async fn run(self) {
        info!(
            "Idle watchdog running every {:?} (timeout {:?})",
            self.interval, self.idle_timeout
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// Evicts every client idle for longer than the timeout. Returns how many
    /// were evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;

        for client in self.registry.snapshot().await {
            let idle = client.idle_for(now).await;
            if idle > self.idle_timeout {
                info!("Evicting client {}: idle for {:?}", client, idle);
                self.registry
                    .disconnect(&client, &DisconnectReason::IdleTimeout)
                    .await;
                evicted += 1;
            }
        }

        debug!("Watchdog sweep evicted {} clients", evicted);
        evicted
    }
}
