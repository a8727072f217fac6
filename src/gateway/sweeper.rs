//! Periodic session expiry and eviction.

use super::Gateway;
use chrono::{DateTime, Utc};
use pairgate_core::config::SessionsConfig;
use pairgate_sessions::{SessionManager, SweepReport};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

impl Gateway {
    /// Background task: sweep stale and finished sessions every
    /// `sweep_interval_secs`.
    pub(super) async fn sweep_loop(manager: SessionManager, config: SessionsConfig) {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_once(&manager, &config, Utc::now()).await;
        }
    }
}

pub(super) async fn sweep_once(
    manager: &SessionManager,
    config: &SessionsConfig,
    now: DateTime<Utc>,
) -> SweepReport {
    manager
        .sweep(
            now,
            Duration::from_secs(config.pending_ttl_secs),
            Duration::from_secs(config.retention_secs),
        )
        .await
}
