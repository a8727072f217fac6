//! Gateway: wires the session store, adapter, and manager to the HTTP portal.
//!
//! Owns startup (sessions directory, background sweeper, listener) and
//! graceful shutdown (listener close, sweeper abort, manager teardown).

mod sweeper;

use crate::api::{self, ApiState};
use anyhow::Context;
use pairgate_channels::{local::LocalCodeAdapter, log::TracingLog};
use pairgate_core::{config::Config, shellexpand, traits::ConnectionAdapter};
use pairgate_sessions::{Notifier, SessionManager, SessionStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Build a session manager over a fresh store, using the local code adapter.
pub fn build_manager(config: &Config) -> SessionManager {
    let log = Arc::new(TracingLog::new("local"));
    let adapter: Arc<dyn ConnectionAdapter> = Arc::new(LocalCodeAdapter::new(log));
    SessionManager::new(
        SessionStore::new(),
        adapter,
        Notifier::new(config.pairing.event_buffer),
        config.pairing.clone(),
    )
}

/// The running portal.
pub struct Gateway {
    config: Config,
    manager: SessionManager,
}

impl Gateway {
    pub fn new(config: Config) -> Self {
        let manager = build_manager(&config);
        Self { config, manager }
    }

    /// Serve until Ctrl-C, then shut down cleanly.
    pub async fn run(self) -> anyhow::Result<()> {
        let sessions_dir = shellexpand(&self.config.sessions.dir);
        std::fs::create_dir_all(&sessions_dir)
            .with_context(|| format!("failed to create sessions dir {sessions_dir}"))?;

        let sweeper = tokio::spawn(Self::sweep_loop(
            self.manager.clone(),
            self.config.sessions.clone(),
        ));

        let app = api::build_router(ApiState::new(self.manager.clone()));
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        info!(
            "pairgate listening on http://{addr} | adapter: {} | sessions: {sessions_dir}",
            self.manager.adapter_name()
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        self.shutdown(&sweeper).await;
        served.context("HTTP server error")
    }

    async fn shutdown(&self, sweeper: &JoinHandle<()>) {
        info!("Shutting down...");
        sweeper.abort();
        let drained = self.manager.teardown().await;
        info!("Shutdown complete ({drained} session(s) closed).");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
