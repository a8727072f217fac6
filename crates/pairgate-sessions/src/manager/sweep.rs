//! Stale-session expiry and retention eviction.

use super::SessionManager;
use crate::notify::SessionUpdate;
use chrono::{DateTime, Utc};
use pairgate_core::{error::PairgateError, session::SessionState};
use std::time::Duration;
use tracing::info;

/// What one sweep changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Unconnected sessions moved to `Failed` for inactivity.
    pub expired: Vec<String>,
    /// Sessions removed from the store.
    pub evicted: Vec<String>,
}

impl SessionManager {
    /// Expire and evict sessions as of `now`.
    ///
    /// - A live, unconnected session idle longer than `pending_ttl` becomes
    ///   `Failed` (a zero TTL disables this).
    /// - `Failed` sessions, and `Disconnected` sessions with no reconnect
    ///   pending, are removed once idle longer than `retention`.
    /// - `Connected` sessions are never touched.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        pending_ttl: Duration,
        retention: Duration,
    ) -> SweepReport {
        let pending_ttl_ms = millis(pending_ttl);
        let retention_ms = millis(retention);
        let mut report = SweepReport::default();

        for snapshot in self.store().list().await {
            let idle_ms = (now - snapshot.last_updated_at).num_milliseconds();
            let phone = snapshot.phone_number.clone();

            match snapshot.state {
                SessionState::Idle
                | SessionState::PairingRequested
                | SessionState::AwaitingLinkConfirmation => {
                    if pending_ttl_ms == 0 || idle_ms <= pending_ttl_ms {
                        continue;
                    }
                    let expired = self
                        .store()
                        .update(&phone, |s| {
                            if s.created_at != snapshot.created_at
                                || s.state == SessionState::Connected
                            {
                                return Err(PairgateError::InvalidTransition {
                                    from: s.state.to_string(),
                                    to: SessionState::Failed.to_string(),
                                });
                            }
                            s.transition(SessionState::Failed)?;
                            s.last_error = Some("pairing timed out".into());
                            Ok(s.snapshot())
                        })
                        .await;
                    if let Ok(expired) = expired {
                        self.cancel_driver(&phone).await;
                        self.notifier().publish(SessionUpdate::State(expired));
                        report.expired.push(phone);
                    }
                }
                SessionState::Failed | SessionState::Disconnected => {
                    if idle_ms <= retention_ms {
                        continue;
                    }
                    if snapshot.state == SessionState::Disconnected
                        && self.driver_active(&phone).await
                    {
                        continue;
                    }
                    let removed = self
                        .store()
                        .remove_if(&phone, |s| {
                            s.created_at == snapshot.created_at && !s.state.is_live()
                        })
                        .await;
                    if removed.is_some() {
                        self.cancel_driver(&phone).await;
                        report.evicted.push(phone);
                    }
                }
                SessionState::Connected => {}
            }
        }

        if !report.expired.is_empty() || !report.evicted.is_empty() {
            info!(
                "session sweep: {} expired, {} evicted",
                report.expired.len(),
                report.evicted.len()
            );
        }
        report
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use crate::testing::{manager_with, next_state, ScriptedAdapter};
    use chrono::Utc;
    use pairgate_core::session::SessionState;
    use pairgate_core::traits::{AdapterEvent, CloseReason};
    use std::time::Duration;

    const PHONE: &str = "254712345678";
    const TTL: Duration = Duration::from_secs(300);
    const RETENTION: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_fresh_sessions_untouched() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter);
        manager.request_pairing(PHONE).await.unwrap();

        let report = manager.sweep(Utc::now(), TTL, RETENTION).await;
        assert!(report.expired.is_empty() && report.evicted.is_empty());
        assert_eq!(
            manager.get_status(PHONE).await.unwrap().state,
            SessionState::PairingRequested
        );
    }

    #[tokio::test]
    async fn test_stale_pending_session_expires_then_evicts() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter);
        manager.request_pairing(PHONE).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(301);
        let report = manager.sweep(later, TTL, RETENTION).await;
        assert_eq!(report.expired, vec![PHONE.to_string()]);
        let status = manager.get_status(PHONE).await.unwrap();
        assert_eq!(status.state, SessionState::Failed);
        assert_eq!(status.last_error.as_deref(), Some("pairing timed out"));

        let much_later = Utc::now() + chrono::Duration::seconds(601);
        let report = manager.sweep(much_later, TTL, RETENTION).await;
        assert_eq!(report.evicted, vec![PHONE.to_string()]);
        assert!(manager.get_status(PHONE).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_expiry() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter);
        manager.request_pairing(PHONE).await.unwrap();

        let later = Utc::now() + chrono::Duration::days(1);
        let report = manager.sweep(later, Duration::ZERO, RETENTION).await;
        assert!(report.expired.is_empty());
    }

    #[tokio::test]
    async fn test_connected_sessions_never_swept() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());
        let mut sub = manager.subscribe_phone(PHONE);
        manager.request_pairing(PHONE).await.unwrap();
        adapter
            .emit(
                PHONE,
                AdapterEvent::ConnectionOpened {
                    user_name: None,
                    user_id: None,
                },
            )
            .await;
        next_state(&mut sub, SessionState::Connected).await;

        let later = Utc::now() + chrono::Duration::days(1);
        let report = manager.sweep(later, TTL, RETENTION).await;
        assert!(report.expired.is_empty() && report.evicted.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_with_pending_reconnect_is_kept() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());
        let mut sub = manager.subscribe_phone(PHONE);
        manager.request_pairing(PHONE).await.unwrap();
        adapter
            .emit(
                PHONE,
                AdapterEvent::ConnectionClosed(CloseReason::Transient("drop".into())),
            )
            .await;
        next_state(&mut sub, SessionState::Disconnected).await;

        let later = Utc::now() + chrono::Duration::days(1);
        let report = manager.sweep(later, TTL, RETENTION).await;
        assert!(report.evicted.is_empty());
        assert!(manager.get_status(PHONE).await.is_ok());
    }
}
