//! Session manager: drives each phone number through the pairing lifecycle.
//!
//! The manager is the only writer to the [`SessionStore`]. Every accepted
//! pairing request gets one driver task that consumes the adapter's events in
//! order, applies them to the store, publishes the result, and owns the
//! reconnect backoff. Aborting the driver cancels any pending reconnect.

mod reconnect;
mod sweep;

pub use sweep::SweepReport;

use crate::notify::{Notifier, SessionUpdate, Subscription};
use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use pairgate_core::{
    code::generate_code,
    config::PairingConfig,
    error::PairgateError,
    phone::PhoneNumber,
    session::{Session, SessionSnapshot, SessionState},
    traits::{AdapterEvent, AdapterEvents, CloseReason, ConnectionAdapter},
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of an accepted pairing request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingTicket {
    pub phone_number: String,
    pub pairing_code: String,
    /// The adapter supplied no code; this one is for display only.
    pub placeholder: bool,
}

/// What the driver does after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Reconnect,
    Stop,
}

/// Orchestrates store, adapter, and notifications. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: SessionStore,
    adapter: Arc<dyn ConnectionAdapter>,
    notifier: Notifier,
    config: PairingConfig,
    drivers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        store: SessionStore,
        adapter: Arc<dyn ConnectionAdapter>,
        notifier: Notifier,
        config: PairingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                adapter,
                notifier,
                config,
                drivers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn adapter_name(&self) -> &str {
        self.inner.adapter.name()
    }

    /// False when the adapter only issues codes and nothing will ever link.
    pub fn links_devices(&self) -> bool {
        self.inner.adapter.links_devices()
    }

    pub fn config(&self) -> &PairingConfig {
        &self.inner.config
    }

    /// Validate `raw`, open a session, and wait for its first pairing code.
    ///
    /// Returns as soon as a code is known; connection progress is published
    /// through the notifier afterwards. The attempt runs on its own driver
    /// task, so dropping this future does not abandon the session.
    pub async fn request_pairing(&self, raw: &str) -> Result<PairingTicket, PairgateError> {
        let phone = PhoneNumber::parse(raw)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut drivers = self.inner.drivers.lock().await;
            let (session, created) = self.inner.store.create_if_absent(&phone).await;
            if !created {
                info!("pairing for {phone} rejected: session is {}", session.state);
                return Err(PairgateError::AlreadyInProgress(phone.to_string()));
            }
            if let Some(stale) = drivers.remove(phone.as_str()) {
                stale.abort();
            }

            info!(
                "pairing requested for {phone} via {}",
                self.inner.adapter.name()
            );
            self.inner
                .notifier
                .publish(SessionUpdate::State(session.snapshot()));

            let key = phone.to_string();
            let epoch = session.created_at;
            let manager = self.clone();
            let handle = tokio::spawn(async move {
                manager.run_attempt(phone, epoch, reply_tx).await;
            });
            drivers.insert(key, handle);
        }

        reply_rx.await.unwrap_or_else(|_| {
            Err(PairgateError::AdapterFailure(
                "pairing attempt was cancelled".into(),
            ))
        })
    }

    /// Driver body: begin pairing, report the first code, then keep
    /// consuming events.
    async fn run_attempt(
        self,
        phone: PhoneNumber,
        epoch: DateTime<Utc>,
        reply: oneshot::Sender<Result<PairingTicket, PairgateError>>,
    ) {
        let mut events = match self.inner.adapter.begin_pairing(&phone).await {
            Ok(events) => events,
            Err(e) => {
                let err = as_adapter_error(e);
                self.fail(&phone, epoch, err.to_string()).await;
                let _ = reply.send(Err(err));
                return;
            }
        };

        match self.await_first_code(&phone, epoch, &mut events).await {
            Ok(ticket) => {
                if reply.send(Ok(ticket)).is_err() {
                    debug!("pairing requester for {phone} went away; attempt continues");
                }
            }
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        }

        self.drive(phone, epoch, events).await;
    }

    /// Read-only view of the session for `phone`.
    pub async fn get_status(&self, phone: &str) -> Result<SessionSnapshot, PairgateError> {
        self.inner
            .store
            .get(phone)
            .await
            .map(|s| s.snapshot())
            .ok_or_else(|| PairgateError::NotFound(phone.to_string()))
    }

    /// Explicit user disconnect: stop the driver, tell the adapter, forget the session.
    ///
    /// Only the attempt that was current when the call started is removed; a
    /// session created by a request racing this call is left alone.
    pub async fn disconnect(&self, phone: &str) -> Result<SessionSnapshot, PairgateError> {
        let session = {
            let mut drivers = self.inner.drivers.lock().await;
            let session = self
                .inner
                .store
                .get(phone)
                .await
                .ok_or_else(|| PairgateError::NotFound(phone.to_string()))?;
            if let Some(handle) = drivers.remove(phone) {
                handle.abort();
            }
            session
        };
        let epoch = session.created_at;

        if let Err(e) = self.inner.adapter.disconnect(&session.phone_number).await {
            warn!("adapter disconnect for {phone} failed: {e}");
        }

        let removed = self
            .inner
            .store
            .remove_if(phone, |s| s.created_at == epoch)
            .await;
        if removed.is_some() {
            self.inner.notifier.publish(SessionUpdate::Removed {
                phone_number: phone.to_string(),
            });
            info!("session for {phone} disconnected by request");
        } else {
            debug!("session for {phone} was replaced during disconnect; keeping the new one");
        }
        Ok(session.snapshot())
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.notifier.subscribe()
    }

    pub fn subscribe_phone(&self, phone: &str) -> Subscription {
        self.inner.notifier.subscribe_phone(phone)
    }

    pub async fn list(&self) -> Vec<SessionSnapshot> {
        self.inner.store.list().await
    }

    pub async fn live_count(&self) -> usize {
        self.inner.store.live_count().await
    }

    /// The most recently updated session, for callers that do not name a number.
    pub async fn latest(&self) -> Option<SessionSnapshot> {
        self.inner.store.latest().await
    }

    /// Shutdown: stop every driver, disconnect live sessions, empty the store.
    pub async fn teardown(&self) -> usize {
        let drivers: Vec<_> = self.inner.drivers.lock().await.drain().collect();
        for (_, handle) in drivers {
            handle.abort();
        }

        let sessions = self.inner.store.drain().await;
        for session in sessions.iter().filter(|s| s.state.is_live()) {
            if let Err(e) = self.inner.adapter.disconnect(&session.phone_number).await {
                warn!(
                    "adapter disconnect for {} failed during shutdown: {e}",
                    session.phone_number
                );
            }
        }
        info!("session manager drained {} session(s)", sessions.len());
        sessions.len()
    }

    /// Wait (bounded) for the adapter's first event and settle the pairing code.
    ///
    /// If the first event is not a code, a generated placeholder stands in and
    /// the event is then applied normally.
    async fn await_first_code(
        &self,
        phone: &PhoneNumber,
        epoch: DateTime<Utc>,
        events: &mut AdapterEvents,
    ) -> Result<PairingTicket, PairgateError> {
        let first = tokio::time::timeout(self.inner.config.code_timeout(), events.recv()).await;

        let (code, placeholder, pending) = match first {
            Ok(Some(AdapterEvent::PairingCodeIssued(code))) => (code, false, None),
            Ok(Some(AdapterEvent::ConnectionClosed(reason))) => {
                let err = match &reason {
                    CloseReason::AuthenticationRejected(m) => {
                        PairgateError::AuthenticationRejected(m.clone())
                    }
                    CloseReason::Transient(m) => PairgateError::AdapterFailure(m.clone()),
                };
                self.fail(phone, epoch, err.to_string()).await;
                return Err(err);
            }
            Ok(Some(other)) => (generate_code(), true, Some(other)),
            Ok(None) => {
                let err = PairgateError::AdapterFailure(
                    "adapter closed before issuing a pairing code".into(),
                );
                self.fail(phone, epoch, err.to_string()).await;
                return Err(err);
            }
            Err(_) => {
                let err =
                    PairgateError::AdapterFailure("timed out waiting for a pairing code".into());
                self.fail(phone, epoch, err.to_string()).await;
                return Err(err);
            }
        };

        let snapshot = self
            .update_attempt(phone, epoch, |s| {
                s.record_code(code.clone(), placeholder);
                s.transition(SessionState::PairingRequested)
            })
            .await?;
        self.inner.notifier.publish(SessionUpdate::State(snapshot));

        if placeholder {
            info!("pairing code for {phone}: {code} (placeholder, adapter sent none)");
        } else {
            info!("pairing code for {phone}: {code}");
        }

        if let Some(event) = pending {
            if self.handle_event(phone, epoch, event).await == Flow::Stop {
                debug!("first adapter event for {phone} ended the attempt");
            }
        }

        Ok(PairingTicket {
            phone_number: phone.to_string(),
            pairing_code: code,
            placeholder,
        })
    }

    /// Abort the driver for `phone`, cancelling any pending reconnect.
    pub(crate) async fn cancel_driver(&self, phone: &str) {
        if let Some(handle) = self.inner.drivers.lock().await.remove(phone) {
            handle.abort();
        }
    }

    /// Whether a driver task for `phone` is still running.
    pub(crate) async fn driver_active(&self, phone: &str) -> bool {
        self.inner
            .drivers
            .lock()
            .await
            .get(phone)
            .is_some_and(|h| !h.is_finished())
    }

    /// Apply one adapter event to the session.
    pub(crate) async fn handle_event(
        &self,
        phone: &PhoneNumber,
        epoch: DateTime<Utc>,
        event: AdapterEvent,
    ) -> Flow {
        let result = match event {
            AdapterEvent::PairingCodeIssued(code) => {
                self.update_attempt(phone, epoch, |s| {
                    if !s.record_code(code, false) {
                        debug!("ignoring extra pairing code for {}", s.phone_number);
                    }
                    Ok(())
                })
                .await
            }
            AdapterEvent::QrIssued(qr) => {
                let published = qr.clone();
                let res = self
                    .update_attempt(phone, epoch, |s| {
                        s.qr = Some(qr);
                        Ok(())
                    })
                    .await;
                if res.is_ok() {
                    self.inner.notifier.publish(SessionUpdate::Qr {
                        phone_number: phone.to_string(),
                        qr: published,
                    });
                }
                res
            }
            AdapterEvent::CodeDelivered => {
                self.update_attempt(phone, epoch, |s| {
                    s.transition(SessionState::AwaitingLinkConfirmation)
                })
                .await
            }
            AdapterEvent::ConnectionOpened { user_name, user_id } => {
                return self.handle_open(phone, epoch, user_name, user_id).await;
            }
            AdapterEvent::ConnectionClosed(reason) => {
                return self.handle_close(phone, epoch, reason).await;
            }
        };

        match result {
            Ok(snapshot) => {
                self.inner.notifier.publish(SessionUpdate::State(snapshot));
                Flow::Continue
            }
            Err(PairgateError::NotFound(_)) => Flow::Stop,
            Err(e) => {
                warn!("dropping adapter event for {phone}: {e}");
                Flow::Continue
            }
        }
    }

    async fn handle_open(
        &self,
        phone: &PhoneNumber,
        epoch: DateTime<Utc>,
        user_name: Option<String>,
        user_id: Option<String>,
    ) -> Flow {
        let opened = self
            .update_attempt(phone, epoch, |s| {
                if s.state == SessionState::PairingRequested {
                    s.transition(SessionState::AwaitingLinkConfirmation)?;
                }
                s.transition(SessionState::Connected)?;
                s.connected_user_name = user_name;
                s.connected_user_id = user_id;
                s.retry_count = 0;
                s.last_error = None;
                Ok(())
            })
            .await;

        match opened {
            Ok(snapshot) => {
                info!(
                    "{phone} connected as {}",
                    snapshot.connected_user_name.as_deref().unwrap_or("unknown")
                );
                self.inner.notifier.publish(SessionUpdate::State(snapshot));
            }
            Err(PairgateError::NotFound(_)) => return Flow::Stop,
            Err(e) => {
                warn!("dropping connection-opened for {phone}: {e}");
                return Flow::Continue;
            }
        }

        let text = &self.inner.config.confirmation_message;
        if let Err(e) = self.inner.adapter.send_confirmation(phone, text).await {
            warn!("confirmation message to {phone} failed: {e}");
        }
        Flow::Continue
    }

    /// Record a close. Retryable closes leave the session `Disconnected` and ask
    /// the driver to reconnect, unless the retry cap is spent.
    pub(crate) async fn handle_close(
        &self,
        phone: &PhoneNumber,
        epoch: DateTime<Utc>,
        reason: CloseReason,
    ) -> Flow {
        let message = reason.message().to_string();

        if !reason.is_retryable() {
            warn!("{phone} authentication rejected: {message}");
            self.fail(phone, epoch, format!("authentication rejected: {message}"))
                .await;
            return Flow::Stop;
        }

        let closed = self
            .update_attempt(phone, epoch, |s| {
                s.transition(SessionState::Disconnected)?;
                s.last_error = Some(message.clone());
                Ok(())
            })
            .await;
        let snapshot = match closed {
            Ok(snapshot) => snapshot,
            Err(PairgateError::NotFound(_)) => return Flow::Stop,
            Err(e) => {
                warn!("dropping connection-closed for {phone}: {e}");
                return Flow::Continue;
            }
        };
        let retries = snapshot.retry_count;
        self.inner.notifier.publish(SessionUpdate::State(snapshot));

        let max = self.inner.config.max_retries;
        if retries >= max {
            warn!("{phone} disconnected ({message}); giving up after {retries} reconnect attempt(s)");
            self.fail(
                phone,
                epoch,
                format!("gave up after {retries} reconnect attempt(s): {message}"),
            )
            .await;
            return Flow::Stop;
        }

        info!(
            "{phone} disconnected ({message}); reconnecting in {}ms",
            self.inner.config.backoff_ms
        );
        Flow::Reconnect
    }

    /// Move the session to `Failed` with `reason`, if it is still this attempt.
    pub(crate) async fn fail(&self, phone: &PhoneNumber, epoch: DateTime<Utc>, reason: String) {
        let failed = self
            .update_attempt(phone, epoch, |s| {
                s.transition(SessionState::Failed)?;
                s.last_error = Some(reason);
                Ok(())
            })
            .await;
        match failed {
            Ok(snapshot) => self.inner.notifier.publish(SessionUpdate::State(snapshot)),
            Err(e) => debug!("could not mark {phone} failed: {e}"),
        }
    }

    /// Mutate the session only if it still belongs to the attempt started at
    /// `epoch`; a replaced or removed session reports `NotFound`.
    pub(crate) async fn update_attempt<F>(
        &self,
        phone: &PhoneNumber,
        epoch: DateTime<Utc>,
        mutation: F,
    ) -> Result<SessionSnapshot, PairgateError>
    where
        F: FnOnce(&mut Session) -> Result<(), PairgateError>,
    {
        self.inner
            .store
            .update(phone.as_str(), |s| {
                if s.created_at != epoch {
                    return Err(PairgateError::NotFound(phone.to_string()));
                }
                mutation(s)?;
                Ok(s.snapshot())
            })
            .await
    }

    pub(crate) fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub(crate) fn adapter(&self) -> &Arc<dyn ConnectionAdapter> {
        &self.inner.adapter
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }
}

/// Keep adapter-classified errors, wrap everything else as an adapter failure.
pub(crate) fn as_adapter_error(e: PairgateError) -> PairgateError {
    match e {
        PairgateError::AdapterFailure(_) | PairgateError::AuthenticationRejected(_) => e,
        other => PairgateError::AdapterFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{manager_with, next_state, ScriptedAdapter};
    use std::time::Duration;

    const PHONE: &str = "254712345678";

    #[tokio::test]
    async fn test_request_pairing_records_code() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());

        let ticket = manager.request_pairing(PHONE).await.unwrap();
        assert_eq!(ticket.pairing_code, "246810");
        assert!(!ticket.placeholder);

        let status = manager.get_status(PHONE).await.unwrap();
        assert_eq!(status.state, SessionState::PairingRequested);
        assert_eq!(status.pairing_code.as_deref(), Some("246810"));
        assert_eq!(status.retry_count, 0);
        assert_eq!(adapter.begin_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_phone_creates_nothing() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());

        let err = manager.request_pairing("abc123").await.unwrap_err();
        assert!(matches!(err, PairgateError::InvalidPhoneNumber(_)));
        assert!(matches!(
            manager.get_status("abc123").await.unwrap_err(),
            PairgateError::NotFound(_)
        ));
        assert!(manager.list().await.is_empty());
        assert_eq!(adapter.begin_calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_request_rejected_without_mutation() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());
        manager.request_pairing(PHONE).await.unwrap();
        let before = manager.get_status(PHONE).await.unwrap();

        let err = manager.request_pairing(PHONE).await.unwrap_err();
        assert!(matches!(err, PairgateError::AlreadyInProgress(_)));
        assert_eq!(manager.get_status(PHONE).await.unwrap(), before);
        assert_eq!(adapter.begin_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_create_one_session() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.request_pairing(PHONE).await })
            })
            .collect();

        let mut ok = 0;
        let mut busy = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(PairgateError::AlreadyInProgress(_)) => busy += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, busy), (1, 15));
        assert_eq!(adapter.begin_calls(), 1);
    }

    #[tokio::test]
    async fn test_full_link_flow_sends_confirmation() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());
        let mut sub = manager.subscribe_phone(PHONE);
        manager.request_pairing(PHONE).await.unwrap();

        adapter.emit(PHONE, AdapterEvent::CodeDelivered).await;
        next_state(&mut sub, SessionState::AwaitingLinkConfirmation).await;

        adapter
            .emit(
                PHONE,
                AdapterEvent::ConnectionOpened {
                    user_name: Some("Amina".into()),
                    user_id: Some("254712345678:3@s.whatsapp.net".into()),
                },
            )
            .await;
        let connected = next_state(&mut sub, SessionState::Connected).await;
        assert_eq!(connected.connected_user_name.as_deref(), Some("Amina"));

        tokio::time::timeout(Duration::from_secs(1), async {
            while adapter.confirmations().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(adapter.confirmations()[0].0, PHONE);
    }

    #[tokio::test]
    async fn test_open_from_pairing_requested_steps_through_awaiting() {
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
    }

    #[tokio::test]
    async fn test_confirmation_failure_keeps_connected() {
        let adapter = ScriptedAdapter::new();
        adapter.fail_confirmations();
        let manager = manager_with(adapter.clone());
        let mut sub = manager.subscribe_phone(PHONE);
        manager.request_pairing(PHONE).await.unwrap();

        adapter
            .emit(
                PHONE,
                AdapterEvent::ConnectionOpened {
                    user_name: Some("Amina".into()),
                    user_id: None,
                },
            )
            .await;
        next_state(&mut sub, SessionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            manager.get_status(PHONE).await.unwrap().state,
            SessionState::Connected
        );
    }

    #[tokio::test]
    async fn test_qr_first_uses_placeholder_then_adapter_code() {
        let adapter = ScriptedAdapter::with_initial(vec![AdapterEvent::QrIssued("2@abc".into())]);
        let manager = manager_with(adapter.clone());
        let mut sub = manager.subscribe_phone(PHONE);

        let ticket = manager.request_pairing(PHONE).await.unwrap();
        assert!(ticket.placeholder);
        assert!(pairgate_core::code::is_valid_code(&ticket.pairing_code));

        adapter
            .emit(PHONE, AdapterEvent::PairingCodeIssued("135790".into()))
            .await;
        loop {
            let update = sub.recv().await.unwrap();
            if let SessionUpdate::State(s) = update {
                if s.pairing_code.as_deref() == Some("135790") {
                    assert!(!s.code_is_placeholder);
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_adapter_begin_failure_marks_failed() {
        let adapter = ScriptedAdapter::new();
        adapter.fail_begin();
        let manager = manager_with(adapter.clone());

        let err = manager.request_pairing(PHONE).await.unwrap_err();
        assert!(matches!(err, PairgateError::AdapterFailure(_)));
        let status = manager.get_status(PHONE).await.unwrap();
        assert_eq!(status.state, SessionState::Failed);
        assert!(status.last_error.is_some());

        // A failed session does not block a new attempt.
        adapter.recover_begin();
        assert!(manager.request_pairing(PHONE).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_before_code_is_reported_to_caller() {
        let adapter = ScriptedAdapter::with_initial(vec![AdapterEvent::ConnectionClosed(
            CloseReason::AuthenticationRejected("401".into()),
        )]);
        let manager = manager_with(adapter);

        let err = manager.request_pairing(PHONE).await.unwrap_err();
        assert!(matches!(err, PairgateError::AuthenticationRejected(_)));
        assert_eq!(
            manager.get_status(PHONE).await.unwrap().state,
            SessionState::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_timeout_fails_session() {
        let adapter = ScriptedAdapter::with_initial(vec![]);
        let manager = manager_with(adapter);

        let err = manager.request_pairing(PHONE).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(
            manager.get_status(PHONE).await.unwrap().state,
            SessionState::Failed
        );
    }

    #[tokio::test]
    async fn test_disconnect_removes_session() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());
        let mut sub = manager.subscribe_phone(PHONE);
        manager.request_pairing(PHONE).await.unwrap();

        let snapshot = manager.disconnect(PHONE).await.unwrap();
        assert_eq!(snapshot.state, SessionState::PairingRequested);
        assert!(manager.get_status(PHONE).await.is_err());
        assert_eq!(adapter.disconnects(), vec![PHONE.to_string()]);

        loop {
            if let SessionUpdate::Removed { phone_number } = sub.recv().await.unwrap() {
                assert_eq!(phone_number, PHONE);
                break;
            }
        }
        assert!(matches!(
            manager.disconnect(PHONE).await.unwrap_err(),
            PairgateError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_teardown_drains_everything() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());
        manager.request_pairing(PHONE).await.unwrap();
        manager.request_pairing("5511999887766").await.unwrap();

        assert_eq!(manager.teardown().await, 2);
        assert!(manager.list().await.is_empty());
        assert_eq!(adapter.disconnects().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_still_settles_session() {
        let adapter = ScriptedAdapter::with_initial(vec![]);
        let manager = manager_with(adapter.clone());

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.request_pairing(PHONE).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        pending.abort();

        tokio::time::sleep(Duration::from_secs(120)).await;
        let status = manager.get_status(PHONE).await.unwrap();
        assert_eq!(status.state, SessionState::Failed);

        // The number is free again: the next request reaches the adapter.
        let err = manager.request_pairing(PHONE).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(adapter.begin_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_spares_session_created_meanwhile() {
        let adapter = ScriptedAdapter::new();
        let manager = manager_with(adapter.clone());
        let mut sub = manager.subscribe_phone(PHONE);
        manager.request_pairing(PHONE).await.unwrap();
        adapter
            .emit(
                PHONE,
                AdapterEvent::ConnectionClosed(CloseReason::AuthenticationRejected(
                    "logged out".into(),
                )),
            )
            .await;
        next_state(&mut sub, SessionState::Failed).await;

        adapter.slow_disconnect(Duration::from_millis(500));
        let disconnecting = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.disconnect(PHONE).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let ticket = manager.request_pairing(PHONE).await.unwrap();
        assert_eq!(ticket.pairing_code, "246810");

        let old = disconnecting.await.unwrap().unwrap();
        assert_eq!(old.state, SessionState::Failed);

        let status = manager.get_status(PHONE).await.unwrap();
        assert_eq!(status.state, SessionState::PairingRequested);
        adapter.emit(PHONE, AdapterEvent::CodeDelivered).await;
        next_state(&mut sub, SessionState::AwaitingLinkConfirmation).await;
    }
}
