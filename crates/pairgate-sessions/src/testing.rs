//! Test doubles shared by the manager tests.

use crate::manager::SessionManager;
use crate::notify::{Notifier, SessionUpdate, Subscription};
use crate::store::SessionStore;
use async_trait::async_trait;
use pairgate_core::{
    config::PairingConfig,
    error::PairgateError,
    phone::PhoneNumber,
    session::{SessionSnapshot, SessionState},
    traits::{AdapterEvent, AdapterEvents, ConnectionAdapter},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Adapter whose event streams are fed by the test.
///
/// Every `begin_pairing` opens a fresh stream, pre-loaded with the initial
/// events (a `PairingCodeIssued("246810")` by default).
pub(crate) struct ScriptedAdapter {
    initial: Vec<AdapterEvent>,
    senders: Mutex<HashMap<String, mpsc::Sender<AdapterEvent>>>,
    begin_calls: AtomicUsize,
    fail_begin: AtomicBool,
    fail_confirmations: AtomicBool,
    disconnect_delay_ms: AtomicU64,
    confirmations: Mutex<Vec<(String, String)>>,
    disconnects: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_initial(vec![AdapterEvent::PairingCodeIssued("246810".into())])
    }

    pub(crate) fn with_initial(initial: Vec<AdapterEvent>) -> Arc<Self> {
        Arc::new(Self {
            initial,
            senders: Mutex::new(HashMap::new()),
            begin_calls: AtomicUsize::new(0),
            fail_begin: AtomicBool::new(false),
            fail_confirmations: AtomicBool::new(false),
            disconnect_delay_ms: AtomicU64::new(0),
            confirmations: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
        })
    }

    /// Push an event onto the latest stream for `phone`.
    pub(crate) async fn emit(&self, phone: &str, event: AdapterEvent) {
        let tx = self
            .senders
            .lock()
            .unwrap()
            .get(phone)
            .cloned()
            .expect("no stream for phone");
        tx.send(event).await.expect("stream receiver dropped");
    }

    pub(crate) fn begin_calls(&self) -> usize {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_begin(&self) {
        self.fail_begin.store(true, Ordering::SeqCst);
    }

    pub(crate) fn recover_begin(&self) {
        self.fail_begin.store(false, Ordering::SeqCst);
    }

    pub(crate) fn fail_confirmations(&self) {
        self.fail_confirmations.store(true, Ordering::SeqCst);
    }

    /// Make every adapter disconnect take `delay`.
    pub(crate) fn slow_disconnect(&self, delay: Duration) {
        self.disconnect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn confirmations(&self) -> Vec<(String, String)> {
        self.confirmations.lock().unwrap().clone()
    }

    pub(crate) fn disconnects(&self) -> Vec<String> {
        self.disconnects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn begin_pairing(&self, phone: &PhoneNumber) -> Result<AdapterEvents, PairgateError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(PairgateError::AdapterFailure("network unreachable".into()));
        }
        let (tx, rx) = mpsc::channel(16);
        for event in &self.initial {
            tx.try_send(event.clone())
                .map_err(|e| PairgateError::AdapterFailure(e.to_string()))?;
        }
        self.senders.lock().unwrap().insert(phone.to_string(), tx);
        Ok(rx)
    }

    async fn send_confirmation(
        &self,
        phone: &PhoneNumber,
        text: &str,
    ) -> Result<(), PairgateError> {
        if self.fail_confirmations.load(Ordering::SeqCst) {
            return Err(PairgateError::AdapterFailure("send failed".into()));
        }
        self.confirmations
            .lock()
            .unwrap()
            .push((phone.to_string(), text.to_string()));
        Ok(())
    }

    async fn disconnect(&self, phone: &PhoneNumber) -> Result<(), PairgateError> {
        let delay = self.disconnect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.disconnects.lock().unwrap().push(phone.to_string());
        Ok(())
    }
}

pub(crate) fn manager_with(adapter: Arc<ScriptedAdapter>) -> SessionManager {
    manager_with_config(adapter, PairingConfig::default())
}

pub(crate) fn manager_with_config(
    adapter: Arc<ScriptedAdapter>,
    config: PairingConfig,
) -> SessionManager {
    SessionManager::new(
        SessionStore::new(),
        adapter,
        Notifier::new(config.event_buffer),
        config,
    )
}

/// Wait for the next state update matching `predicate`.
pub(crate) async fn next_matching<P>(sub: &mut Subscription, predicate: P) -> SessionSnapshot
where
    P: Fn(&SessionSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            match sub.recv().await {
                Some(SessionUpdate::State(s)) if predicate(&s) => return s,
                Some(_) => continue,
                None => panic!("notifier closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session update")
}

/// Wait for the next update that reports `state`.
pub(crate) async fn next_state(sub: &mut Subscription, state: SessionState) -> SessionSnapshot {
    next_matching(sub, |s| s.state == state).await
}
