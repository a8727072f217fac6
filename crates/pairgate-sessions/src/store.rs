//! In-memory session store keyed by phone number.

use chrono::Utc;
use pairgate_core::{
    error::PairgateError,
    phone::PhoneNumber,
    session::{Session, SessionSnapshot},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Authoritative map from phone number to [`Session`].
///
/// Cloning is cheap; clones share the same map. Nothing is persisted: a
/// restart loses every session and users simply request a new code.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session by its phone number.
    pub async fn get(&self, phone: &str) -> Option<Session> {
        self.sessions.lock().await.get(phone).cloned()
    }

    /// Insert a fresh `Idle` session unless a live one already exists.
    ///
    /// Returns the live session with `created = false` when one exists.
    /// A `Disconnected` or `Failed` session is replaced. The check and the
    /// insert happen under one lock acquisition.
    pub async fn create_if_absent(&self, phone: &PhoneNumber) -> (Session, bool) {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(phone.as_str()) {
            if existing.state.is_live() {
                return (existing.clone(), false);
            }
        }
        let session = Session::new(phone.clone());
        sessions.insert(phone.to_string(), session.clone());
        (session, true)
    }

    /// Apply `mutation` to the session for `phone`.
    ///
    /// The mutation runs on a scratch copy whose `last_updated_at` is already
    /// bumped; the stored session changes only when the mutation succeeds.
    pub async fn update<T, F>(&self, phone: &str, mutation: F) -> Result<T, PairgateError>
    where
        F: FnOnce(&mut Session) -> Result<T, PairgateError>,
    {
        let mut sessions = self.sessions.lock().await;
        let stored = sessions
            .get_mut(phone)
            .ok_or_else(|| PairgateError::NotFound(phone.to_string()))?;
        let mut draft = stored.clone();
        draft.last_updated_at = Utc::now();
        let out = mutation(&mut draft)?;
        *stored = draft;
        Ok(out)
    }

    pub async fn remove(&self, phone: &str) -> Option<Session> {
        self.sessions.lock().await.remove(phone)
    }

    /// Remove the session for `phone` only if `predicate` holds for it.
    pub async fn remove_if<F>(&self, phone: &str, predicate: F) -> Option<Session>
    where
        F: FnOnce(&Session) -> bool,
    {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(phone).is_some_and(predicate) {
            sessions.remove(phone)
        } else {
            None
        }
    }

    /// Snapshots of every tracked session.
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .lock()
            .await
            .values()
            .map(Session::snapshot)
            .collect()
    }

    /// Number of sessions currently blocking new requests for their number.
    pub async fn live_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| s.state.is_live())
            .count()
    }

    /// The most recently updated session, if any.
    pub async fn latest(&self) -> Option<SessionSnapshot> {
        self.sessions
            .lock()
            .await
            .values()
            .max_by_key(|s| s.last_updated_at)
            .map(Session::snapshot)
    }

    /// Remove and return every session.
    pub async fn drain(&self) -> Vec<Session> {
        self.sessions.lock().await.drain().map(|(_, s)| s).collect()
    }
}
