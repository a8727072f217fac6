//! Session update fan-out to polling and push observers.
//!
//! Delivery is latest-state-wins: a subscriber that falls behind skips the
//! updates it missed and resumes from the newest ones. Intermediate states may
//! therefore never be observed.

use pairgate_core::session::{SessionSnapshot, SessionState};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

/// A change published by the session manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// The session record changed; carries the new snapshot.
    State(SessionSnapshot),
    /// The adapter announced a QR payload for this number.
    Qr { phone_number: String, qr: String },
    /// The session was removed after an explicit disconnect.
    Removed { phone_number: String },
}

impl SessionUpdate {
    pub fn phone_number(&self) -> &str {
        match self {
            Self::State(s) => &s.phone_number,
            Self::Qr { phone_number, .. } | Self::Removed { phone_number } => phone_number,
        }
    }

    pub fn state(&self) -> Option<SessionState> {
        match self {
            Self::State(s) => Some(s.state),
            _ => None,
        }
    }
}

/// Broadcast channel for [`SessionUpdate`]s.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<SessionUpdate>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an update. Having no subscribers is not an error.
    pub fn publish(&self, update: SessionUpdate) {
        if self.tx.send(update).is_err() {
            debug!("session update dropped: no subscribers");
        }
    }

    /// Subscribe to updates for every number.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            phone: None,
        }
    }

    /// Subscribe to updates for a single number.
    pub fn subscribe_phone(&self, phone: &str) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            phone: Some(phone.to_string()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A filtered receiver of [`SessionUpdate`]s.
pub struct Subscription {
    rx: broadcast::Receiver<SessionUpdate>,
    phone: Option<String>,
}

impl Subscription {
    /// Wait for the next matching update. `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<SessionUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(update) => {
                    let wanted = self
                        .phone
                        .as_deref()
                        .map_or(true, |p| p == update.phone_number());
                    if wanted {
                        return Some(update);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, skipping to newer updates");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
