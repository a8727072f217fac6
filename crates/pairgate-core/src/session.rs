//! The pairing session record and its state machine.

use crate::error::PairgateError;
use crate::phone::PhoneNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a session is in its pairing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    PairingRequested,
    AwaitingLinkConfirmation,
    Connected,
    Disconnected,
    Failed,
}

impl SessionState {
    /// Live sessions block a new pairing request for the same number.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::PairingRequested | Self::AwaitingLinkConfirmation | Self::Connected
        )
    }

    /// No automatic transition leaves `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, PairingRequested) => true,
            (PairingRequested, AwaitingLinkConfirmation) => true,
            (AwaitingLinkConfirmation, Connected) => true,
            (Disconnected, PairingRequested) => true,
            (from, Disconnected) => from.is_live(),
            (from, Failed) => from.is_live() || from == Disconnected,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PairingRequested => "PairingRequested",
            Self::AwaitingLinkConfirmation => "AwaitingLinkConfirmation",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One phone number's pairing attempt.
#[derive(Debug, Clone)]
pub struct Session {
    pub phone_number: PhoneNumber,
    pub state: SessionState,
    pub pairing_code: Option<String>,
    /// The code was generated locally because the adapter supplied none.
    pub code_is_placeholder: bool,
    pub connected_user_name: Option<String>,
    pub connected_user_id: Option<String>,
    pub last_error: Option<String>,
    /// Latest QR payload announced by the adapter.
    pub qr: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh `Idle` session.
    pub fn new(phone_number: PhoneNumber) -> Self {
        let now = Utc::now();
        Self {
            phone_number,
            state: SessionState::Idle,
            pairing_code: None,
            code_is_placeholder: false,
            connected_user_name: None,
            connected_user_id: None,
            last_error: None,
            qr: None,
            retry_count: 0,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Move to `next`, validating the edge against the current state.
    pub fn transition(&mut self, next: SessionState) -> Result<(), PairgateError> {
        if !self.state.can_transition_to(next) {
            return Err(PairgateError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record a pairing code.
    ///
    /// A code is set once per session. An adapter-issued code may replace a
    /// placeholder; anything else leaves the existing code in place and
    /// returns `false`.
    pub fn record_code(&mut self, code: String, placeholder: bool) -> bool {
        match &self.pairing_code {
            None => {
                self.pairing_code = Some(code);
                self.code_is_placeholder = placeholder;
                true
            }
            Some(_) if self.code_is_placeholder && !placeholder => {
                self.pairing_code = Some(code);
                self.code_is_placeholder = false;
                true
            }
            Some(_) => false,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phone_number: self.phone_number.to_string(),
            state: self.state,
            pairing_code: self.pairing_code.clone(),
            code_is_placeholder: self.code_is_placeholder,
            connected_user_name: self.connected_user_name.clone(),
            connected_user_id: self.connected_user_id.clone(),
            last_error: self.last_error.clone(),
            retry_count: self.retry_count,
            created_at: self.created_at,
            last_updated_at: self.last_updated_at,
        }
    }
}

/// Read-only projection of a [`Session`] handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phone_number: String,
    pub state: SessionState,
    pub pairing_code: Option<String>,
    pub code_is_placeholder: bool,
    pub connected_user_name: Option<String>,
    pub connected_user_id: Option<String>,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}
