//! Error type shared by every Pairgate crate.

use thiserror::Error;

/// Top-level error type for Pairgate.
///
/// `Display` output is shown to end users as-is, so messages stay
/// human-readable and never carry internal identifiers.
#[derive(Debug, Error)]
pub enum PairgateError {
    /// Phone number is not 10-15 ASCII digits.
    #[error("Invalid phone number. Please enter 10-15 digits without +")]
    InvalidPhoneNumber(String),

    /// A live session already exists for this number.
    #[error("A pairing session for {0} is already in progress")]
    AlreadyInProgress(String),

    /// No session is tracked for this number.
    #[error("No pairing session found for {0}")]
    NotFound(String),

    /// Anything surfaced by the connection adapter (network, rejected pairing).
    #[error("Connection error: {0}")]
    AdapterFailure(String),

    /// The protocol server refused the credentials. Never retried.
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// A state change that is not an edge of the session state machine.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PairgateError {
    /// Whether this error came from input validation rather than runtime state.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidPhoneNumber(_))
    }
}
