//! Boundary traits: the protocol client adapter and the logging capability
//! handed to it.

use crate::error::PairgateError;
use crate::phone::PhoneNumber;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Lifecycle events emitted by a connection adapter for one pairing attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// The protocol server issued a pairing code.
    PairingCodeIssued(String),
    /// A QR payload the user can scan instead of typing a code.
    QrIssued(String),
    /// The code reached the protocol server and a device link is pending.
    CodeDelivered,
    /// The linked device finished authenticating.
    ConnectionOpened {
        user_name: Option<String>,
        user_id: Option<String>,
    },
    ConnectionClosed(CloseReason),
}

/// Why the adapter's connection closed.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// Explicit authentication rejection (logged out, bad credentials).
    AuthenticationRejected(String),
    /// Anything else: network drops, server restarts, stream errors.
    Transient(String),
}

impl CloseReason {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::AuthenticationRejected(m) | Self::Transient(m) => m,
        }
    }
}

/// Receiving half of an adapter's event sequence for one pairing attempt.
///
/// Each call to [`ConnectionAdapter::begin_pairing`] yields a fresh stream;
/// the stream ending without a `ConnectionClosed` means the adapter went quiet.
pub type AdapterEvents = mpsc::Receiver<AdapterEvent>;

/// The external protocol client.
///
/// Implementations own the wire protocol, encryption, and credential storage.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Whether a linked device can ever open a connection through this adapter.
    /// Code-only adapters return false and their event streams end after the code.
    fn links_devices(&self) -> bool {
        true
    }

    /// Start (or restart) pairing for `phone` and return its event stream.
    async fn begin_pairing(&self, phone: &PhoneNumber) -> Result<AdapterEvents, PairgateError>;

    /// Send a text message to the linked account.
    async fn send_confirmation(&self, phone: &PhoneNumber, text: &str)
        -> Result<(), PairgateError>;

    /// Drop the connection for `phone`, if any.
    async fn disconnect(&self, phone: &PhoneNumber) -> Result<(), PairgateError>;
}

/// Severity for [`PairingLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Minimal structured logging capability injected into adapters, so they do
/// not depend on a particular logging library.
pub trait PairingLog: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, &str)]);
}
