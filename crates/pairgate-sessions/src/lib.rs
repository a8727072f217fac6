//! # pairgate-sessions
//!
//! Pairing session lifecycle: the in-memory [`SessionStore`], the
//! [`Notifier`] that fans updates out to observers, and the
//! [`SessionManager`] that drives each phone number through the state machine.

pub mod manager;
pub mod notify;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{PairingTicket, SessionManager, SweepReport};
pub use notify::{Notifier, SessionUpdate, Subscription};
pub use store::SessionStore;
