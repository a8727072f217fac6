//! # pairgate-channels
//!
//! Connection adapter implementations and their support code.
//!
//! - [`local::LocalCodeAdapter`] issues locally generated codes and never connects.
//! - [`log::TracingLog`] is the [`PairingLog`](pairgate_core::traits::PairingLog)
//!   handed to adapters.
//! - [`qr`] renders adapter QR payloads for browsers.

pub mod local;
pub mod log;
pub mod qr;
