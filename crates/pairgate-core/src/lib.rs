//! # pairgate-core
//!
//! Shared building blocks for the pairing portal: configuration, the error
//! type, phone-number validation, pairing-code generation, the session model,
//! and the adapter/logging traits that sit at the protocol boundary.

pub mod code;
pub mod config;
pub mod error;
pub mod phone;
pub mod session;
pub mod traits;

/// Expand a leading `~` to the user's home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    } else if path == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return home;
        }
    }
    path.to_string()
}
