//! Local fallback adapter.
//!
//! Issues a generated six-digit code for every request and never opens a
//! protocol connection. Useful for demos and for running the portal without
//! protocol credentials.

use async_trait::async_trait;
use pairgate_core::{
    code::generate_code,
    error::PairgateError,
    phone::PhoneNumber,
    traits::{AdapterEvent, AdapterEvents, ConnectionAdapter, LogLevel, PairingLog},
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Adapter that fabricates pairing codes locally.
pub struct LocalCodeAdapter {
    log: Arc<dyn PairingLog>,
}

impl LocalCodeAdapter {
    pub fn new(log: Arc<dyn PairingLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ConnectionAdapter for LocalCodeAdapter {
    fn name(&self) -> &str {
        "local"
    }

    fn links_devices(&self) -> bool {
        false
    }

    async fn begin_pairing(&self, phone: &PhoneNumber) -> Result<AdapterEvents, PairgateError> {
        let code = generate_code();
        self.log.log(
            LogLevel::Info,
            "pairing code generated",
            &[("phone", phone.as_str()), ("code", &code)],
        );

        // The sender is dropped on return: the stream ends after the code.
        let (tx, rx) = mpsc::channel(1);
        tx.try_send(AdapterEvent::PairingCodeIssued(code))
            .map_err(|e| PairgateError::AdapterFailure(e.to_string()))?;
        Ok(rx)
    }

    async fn send_confirmation(
        &self,
        phone: &PhoneNumber,
        _text: &str,
    ) -> Result<(), PairgateError> {
        self.log.log(
            LogLevel::Debug,
            "local adapter has no connection; confirmation skipped",
            &[("phone", phone.as_str())],
        );
        Ok(())
    }

    async fn disconnect(&self, phone: &PhoneNumber) -> Result<(), PairgateError> {
        self.log.log(
            LogLevel::Debug,
            "local adapter disconnect",
            &[("phone", phone.as_str())],
        );
        Ok(())
    }
}
