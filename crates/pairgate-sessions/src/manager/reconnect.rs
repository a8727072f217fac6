//! Per-number driver loop and reconnect backoff.

use super::{as_adapter_error, Flow, SessionManager};
use crate::notify::SessionUpdate;
use chrono::{DateTime, Utc};
use pairgate_core::{
    error::PairgateError,
    phone::PhoneNumber,
    session::SessionState,
    traits::{AdapterEvents, CloseReason},
};
use tracing::{debug, info, warn};

/// Outcome of one reconnect attempt.
enum Attempt {
    /// The adapter accepted the restart; consume its new event stream.
    Ready(AdapterEvents),
    /// The restart failed transiently; back off and try again.
    Retry,
    /// The session is gone, replaced, or out of retries.
    GiveUp,
}

impl SessionManager {
    /// Consume adapter events for one number until the attempt ends.
    ///
    /// A retryable close sleeps for the configured backoff and restarts the
    /// adapter, re-entering `PairingRequested` with `retry_count + 1`. The
    /// loop runs on the driver task, so aborting that task cancels any
    /// pending reconnect.
    pub(super) async fn drive(
        self,
        phone: PhoneNumber,
        epoch: DateTime<Utc>,
        mut events: AdapterEvents,
    ) {
        loop {
            match self.pump(&phone, epoch, &mut events).await {
                Flow::Reconnect => {}
                Flow::Stop | Flow::Continue => return,
            }

            loop {
                tokio::time::sleep(self.config().backoff()).await;
                match self.reconnect(&phone, epoch).await {
                    Attempt::Ready(next) => {
                        events = next;
                        break;
                    }
                    Attempt::Retry => continue,
                    Attempt::GiveUp => return,
                }
            }
        }
    }

    /// Apply events in order until the stream ends or a close is handled.
    async fn pump(
        &self,
        phone: &PhoneNumber,
        epoch: DateTime<Utc>,
        events: &mut AdapterEvents,
    ) -> Flow {
        while let Some(event) = events.recv().await {
            match self.handle_event(phone, epoch, event).await {
                Flow::Continue => {}
                flow => return flow,
            }
        }
        debug!("adapter event stream for {phone} ended");
        Flow::Stop
    }

    /// Re-enter `PairingRequested` and restart the adapter.
    async fn reconnect(&self, phone: &PhoneNumber, epoch: DateTime<Utc>) -> Attempt {
        let snapshot = match self
            .update_attempt(phone, epoch, |s| {
                s.transition(SessionState::PairingRequested)?;
                s.retry_count += 1;
                Ok(())
            })
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("reconnect for {phone} skipped: {e}");
                return Attempt::GiveUp;
            }
        };
        info!(
            "reconnecting {phone} (attempt {}/{})",
            snapshot.retry_count,
            self.config().max_retries
        );
        self.notifier().publish(SessionUpdate::State(snapshot));

        match self.adapter().begin_pairing(phone).await {
            Ok(events) => Attempt::Ready(events),
            Err(e) => {
                warn!("reconnect for {phone} failed: {e}");
                let reason = match as_adapter_error(e) {
                    PairgateError::AuthenticationRejected(m) => {
                        CloseReason::AuthenticationRejected(m)
                    }
                    other => CloseReason::Transient(other.to_string()),
                };
                match self.handle_close(phone, epoch, reason).await {
                    Flow::Reconnect => Attempt::Retry,
                    Flow::Stop | Flow::Continue => Attempt::GiveUp,
                }
            }
        }
    }
}
