//! Interactive terminal pairing for a single phone number.

use crate::gateway::build_manager;
use pairgate_core::{config::Config, session::SessionSnapshot, session::SessionState};
use pairgate_sessions::{SessionUpdate, Subscription};
use std::time::Duration;
use tracing::info;

/// Run the interactive pairing flow for `phone`.
pub async fn pair_number(config: &Config, phone: &str) -> anyhow::Result<()> {
    cliclack::intro(console::style("pairgate pair").bold().to_string())?;

    let manager = build_manager(config);
    let mut updates = manager.subscribe_phone(phone);

    let ticket = match manager.request_pairing(phone).await {
        Ok(ticket) => ticket,
        Err(e) => {
            cliclack::log::error(e.to_string())?;
            cliclack::outro("Nothing paired.")?;
            anyhow::bail!("pairing request failed: {e}");
        }
    };

    cliclack::log::info("Open WhatsApp on your phone → Linked Devices → Link with phone number")?;
    let title = if ticket.placeholder {
        "Pairing code (generated locally)"
    } else {
        "Enter this code in WhatsApp"
    };
    cliclack::note(title, &ticket.pairing_code)?;

    if !manager.links_devices() {
        info!(
            "adapter {} only issues codes; not waiting for a link",
            manager.adapter_name()
        );
        cliclack::outro("This adapter only issues codes; no device will link through it.")?;
        manager.teardown().await;
        return Ok(());
    }

    let spinner = cliclack::spinner();
    spinner.start("Waiting for the device to link...");

    let window = Duration::from_secs(config.sessions.pending_ttl_secs.max(1));
    let outcome = tokio::time::timeout(window, wait_for_link(&mut updates)).await;

    match outcome {
        Ok(Ok(session)) => {
            let who = session.connected_user_name.as_deref().unwrap_or(phone);
            spinner.stop(format!("Linked as {who}"));
            cliclack::outro("Pairing complete.")?;
        }
        Ok(Err(reason)) => {
            spinner.error(format!("Pairing failed: {reason}"));
            cliclack::outro(format!("Try again with: pairgate pair {phone}"))?;
        }
        Err(_) => {
            spinner.error("Pairing did not complete in time.");
            cliclack::outro(format!("Try again with: pairgate pair {phone}"))?;
        }
    }

    manager.teardown().await;
    Ok(())
}

/// Follow one number's updates until it connects or the attempt ends.
async fn wait_for_link(updates: &mut Subscription) -> Result<SessionSnapshot, String> {
    while let Some(update) = updates.recv().await {
        match update {
            SessionUpdate::State(s) if s.state == SessionState::Connected => return Ok(s),
            SessionUpdate::State(s) if s.state == SessionState::Failed => {
                return Err(s.last_error.unwrap_or_else(|| "unknown error".into()));
            }
            SessionUpdate::Removed { .. } => return Err("session was removed".into()),
            _ => {}
        }
    }
    Err("session updates stopped".into())
}
