//! Realtime pairing over WebSocket.
//!
//! Frames are JSON text `{ "event": ..., "data": {...} }`. Clients send
//! `connect-whatsapp` / `disconnect-whatsapp` with a `phoneNumber`; the server
//! pushes `pairing-code`, `qr-code`, `connected`, `disconnected` and `error`
//! for the numbers this socket asked about.

use crate::api::ApiState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use pairgate_channels::qr::generate_qr_data_url;
use pairgate_core::{error::PairgateError, session::SessionState};
use pairgate_sessions::{SessionManager, SessionUpdate};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A command parsed from a client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClientCommand {
    Connect(String),
    Disconnect(String),
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

fn parse_client_frame(text: &str) -> Result<ClientCommand, String> {
    let frame: ClientFrame =
        serde_json::from_str(text).map_err(|_| "Malformed message".to_string())?;
    let phone = frame
        .data
        .get("phoneNumber")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match frame.event.as_str() {
        "connect-whatsapp" => Ok(ClientCommand::Connect(phone)),
        "disconnect-whatsapp" => Ok(ClientCommand::Disconnect(phone)),
        other => Err(format!("Unknown event: {other}")),
    }
}

/// An outgoing server frame.
#[derive(Debug, Clone, PartialEq)]
struct ServerFrame {
    event: &'static str,
    data: Value,
}

impl ServerFrame {
    fn new(event: &'static str, data: Value) -> Self {
        Self { event, data }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::new("error", json!({ "message": message.into() }))
    }

    fn to_text(&self) -> String {
        json!({ "event": self.event, "data": self.data }).to_string()
    }
}

/// Per-socket view: which numbers it follows and the last code it was shown.
#[derive(Debug, Default)]
struct Watch {
    phones: HashMap<String, Option<String>>,
}

impl Watch {
    /// Apply one client frame. `None` when the reply already arrives as a
    /// session update this socket follows.
    async fn handle_text(&mut self, manager: &SessionManager, text: &str) -> Option<ServerFrame> {
        let command = match parse_client_frame(text) {
            Ok(command) => command,
            Err(message) => return Some(ServerFrame::error(message)),
        };

        let frame = match command {
            ClientCommand::Connect(phone) => {
                let newly_watched = !self.phones.contains_key(&phone);
                self.phones.entry(phone.clone()).or_insert(None);
                match manager.request_pairing(&phone).await {
                    Ok(ticket) => {
                        self.phones
                            .insert(phone, Some(ticket.pairing_code.clone()));
                        ServerFrame::new("pairing-code", json!({ "code": ticket.pairing_code }))
                    }
                    Err(e) => {
                        if newly_watched {
                            self.phones.remove(&phone);
                        } else if matches!(
                            e,
                            PairgateError::AdapterFailure(_)
                                | PairgateError::AuthenticationRejected(_)
                        ) {
                            // The attempt was marked failed and that update carries the error.
                            return None;
                        }
                        ServerFrame::error(e.to_string())
                    }
                }
            }
            ClientCommand::Disconnect(phone) => {
                self.phones.remove(&phone);
                match manager.disconnect(&phone).await {
                    Ok(_) => ServerFrame::new("disconnected", json!({ "phoneNumber": phone })),
                    Err(e) => ServerFrame::error(e.to_string()),
                }
            }
        };
        Some(frame)
    }

    /// Translate a session update into a frame, if this socket cares about it.
    fn frame_for(&mut self, update: &SessionUpdate) -> Option<ServerFrame> {
        let last_code = self.phones.get_mut(update.phone_number())?;

        match update {
            SessionUpdate::Qr { qr, .. } => match generate_qr_data_url(qr) {
                Ok(url) => Some(ServerFrame::new("qr-code", json!({ "qr": url }))),
                Err(e) => {
                    warn!("QR render for {} failed: {e}", update.phone_number());
                    None
                }
            },
            SessionUpdate::Removed { phone_number } => Some(ServerFrame::new(
                "disconnected",
                json!({ "phoneNumber": phone_number }),
            )),
            SessionUpdate::State(s) => match s.state {
                SessionState::Connected => Some(ServerFrame::new(
                    "connected",
                    json!({
                        "phoneNumber": s.phone_number,
                        "user": { "name": s.connected_user_name, "id": s.connected_user_id },
                    }),
                )),
                SessionState::Disconnected => Some(ServerFrame::new(
                    "disconnected",
                    json!({ "phoneNumber": s.phone_number, "reason": s.last_error }),
                )),
                SessionState::Failed => Some(ServerFrame::error(
                    s.last_error.clone().unwrap_or_else(|| "Pairing failed".into()),
                )),
                SessionState::PairingRequested | SessionState::AwaitingLinkConfirmation => {
                    let code = s.pairing_code.clone()?;
                    if last_code.as_deref() == Some(code.as_str()) {
                        return None;
                    }
                    *last_code = Some(code.clone());
                    Some(ServerFrame::new("pairing-code", json!({ "code": code })))
                }
                SessionState::Idle => None,
            },
        }
    }
}

/// `GET /ws`: upgrade to the realtime protocol.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.manager))
}

async fn handle_socket(socket: WebSocket, manager: SessionManager) {
    let client_id = Uuid::new_v4();
    info!(%client_id, "realtime client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut updates = manager.subscribe();
    let mut watch = Watch::default();

    loop {
        let outgoing = tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match watch.handle_text(&manager, text.as_str()).await {
                    Some(frame) => frame,
                    None => continue,
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(%client_id, "realtime receive error: {e}");
                    break;
                }
            },
            update = updates.recv() => match update {
                Some(update) => match watch.frame_for(&update) {
                    Some(frame) => frame,
                    None => continue,
                },
                None => break,
            },
        };

        if sender
            .send(Message::Text(outgoing.to_text().into()))
            .await
            .is_err()
        {
            break;
        }
    }

    info!(%client_id, "realtime client disconnected");
}
