//! HTTP API for the pairing portal.
//!
//! Every JSON endpoint answers HTTP 200; failures are reported in the payload
//! as `{ "success": false, "error": ... }` so the form page can show them.

use crate::realtime;
use axum::{
    extract::{rejection::QueryRejection, FromRequest, Query, Request, State},
    http::header,
    response::{Html, Json},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use pairgate_core::{
    error::PairgateError,
    session::{SessionSnapshot, SessionState},
};
use pairgate_sessions::SessionManager;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub(crate) manager: SessionManager,
    uptime: Instant,
}

impl ApiState {
    pub fn new(manager: SessionManager) -> Self {
        Self {
            manager,
            uptime: Instant::now(),
        }
    }
}

/// Request body carrying a phone number.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneBody {
    #[serde(default)]
    pub phone_number: String,
}

/// Accepts [`PhoneBody`] as JSON or as a urlencoded form, picked by
/// `Content-Type`. A malformed body becomes a failure payload.
pub struct PhoneInput(pub PhoneBody);

impl<S> FromRequest<S> for PhoneInput
where
    S: Send + Sync,
{
    type Rejection = Json<Value>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let body = if is_json {
            Json::<PhoneBody>::from_request(req, state)
                .await
                .map(|Json(b)| b)
                .map_err(|e| e.body_text())
        } else {
            Form::<PhoneBody>::from_request(req, state)
                .await
                .map(|Form(b)| b)
                .map_err(|e| e.body_text())
        };

        body.map(PhoneInput).map_err(|e| {
            debug!("rejected request body: {e}");
            failure("Invalid request body")
        })
    }
}

fn failure(message: &str) -> Json<Value> {
    Json(json!({ "success": false, "error": message }))
}

/// Message shown to the user for a failed pairing request.
fn client_message(err: &PairgateError) -> String {
    match err {
        PairgateError::InvalidPhoneNumber(_)
        | PairgateError::AlreadyInProgress(_)
        | PairgateError::AdapterFailure(_)
        | PairgateError::AuthenticationRejected(_) => err.to_string(),
        _ => "Could not generate pairing code".to_string(),
    }
}

/// `GET /`: the phone-number form.
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `POST /get-code` and `POST /connect`: start pairing, return the code.
async fn get_code(State(state): State<ApiState>, PhoneInput(body): PhoneInput) -> Json<Value> {
    match state.manager.request_pairing(&body.phone_number).await {
        Ok(ticket) => Json(json!({ "success": true, "code": ticket.pairing_code })),
        Err(e) => {
            if e.is_validation() {
                debug!("pairing request rejected: {e}");
            } else {
                warn!("pairing request for {} failed: {e}", body.phone_number);
            }
            failure(&client_message(&e))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusQuery {
    phone_number: Option<String>,
}

fn status_json(snapshot: Option<&SessionSnapshot>) -> Value {
    match snapshot {
        Some(s) => json!({
            "connected": s.state == SessionState::Connected,
            "phoneNumber": s.phone_number,
            "userName": s.connected_user_name,
            "pairingCode": s.pairing_code,
            "state": s.state,
        }),
        None => json!({
            "connected": false,
            "phoneNumber": null,
            "userName": null,
            "pairingCode": null,
            "state": null,
        }),
    }
}

/// `GET /connection-status[?phoneNumber=]`: poll one session, or the most
/// recently updated one when no number is given. A query that does not
/// parse gets the empty status.
async fn connection_status(
    State(state): State<ApiState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Json<Value> {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => {
            debug!("unreadable status query: {e}");
            return Json(status_json(None));
        }
    };
    let snapshot = match query.phone_number.as_deref().filter(|p| !p.is_empty()) {
        Some(phone) => state.manager.get_status(phone).await.ok(),
        None => state.manager.latest().await,
    };
    Json(status_json(snapshot.as_ref()))
}

/// `GET /health`: liveness with the live session count.
async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "online",
        "connections": state.manager.live_count().await,
        "timestamp": Utc::now().to_rfc3339(),
        "uptimeSecs": state.uptime.elapsed().as_secs(),
    }))
}

/// `POST /disconnect`: drop a session at the user's request.
async fn disconnect(State(state): State<ApiState>, PhoneInput(body): PhoneInput) -> Json<Value> {
    match state.manager.disconnect(&body.phone_number).await {
        Ok(_) => Json(json!({ "success": true })),
        Err(e) => failure(&e.to_string()),
    }
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/get-code", post(get_code))
        .route("/connect", post(get_code))
        .route("/connection-status", get(connection_status))
        .route("/health", get(health))
        .route("/disconnect", post(disconnect))
        .route("/ws", get(realtime::ws_handler))
        .with_state(state)
}
