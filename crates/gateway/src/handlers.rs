use std::sync::Arc;

use {
    axum::{
        Json,
        extract::{Path, State, rejection::JsonRejection},
        response::IntoResponse,
    },
    serde::{Deserialize, Serialize},
    serde_json::json,
    tracing::{info, warn},
    wabridge_channels::{ProviderError, chat_id_for},
    wabridge_common::types::ERROR_SEND_FAILED,
    wabridge_delivery::correlation_key,
    wabridge_sessions::{ChallengeStatus, Connection, SessionState, SessionSummary},
};

use crate::{error::ApiError, state::GatewayState};

/// Destinations shorter than this are rejected before reaching the provider.
pub const MIN_DESTINATION_LEN: usize = 10;

type AppState = State<Arc<GatewayState>>;

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::Validation(e.body_text()))
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{name} is required")))
}

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn health(State(state): AppState) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": state.version,
        "sessions": state.sessions.session_count(),
    }))
}

// ── Sessions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub status: SessionState,
}

pub async fn start_session(
    State(state): AppState,
    body: Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<Json<StateResponse>, ApiError> {
    let user_id = required(parse_body(body)?.user_id, "userId")?;
    let status = state.sessions.start(&user_id).await?;
    Ok(Json(StateResponse { status }))
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub total: usize,
    pub sessions: Vec<SessionSummary>,
}

pub async fn list_sessions(State(state): AppState) -> Json<SessionList> {
    let sessions = state.sessions.list_active();
    Json(SessionList {
        total: sessions.len(),
        sessions,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub user_id: String,
    pub status: SessionState,
}

pub async fn session_status(
    State(state): AppState,
    Path(user_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let status = state.sessions.status(&user_id)?;
    Ok(Json(SessionStatusResponse { user_id, status }))
}

pub async fn session_challenge(
    State(state): AppState,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.sessions.get_challenge(&user_id) {
        ChallengeStatus::Available(challenge) => Ok(Json(json!({
            "status": "success",
            "challenge": challenge,
        }))),
        ChallengeStatus::AlreadyConnected => Ok(Json(json!({ "status": "already_connected" }))),
        ChallengeStatus::NotAvailable => Err(ApiError::NotFound(format!(
            "no challenge available for {user_id}"
        ))),
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub status: &'static str,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

pub async fn session_connection(
    State(state): AppState,
    Path(user_id): Path<String>,
) -> Json<ConnectionResponse> {
    let response = match state.sessions.connection(&user_id) {
        Connection::NotFound => ConnectionResponse {
            status: "not_found",
            connected: false,
            account: None,
        },
        Connection::Initializing => ConnectionResponse {
            status: "initializing",
            connected: false,
            account: None,
        },
        Connection::Connected { account } => ConnectionResponse {
            status: "connected",
            connected: true,
            account: Some(account),
        },
        Connection::NotConnected => ConnectionResponse {
            status: "not_connected",
            connected: false,
            account: None,
        },
    };
    Json(response)
}

pub async fn stop_session(
    State(state): AppState,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.sessions.stop(&user_id).await?;
    Ok(Json(json!({ "status": outcome.as_str() })))
}

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub user_id: Option<String>,
    pub destination: Option<String>,
    pub body: Option<String>,
    pub media_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub status: &'static str,
    pub to: String,
    pub message_id: String,
}

pub async fn send_message(
    State(state): AppState,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let req = parse_body(body)?;
    let user_id = required(req.user_id, "userId")?;
    let destination = req.destination.unwrap_or_default().trim().to_string();
    if destination.len() < MIN_DESTINATION_LEN {
        return Err(ApiError::Validation(format!(
            "destination must be at least {MIN_DESTINATION_LEN} characters"
        )));
    }
    let text = req.body.filter(|b| !b.is_empty());
    let media_url = req.media_url.filter(|u| !u.trim().is_empty());
    if text.is_none() && media_url.is_none() {
        return Err(ApiError::Validation("body or mediaUrl is required".into()));
    }

    let client = state.sessions.ready_client(&user_id)?;
    let chat_id = chat_id_for(&destination);
    let timeout = state.sessions.provider_timeout();
    let send = async {
        match media_url.as_deref() {
            Some(url) => client.send_media(&chat_id, url, text.as_deref()).await,
            None => client.send_text(&chat_id, text.as_deref().unwrap_or_default()).await,
        }
    };

    let sent = match tokio::time::timeout(timeout, send).await {
        Ok(Ok(sent)) => sent,
        Ok(Err(e)) => {
            warn!(user_id = %user_id, error = %e, "send failed");
            if let ProviderError::Send {
                message_id: Some(id),
                ..
            } = &e
            {
                state
                    .tracker
                    .report_send_failure(correlation_key(id), ERROR_SEND_FAILED);
            }
            return Err(ApiError::Provider(e.to_string()));
        },
        Err(_) => {
            warn!(user_id = %user_id, ?timeout, "send timed out");
            return Err(ApiError::Timeout(format!("send timed out after {timeout:?}")));
        },
    };

    let message_id = correlation_key(&sent.id).to_string();
    state.tracker.record_sent(&message_id);
    info!(user_id = %user_id, message_id = %message_id, "message sent");

    Ok(Json(SendMessageResponse {
        status: "message_sent",
        to: destination,
        message_id,
    }))
}
