//! Event stream over WebSocket.
//!
//! `GET /api/events` upgrades to a WebSocket that forwards the caller's
//! events as JSON text frames `{"event": ..., "payload": ...}`. Frames sent
//! by the client are ignored; a close frame or a send failure ends the
//! stream. The server closes the stream once the token that opened it is
//! signed out or revoked.

use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};

use crate::models::Principal;
use crate::services::auth::AuthService;
use crate::services::events::UserEvents;
use crate::state::AppState;

/// How often an open stream re-checks its session.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// `GET /api/events`
pub async fn subscribe(
    State(state): State<AppState>,
    principal: Principal,
    ws: WebSocketUpgrade,
) -> Response {
    let events = state.events().subscribe(principal.user_id());
    let auth = state.auth().clone();
    ws.on_upgrade(move |socket| forward(socket, events, auth, principal))
}

async fn forward(
    mut socket: WebSocket,
    mut events: UserEvents,
    auth: AuthService,
    principal: Principal,
) {
    let mut session_check = tokio::time::interval_at(
        tokio::time::Instant::now() + SESSION_CHECK_INTERVAL,
        SESSION_CHECK_INTERVAL,
    );
    loop {
        tokio::select! {
            _ = session_check.tick() => {
                match auth.session_alive(&principal).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!(user_id = %principal.user_id(), "Session ended, closing event stream");
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    Err(e) => tracing::warn!(error = %e, "Session check failed"),
                }
            }
            event = events.next() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    tracing::debug!("Event stream closed");
}
