//! WebSocket endpoint
//!
//! One authenticated socket per user session. The handshake authenticates
//! (header or `token` query parameter), the connection registers with the
//! fan-out registry, a reconnecting driver is re-shown any outstanding
//! offer, and inbound `respond` messages feed the response resolver.
//! Unregistration runs on every exit path, graceful close or not.

use crate::auth::{AuthenticatedUser, Role};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tracing::{debug, info, warn};
use types::events::{ClientMessage, ServerEvent};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Response, AppError> {
    state
        .rate_limiter
        .check_rate_limit(&format!("{}:ws_connections", user.user_id), 10, 10.0)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: AuthenticatedUser) {
    let (conn_id, mut rx) = state.registry.register(user.user_id);
    info!(user_id = %user.user_id, conn_id, role = ?user.role, "websocket connected");

    // Reconnect resync: an offer created while the driver was offline is
    // still outstanding; re-push it so the client can answer.
    if user.role == Role::Driver {
        match state
            .engine
            .outstanding_offer_for(user.user_id.into())
            .await
        {
            Ok(Some(offer)) => {
                state.registry.push(user.user_id, ServerEvent::Offer(offer));
            }
            Ok(None) => {}
            Err(err) => warn!(user_id = %user.user_id, %err, "offer resync failed"),
        }
    }

    let (mut sender, mut receiver) = socket.split();

    // Writer: drain the registry channel onto the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader: accept client messages until the socket goes away.
    let reader_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_client_message(&reader_state, &user, text.as_str()).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever half dies first takes the other with it.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.unregister(user.user_id, conn_id);
    info!(user_id = %user.user_id, conn_id, "websocket disconnected");
}

async fn handle_client_message(state: &AppState, user: &AuthenticatedUser, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(user_id = %user.user_id, %err, "unparseable client message");
            state.registry.push(
                user.user_id,
                ServerEvent::Error {
                    message: "unrecognized message".to_string(),
                },
            );
            return;
        }
    };

    match message {
        ClientMessage::Respond {
            attempt_id,
            accepted,
            reason,
        } => {
            if user.role != Role::Driver {
                state.registry.push(
                    user.user_id,
                    ServerEvent::Error {
                        message: "only drivers may respond to offers".to_string(),
                    },
                );
                return;
            }

            // Success outcomes fan out from the resolver itself
            // (accept-confirmed / declined-confirmed / assigned); only
            // failures need an explicit answer here.
            if let Err(err) = state
                .engine
                .respond(attempt_id, user.user_id.into(), accepted, reason)
                .await
            {
                debug!(user_id = %user.user_id, %attempt_id, %err, "respond rejected");
                state.registry.push(
                    user.user_id,
                    ServerEvent::Error {
                        message: err.to_string(),
                    },
                );
            }
        }
    }
}
