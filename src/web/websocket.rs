//! WebSocket bridge between a browser panel and the coordinator.

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;

use super::WebState;
use crate::core::{PanelHandle, UiCommand, UiMessage};

/// Handle WebSocket upgrade requests
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: WebState) {
    let mut outbound = state.panel.subscribe();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ignore binary, ping, pong
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                };

                match forward(&state.panel, text.as_str()) {
                    Forwarded::Queued => {}
                    Forwarded::Rejected(rejection) => {
                        if !send_message(&mut socket, &rejection).await {
                            break;
                        }
                    }
                    Forwarded::Closed => break,
                }
            }
            message = outbound.recv() => match message {
                Ok(message) => {
                    if !send_message(&mut socket, &message).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Panel fell behind, messages dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::debug!("WebSocket connection closed");
}

enum Forwarded {
    Queued,
    /// Reply for this socket only.
    Rejected(UiMessage),
    Closed,
}

/// Parse a panel frame and queue it for the coordinator without waiting.
fn forward(panel: &PanelHandle, text: &str) -> Forwarded {
    let command = match serde_json::from_str::<UiCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            return Forwarded::Rejected(UiMessage::CommandRejected {
                entry_id: None,
                message: format!("Malformed command: {}", e),
            });
        }
    };

    match panel.try_send(command) {
        Ok(()) => Forwarded::Queued,
        Err(TrySendError::Full(command)) => {
            tracing::warn!(command = ?command, "Command queue full, command dropped");
            Forwarded::Rejected(UiMessage::CommandRejected {
                entry_id: command.entry_id().map(str::to_string),
                message: "Coordinator is busy, try again".to_string(),
            })
        }
        Err(TrySendError::Closed(_)) => Forwarded::Closed,
    }
}

async fn send_message(socket: &mut WebSocket, message: &UiMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize panel message");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}
