//! WebSocket handler for live feed updates.
//!
//! On connect the client receives the latest entry set (if one has been
//! published), then the full set again on every change. `{"type":"ping"}`
//! is answered with `{"type":"pong"}`.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tokio::sync::watch;
use tracing::debug;

use super::ApiState;
use crate::feed::FeedSnapshot;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    let updates = state.feed_updates.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, updates))
}

/// Serialize the entry array pushed to clients.
fn entries_message(snapshot: &FeedSnapshot) -> Option<Message> {
    serde_json::to_string(snapshot.entries.as_ref()).ok().map(Message::Text)
}

async fn handle_socket(mut socket: WebSocket, mut updates: watch::Receiver<FeedSnapshot>) {
    // Seed the new client with the retained set.
    let initial = {
        let snapshot = updates.borrow_and_update();
        snapshot.is_published().then(|| entries_message(&snapshot)).flatten()
    };
    if let Some(msg) = initial {
        if socket.send(msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let msg = entries_message(&updates.borrow_and_update());
                if let Some(msg) = msg {
                    if socket.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let is_ping = serde_json::from_str::<serde_json::Value>(&text)
                            .ok()
                            .and_then(|cmd| cmd.get("type").and_then(|v| v.as_str()).map(|t| t == "ping"))
                            .unwrap_or(false);
                        if is_ping {
                            let pong = serde_json::json!({"type": "pong"});
                            if socket.send(Message::Text(pong.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("WebSocket client disconnected");
}
