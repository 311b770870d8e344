//! WebSocket feed for real-time note sync.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::AppState;
use crate::notes::NoteWsMessage;
use crate::notes::query::sort_newest_first;

/// Build the Axum router for `/ws/notes`.
pub fn note_routes(state: AppState) -> Router {
    Router::new()
        .route("/ws/notes", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("Notes WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// All notes, newest first. `None` when the sheet cannot be read.
async fn sync_message(state: &AppState) -> Option<NoteWsMessage> {
    match state.workbook.list_notes().await {
        Ok(mut notes) => {
            sort_newest_first(&mut notes);
            Some(NoteWsMessage::NotesSync { notes })
        }
        Err(e) => {
            warn!(error = %e, "Failed to load notes for sync");
            None
        }
    }
}

/// Returns false once the client is gone.
async fn send(socket: &mut WebSocket, msg: &NoteWsMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode note message");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("Notes WebSocket client connected");

    // Subscribe before the snapshot so nothing falls between the two.
    let mut rx = state.tx.subscribe();

    if let Some(sync) = sync_message(&state).await {
        if !send(&mut socket, &sync).await {
            warn!("Failed to send initial note sync, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if !send(&mut socket, &msg).await {
                            debug!("Notes WS client disconnected during send");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Notes WS client lagged behind broadcast");
                        if let Some(sync) = sync_message(&state).await {
                            if !send(&mut socket, &sync).await {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Notes broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        // The feed is one-way; writes go through the REST API.
                        debug!(len = text.len(), "Ignoring client text on notes WS");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Notes WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Notes WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Notes WebSocket connection closed");
}
