//! WebSocket bridge for live call connections.
//!
//! The socket protocol: binary frames carry raw audio for the current
//! segment; text frames carry JSON control messages. Outbound events are
//! JSON text frames mirroring [`CallEvent`], with reply audio base64-encoded
//! inside the `result` event.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use luna_call::{CallEvent, CallSession};

use crate::state::AppState;

/// Control messages a client may send as JSON text frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Finalize the current segment.
    SegmentEnd,
    /// End the call; any unfinalized audio is discarded.
    Close,
}

/// GET /call/{id} - upgrade to a live call connection.
pub async fn call_upgrade(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    info!(session = %session_id, "Call connection opened");
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (handle, mut events) = CallSession::spawn(
        session_id.clone(),
        state.orchestrator.clone(),
        state.transcriber.clone(),
        state.synthesizer.clone(),
        state.call_session_config(),
    );

    // Writer half: forward session events to the socket until either side
    // goes away.
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let value = event_json(event);
            let text = match serde_json::to_string(&value) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize call event: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                warn!(session = %session_id, "Call socket receive error: {}", e);
                break;
            }
        };

        match message {
            Message::Binary(data) => {
                if handle.audio(data.to_vec()).await.is_err() {
                    break;
                }
            }
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::SegmentEnd) => {
                    if handle.segment_end().await.is_err() {
                        break;
                    }
                }
                Ok(ClientMessage::Close) => break,
                Err(e) => {
                    debug!(session = %session_id, "Ignoring malformed control message: {}", e);
                }
            },
            Message::Close(_) => break,
            // axum answers pings on its own.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let _ = handle.close().await;
    let _ = writer.await;
    info!(session = %session_id, "Call connection closed");
}

fn event_json(event: CallEvent) -> serde_json::Value {
    match event {
        CallEvent::Partial { text } => json!({
            "type": "partial",
            "text": text,
        }),
        CallEvent::Result(result) => json!({
            "type": "result",
            "segment": result.segment,
            "transcript": result.transcript,
            "reply": result.reply,
            "mood": result.mood.to_string(),
            "audio_base64": result
                .audio
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
        }),
        CallEvent::Error { segment, message } => json!({
            "type": "error",
            "segment": segment,
            "message": message,
        }),
    }
}
