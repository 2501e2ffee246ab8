//! Executor WebSocket Endpoint
//!
//! Each executor process keeps one WebSocket open per executor key. Requests
//! from the engine go out as JSON text frames; streamed events and final
//! outcomes come back the same way and are routed to the scheduler.

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::Message, ws::WebSocket},
    response::IntoResponse,
};
use cadence_core::dto::dispatch::ExecutorMessage;
use cadence_engine::Scheduler;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::api::AppState;

/// GET /api/executors/{key}/connect
/// Upgrade to a WebSocket serving the executor key
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(executor_key): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, state, executor_key))
}

/// Per-connection event loop, lives for the entire session
async fn run_connection(socket: WebSocket, state: AppState, executor_key: String) {
    let (connection_id, mut requests) = state.transport.connect(executor_key.as_str());
    let (mut tx, mut rx) = socket.split();

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else { break };
                let invocation_id = request.invocation_id;

                let payload = match serde_json::to_string(&request) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to encode invocation {}: {}", invocation_id, e);
                        continue;
                    }
                };
                if tx.send(Message::Text(payload.into())).await.is_err() {
                    warn!(
                        "Connection {} dropped while sending invocation {}",
                        connection_id, invocation_id
                    );
                    break;
                }
            }

            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        route_message(&state.scheduler, &connection_id, text.as_str());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Connection {} errored: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    }

    state.transport.disconnect(&connection_id);
    state.scheduler.on_disconnect(&connection_id);
    info!(
        "Executor connection {} for '{}' closed",
        connection_id, executor_key
    );
}

/// Routes one inbound frame to the scheduler
///
/// # Returns
/// `false` if the frame was malformed or referenced no pending invocation
pub fn route_message(scheduler: &Scheduler, connection_id: &str, text: &str) -> bool {
    let message: ExecutorMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed frame from {}: {}", connection_id, e);
            return false;
        }
    };

    match message {
        ExecutorMessage::Streamed {
            invocation_id,
            event,
        } => {
            scheduler.on_streamed(connection_id, invocation_id, event);
            true
        }
        ExecutorMessage::Final {
            invocation_id,
            outcome,
        } => {
            let routed = scheduler.on_final(connection_id, invocation_id, outcome);
            if !routed {
                debug!(
                    "Final response for unknown invocation {} from {}",
                    invocation_id, connection_id
                );
            }
            routed
        }
    }
}
