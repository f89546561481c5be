//! WebSocket transport: upgrade handling and the per-connection task.
//!
//! Each connection owns an unbounded mpsc channel. Handlers (acks, protocol
//! errors, fan-out broadcasts) push serialized frames into the channel and
//! the socket loop forwards them to the sink, so no handler ever awaits
//! socket I/O. The same loop reads client frames in order, feeds them to the
//! router, and runs a ping/pong keepalive.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::registry::ConnectionHandle;
use crate::router::{self, ConnectionSession};
use crate::server::SharedState;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (sender, receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let conn = ConnectionHandle::new(tx);
    let mut session = ConnectionSession::new();

    debug!(conn = %conn.id, "websocket connection established");

    run_socket_loop(&state, &conn, &mut session, sender, receiver, rx).await;

    // The connection may close before ever authenticating; unregister is
    // idempotent either way.
    if let Some(user_id) = &session.user_id {
        state.registry.unregister(user_id, conn.id).await;
        info!(user = %user_id, conn = %conn.id, "user disconnected");
    } else {
        debug!(conn = %conn.id, "unauthenticated connection closed");
    }
}

/// Core per-connection loop with ping/pong keepalive.
///
/// Combines outbound frame forwarding, inbound message routing, and
/// periodic ping/pong health checking into a single select loop. If no Pong
/// is received within [`PONG_TIMEOUT`] after a Ping is sent, the connection
/// is considered dead and the loop exits.
async fn run_socket_loop(
    state: &SharedState,
    conn: &ConnectionHandle,
    session: &mut ConnectionSession,
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    // Connection is dead — no pong received in time
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Outbound frames (acks, errors, fan-out) ─────────────
            frame = rx.recv() => {
                match frame {
                    Some(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // All handles dropped; nothing can send here anymore.
                    None => break,
                }
            }

            // ── Inbound client messages ─────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        router::handle_frame(state, conn, session, text.as_str()).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ignore Binary and Ping (axum answers pings itself).
                    }
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_constants() {
        // PONG_TIMEOUT must exceed PING_INTERVAL so a fresh connection is
        // not immediately considered dead.
        assert!(PONG_TIMEOUT > PING_INTERVAL);
    }
}
