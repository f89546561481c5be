//! Live-connection bookkeeping, keyed by user id.
//!
//! A user may hold several connections at once (multiple tabs, multiple
//! devices). The registry maps each user id to the set of outbound channels
//! for that user's sockets so a job result can be fanned out to all of them.
//! Nothing here is persisted; a connection exists only while its socket task
//! is alive.

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error};
use uuid::Uuid;

use crate::protocol::ServerMessage;

pub type ConnId = Uuid;

/// Outbound half of one client connection.
///
/// Frames pushed into the channel are forwarded to the socket by the
/// connection's own task, so senders never await socket I/O. The handle is
/// what submission handlers use to acknowledge the originating connection;
/// the registry holds a clone for fan-out.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnId,
    tx: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Serialize and queue a frame for this connection. A closed channel
    /// means the socket task already exited; the frame is dropped.
    pub fn send(&self, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => {
                error!("failed to serialize server frame: {e}");
            }
        }
    }

    /// Queue an already-serialized frame.
    fn send_raw(&self, frame: &str) -> bool {
        self.tx.send(frame.to_string()).is_ok()
    }
}

/// Maps user ids to their live connections.
///
/// Invariant: a user id key exists iff its connection set is non-empty.
/// Emptied sets are removed immediately so fully-disconnected users do not
/// leak map entries.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<String, HashMap<ConnId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the user's set, creating the set if absent.
    pub async fn register(&self, user_id: &str, conn: ConnectionHandle) {
        let mut inner = self.inner.write().await;
        inner
            .entry(user_id.to_string())
            .or_default()
            .insert(conn.id, conn);
    }

    /// Remove a connection from the user's set. Idempotent: unknown users
    /// and already-removed connections are fine.
    pub async fn unregister(&self, user_id: &str, conn_id: ConnId) {
        let mut inner = self.inner.write().await;
        if let Some(conns) = inner.get_mut(user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                inner.remove(user_id);
            }
        }
    }

    /// Send a frame to every live connection for the user. Returns the
    /// number of connections the frame was queued for.
    ///
    /// A user with no registered connections is a valid state, not an
    /// error; the frame is simply dropped. Sends are attempted
    /// independently, so one dead connection never blocks the rest.
    pub async fn broadcast(&self, user_id: &str, msg: &ServerMessage) -> usize {
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize broadcast frame: {e}");
                return 0;
            }
        };

        let inner = self.inner.read().await;
        let Some(conns) = inner.get(user_id) else {
            debug!(user = %user_id, "no live connections, dropping frame");
            return 0;
        };

        let mut delivered = 0;
        for conn in conns.values() {
            if conn.send_raw(&json) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of distinct users with at least one live connection.
    pub async fn user_count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Total number of live connections across all users.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.values().map(HashMap::len).sum()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
