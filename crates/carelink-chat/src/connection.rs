//! Live connection state.
//!
//! A [`ClientConnection`] is the registry's handle on one open socket: the
//! principal it authenticated as, the bounded outbound queue drained by the
//! transport's writer task, and heartbeat bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use carelink_core::{ConnectionId, Principal, UserId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One authenticated live connection.
pub struct ClientConnection {
    /// Opaque connection handle.
    pub id: ConnectionId,
    /// Principal cached at connect time; never re-verified per message.
    pub principal: Principal,
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around the writer task's queue.
    pub fn new(id: ConnectionId, principal: Principal, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            principal,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Owning user.
    pub fn user_id(&self) -> &UserId {
        &self.principal.user_id
    }

    /// Enqueue a frame without waiting.
    ///
    /// Returns `false` if the queue is full or closed, and increments the
    /// dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Enqueue a reply to the client's own request, waiting for room.
    ///
    /// Only broadcasts are best-effort; a reply is lost only when the writer
    /// side has gone away, in which case this returns `false`.
    pub async fn reply(&self, message: Arc<String>) -> bool {
        self.tx.send(message).await.is_ok()
    }

    /// Serialize a JSON value and enqueue it.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Frames dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Record a pong (or any inbound activity).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Take the alive flag, leaving it cleared until the next pong.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong or since connect.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user_id", &self.principal.user_id)
            .field("role", &self.principal.role)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(
            ConnectionId::from("conn_1"),
            Principal::caregiver("u-c1"),
            tx,
        );
        (conn, rx)
    }

    #[tokio::test]
    async fn send_enqueues() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn reply_waits_for_room_behind_broadcasts() {
        let (conn, mut rx) = make_connection(1);
        let conn = Arc::new(conn);
        assert!(conn.send(Arc::new("broadcast".into())));
        assert!(!conn.send(Arc::new("dropped".into())));

        let replier = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.reply(Arc::new("reply".into())).await })
        };
        assert_eq!(&*rx.recv().await.unwrap(), "broadcast");
        assert!(replier.await.unwrap());
        assert_eq!(&*rx.recv().await.unwrap(), "reply");
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn reply_fails_once_writer_is_gone() {
        let (conn, rx) = make_connection(1);
        drop(rx);
        assert!(!conn.reply(Arc::new("late".into())).await);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("first".into())));
        assert!(!conn.send(Arc::new("second".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn closed_queue_drops() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert!(conn.is_closed());
        assert!(!conn.send_json(&serde_json::json!({"x": 1})));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn heartbeat_flag_resets_on_check() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
        assert!(conn.last_pong_elapsed() <= conn.age());
    }

    #[test]
    fn user_id_comes_from_principal() {
        let (conn, _rx) = make_connection(1);
        assert_eq!(conn.user_id().as_str(), "u-c1");
    }
}
