//! Connection registry.
//!
//! Owns every live connection and the two membership indices
//! (user → connections, conversation → connections). All three maps sit
//! behind one `RwLock`; each mutation takes the write lock once, so a reader
//! never sees the indices disagree and no connection is reachable through a
//! conversation index after its `remove` has returned.
//!
//! `broadcast` copies the recipient list under the read lock and enqueues
//! after releasing it. Enqueueing is `try_send` on a bounded queue, so a slow
//! or dead peer costs one dropped frame and never blocks the others.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use carelink_core::{ConnectionId, ConversationId, UserId};
use metrics::counter;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::connection::ClientConnection;
use crate::metrics::BROADCAST_DROPS_TOTAL;

/// Registry operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The handle is not (or no longer) admitted.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// A connection with this handle is already admitted.
    #[error("duplicate connection: {0}")]
    DuplicateConnection(ConnectionId),

    /// The configured connection limit is reached.
    #[error("connection limit of {0} reached")]
    AtCapacity(usize),
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections joined to the conversation at snapshot time.
    pub recipients: usize,
    /// Frames enqueued.
    pub delivered: usize,
    /// Frames dropped (queue full or closed).
    pub dropped: usize,
}

struct Entry {
    connection: Arc<ClientConnection>,
    rooms: HashSet<ConversationId>,
}

#[derive(Default)]
struct Indices {
    connections: HashMap<ConnectionId, Entry>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
    by_conversation: HashMap<ConversationId, HashSet<ConnectionId>>,
}

impl Indices {
    fn unlink_room(&mut self, conversation_id: &ConversationId, connection_id: &ConnectionId) {
        if let Some(members) = self.by_conversation.get_mut(conversation_id) {
            let _ = members.remove(connection_id);
            if members.is_empty() {
                let _ = self.by_conversation.remove(conversation_id);
            }
        }
    }
}

/// Tracks live connections and their room membership.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Indices>,
    capacity: Option<usize>,
}

impl ConnectionRegistry {
    /// Registry without a connection limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry admitting at most `capacity` connections. Zero means
    /// unlimited.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::default(),
            capacity: (capacity > 0).then_some(capacity),
        }
    }

    /// Register a new live connection under its owning user.
    pub fn admit(&self, connection: Arc<ClientConnection>) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        if inner.connections.contains_key(&connection.id) {
            return Err(RegistryError::DuplicateConnection(connection.id.clone()));
        }
        if let Some(limit) = self.capacity.filter(|&l| inner.connections.len() >= l) {
            return Err(RegistryError::AtCapacity(limit));
        }

        let id = connection.id.clone();
        let _ = inner
            .by_user
            .entry(connection.user_id().clone())
            .or_default()
            .insert(id.clone());
        let _ = inner.connections.insert(
            id.clone(),
            Entry {
                connection,
                rooms: HashSet::new(),
            },
        );
        debug!(connection_id = %id, total = inner.connections.len(), "connection admitted");
        Ok(())
    }

    /// [`Self::admit`], returning a guard that removes the connection when
    /// dropped.
    pub fn admit_guarded(
        self: &Arc<Self>,
        connection: Arc<ClientConnection>,
    ) -> Result<AdmissionGuard, RegistryError> {
        let id = connection.id.clone();
        self.admit(connection)?;
        Ok(AdmissionGuard {
            registry: Arc::clone(self),
            connection_id: id,
        })
    }

    /// Bind a connection to a conversation. Returns `false` if it was
    /// already joined.
    pub fn join(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
    ) -> Result<bool, RegistryError> {
        let mut inner = self.inner.write();
        let Some(entry) = inner.connections.get_mut(connection_id) else {
            return Err(RegistryError::UnknownConnection(connection_id.clone()));
        };
        if !entry.rooms.insert(conversation_id.clone()) {
            return Ok(false);
        }
        let _ = inner
            .by_conversation
            .entry(conversation_id.clone())
            .or_default()
            .insert(connection_id.clone());
        debug!(%connection_id, %conversation_id, "joined conversation");
        Ok(true)
    }

    /// Unbind a connection from a conversation. Returns `false` if it was
    /// not joined.
    pub fn leave(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
    ) -> Result<bool, RegistryError> {
        let mut inner = self.inner.write();
        let Some(entry) = inner.connections.get_mut(connection_id) else {
            return Err(RegistryError::UnknownConnection(connection_id.clone()));
        };
        if !entry.rooms.remove(conversation_id) {
            return Ok(false);
        }
        inner.unlink_room(conversation_id, connection_id);
        debug!(%connection_id, %conversation_id, "left conversation");
        Ok(true)
    }

    /// Tear a connection down, dropping every index entry for it.
    ///
    /// Idempotent: a second call returns `None`.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let mut inner = self.inner.write();
        let entry = inner.connections.remove(connection_id)?;
        for room in &entry.rooms {
            inner.unlink_room(room, connection_id);
        }
        let user = entry.connection.user_id();
        if let Some(conns) = inner.by_user.get_mut(user) {
            let _ = conns.remove(connection_id);
            if conns.is_empty() {
                let _ = inner.by_user.remove(user);
            }
        }
        debug!(
            %connection_id,
            rooms = entry.rooms.len(),
            total = inner.connections.len(),
            "connection removed"
        );
        Some(entry.connection)
    }

    /// Deliver `payload` to every connection joined to `conversation_id`.
    ///
    /// Per-connection failures are logged and counted, never returned.
    pub fn broadcast(&self, conversation_id: &ConversationId, payload: &Arc<String>) -> BroadcastReport {
        let recipients: Vec<Arc<ClientConnection>> = {
            let inner = self.inner.read();
            inner
                .by_conversation
                .get(conversation_id)
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|id| inner.connections.get(id))
                        .map(|e| Arc::clone(&e.connection))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..BroadcastReport::default()
        };
        for conn in &recipients {
            if conn.send(Arc::clone(payload)) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
                counter!(BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    connection_id = %conn.id,
                    %conversation_id,
                    dropped_total = conn.drop_count(),
                    "failed to enqueue broadcast"
                );
            }
        }
        debug!(
            %conversation_id,
            recipients = report.recipients,
            dropped = report.dropped,
            "broadcast"
        );
        report
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Look up a live connection.
    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.inner
            .read()
            .connections
            .get(connection_id)
            .map(|e| Arc::clone(&e.connection))
    }

    /// Live connections of a user.
    pub fn user_connections(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.inner
            .read()
            .by_user
            .get(user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Connections currently joined to a conversation.
    pub fn conversation_members(&self, conversation_id: &ConversationId) -> Vec<ConnectionId> {
        self.inner
            .read()
            .by_conversation
            .get(conversation_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Conversations a connection has joined.
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<ConversationId> {
        self.inner
            .read()
            .connections
            .get(connection_id)
            .map(|e| e.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a connection is joined to a conversation.
    pub fn is_joined(&self, connection_id: &ConnectionId, conversation_id: &ConversationId) -> bool {
        self.inner
            .read()
            .connections
            .get(connection_id)
            .is_some_and(|e| e.rooms.contains(conversation_id))
    }
}

/// Removes its connection from the registry when dropped.
///
/// Held by the transport for the lifetime of a session so teardown happens
/// exactly once on every exit path.
#[must_use = "dropping the guard removes the connection immediately"]
pub struct AdmissionGuard {
    registry: Arc<ConnectionRegistry>,
    connection_id: ConnectionId,
}

impl AdmissionGuard {
    /// The guarded connection's handle.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        let _ = self.registry.remove(&self.connection_id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
