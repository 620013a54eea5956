//! Async facade over the `SQLite` repositories.
//!
//! [`SqliteChatStore`] owns the connection pool and implements the chat
//! core's storage, directory, and assignment traits. Blocking `SQLite` work
//! runs on tokio's blocking pool; every write opens a `BEGIN IMMEDIATE`
//! transaction so concurrent writers queue on the database lock instead of
//! failing on a stale read snapshot.

use async_trait::async_trait;
use carelink_core::traits::{AssignmentRegistry, ConversationStore, MessageStore, PatientDirectory};
use carelink_core::{
    CaregiverId, ChatResult, Conversation, ConversationId, HistoryQuery, Message, NewMessage,
    PatientId, PatientRecord, UserId,
};
use rusqlite::TransactionBehavior;
use tracing::{debug, warn};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::conversation::ConversationRepo;
use crate::sqlite::repositories::directory::DirectoryRepo;
use crate::sqlite::repositories::message::{InsertMessage, MessageRepo};

/// Durable store backed by an `r2d2` `SQLite` pool.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: ConnectionPool,
}

impl SqliteChatStore {
    /// Wrap a pool. Run [`SqliteChatStore::migrate`] before first use.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    pub fn migrate(&self) -> Result<u32> {
        let conn = self.conn()?;
        run_migrations(&conn)
    }

    /// The raw pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Directory administration (synchronous; CLI and tests)
    // ─────────────────────────────────────────────────────────────────────

    /// Register a patient.
    pub fn add_patient(
        &self,
        id: &str,
        user_id: Option<&str>,
        display_name: &str,
    ) -> Result<PatientRecord> {
        let conn = self.conn()?;
        Ok(DirectoryRepo::insert_patient(&conn, id, user_id, display_name)?.into())
    }

    /// Register a caregiver login.
    pub fn add_caregiver(&self, id: &str, user_id: &str, display_name: &str) -> Result<()> {
        let conn = self.conn()?;
        let _ = DirectoryRepo::insert_caregiver(&conn, id, user_id, display_name)?;
        Ok(())
    }

    /// Append a caregiver to a patient's assignment list.
    pub fn assign_caregiver(&self, patient_id: &str, caregiver_id: &str) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let position = DirectoryRepo::assign(&tx, patient_id, caregiver_id, None)?;
        tx.commit()?;
        Ok(position)
    }

    /// Remove a caregiver from a patient's assignment list.
    pub fn unassign_caregiver(&self, patient_id: &str, caregiver_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        DirectoryRepo::unassign(&conn, patient_id, caregiver_id)
    }

    /// Replace a patient's assignments with a primary/secondary pair.
    pub fn import_legacy_assignment(
        &self,
        patient_id: &str,
        primary: Option<&str>,
        secondary: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        DirectoryRepo::import_legacy_pair(&tx, patient_id, primary, secondary)?;
        tx.commit()?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Blocking bridge
    // ─────────────────────────────────────────────────────────────────────

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> ChatResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledConnection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await;

        let result = joined.unwrap_or_else(|e| Err(StoreError::Join(e.to_string())));
        result.map_err(|e| {
            warn!(op, error = %e, "store operation failed");
            e.into()
        })
    }
}

#[async_trait]
impl PatientDirectory for SqliteChatStore {
    async fn find_patient(&self, patient_id: &PatientId) -> ChatResult<Option<PatientRecord>> {
        let id = patient_id.clone();
        self.blocking("find_patient", move |conn| {
            Ok(DirectoryRepo::get_patient(conn, &id)?.map(PatientRecord::from))
        })
        .await
    }

    async fn caregiver_for_user(&self, user_id: &UserId) -> ChatResult<Option<CaregiverId>> {
        let user = user_id.clone();
        self.blocking("caregiver_for_user", move |conn| {
            Ok(DirectoryRepo::caregiver_for_user(conn, &user)?.map(CaregiverId::from))
        })
        .await
    }

    async fn patients_for_user(&self, user_id: &UserId) -> ChatResult<Vec<PatientId>> {
        let user = user_id.clone();
        self.blocking("patients_for_user", move |conn| {
            Ok(DirectoryRepo::patients_for_user(conn, &user)?
                .into_iter()
                .map(PatientId::from)
                .collect())
        })
        .await
    }
}

#[async_trait]
impl AssignmentRegistry for SqliteChatStore {
    async fn assigned_caregivers(&self, patient_id: &PatientId) -> ChatResult<Vec<CaregiverId>> {
        let id = patient_id.clone();
        self.blocking("assigned_caregivers", move |conn| {
            Ok(DirectoryRepo::assigned_caregivers(conn, &id)?
                .into_iter()
                .map(CaregiverId::from)
                .collect())
        })
        .await
    }
}

#[async_trait]
impl ConversationStore for SqliteChatStore {
    async fn find_or_create(
        &self,
        caregiver_id: &CaregiverId,
        patient_id: &PatientId,
    ) -> ChatResult<Conversation> {
        let caregiver = caregiver_id.clone();
        let patient = patient_id.clone();
        self.blocking("find_or_create_conversation", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (row, created) = ConversationRepo::find_or_create(&tx, &caregiver, &patient)?;
            tx.commit()?;
            if created {
                debug!(conversation_id = %row.id, %caregiver, %patient, "conversation created");
            }
            Ok(row.into())
        })
        .await
    }

    async fn get(&self, conversation_id: &ConversationId) -> ChatResult<Option<Conversation>> {
        let id = conversation_id.clone();
        self.blocking("get_conversation", move |conn| {
            Ok(ConversationRepo::get_by_id(conn, &id)?.map(Conversation::from))
        })
        .await
    }

    async fn for_caregiver(&self, caregiver_id: &CaregiverId) -> ChatResult<Vec<Conversation>> {
        let id = caregiver_id.clone();
        self.blocking("conversations_for_caregiver", move |conn| {
            Ok(ConversationRepo::list_for_caregiver(conn, &id)?
                .into_iter()
                .map(Conversation::from)
                .collect())
        })
        .await
    }

    async fn for_patients(&self, patient_ids: &[PatientId]) -> ChatResult<Vec<Conversation>> {
        let ids: Vec<PatientId> = patient_ids.to_vec();
        self.blocking("conversations_for_patients", move |conn| {
            let refs: Vec<&str> = ids.iter().map(PatientId::as_str).collect();
            Ok(ConversationRepo::list_for_patients(conn, &refs)?
                .into_iter()
                .map(Conversation::from)
                .collect())
        })
        .await
    }
}

#[async_trait]
impl MessageStore for SqliteChatStore {
    async fn insert_message(&self, message: NewMessage) -> ChatResult<Message> {
        self.blocking("insert_message", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if ConversationRepo::get_by_id(&tx, &message.conversation_id)?.is_none() {
                return Err(StoreError::Missing {
                    entity: "conversation",
                    id: message.conversation_id.into_inner(),
                });
            }
            let row = MessageRepo::insert(
                &tx,
                &InsertMessage {
                    conversation_id: &message.conversation_id,
                    sender_user_id: message.sender_user_id.as_deref(),
                    text: &message.text,
                    attachment_ref: message.attachment_ref.as_ref().map(|r| r.as_str()),
                },
            )?;
            tx.commit()?;
            Ok(row.into())
        })
        .await
    }

    async fn history(
        &self,
        conversation_id: &ConversationId,
        query: &HistoryQuery,
    ) -> ChatResult<Vec<Message>> {
        let id = conversation_id.clone();
        let query = query.clone();
        self.blocking("history", move |conn| {
            Ok(
                MessageRepo::list_page(conn, &id, query.before.as_deref(), query.limit)?
                    .into_iter()
                    .map(Message::from)
                    .collect(),
            )
        })
        .await
    }

    async fn mark_read(&self, conversation_id: &ConversationId, viewer: &UserId) -> ChatResult<u64> {
        let id = conversation_id.clone();
        let viewer = viewer.clone();
        self.blocking("mark_read", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = MessageRepo::mark_read(&tx, &id, &viewer)?;
            tx.commit()?;
            Ok(changed)
        })
        .await
    }

    async fn count_unread(
        &self,
        conversation_id: &ConversationId,
        viewer: &UserId,
    ) -> ChatResult<u64> {
        let id = conversation_id.clone();
        let viewer = viewer.clone();
        self.blocking("count_unread", move |conn| {
            MessageRepo::count_unread(conn, &id, &viewer)
        })
        .await
    }

    async fn last_message(&self, conversation_id: &ConversationId) -> ChatResult<Option<Message>> {
        let id = conversation_id.clone();
        self.blocking("last_message", move |conn| {
            Ok(MessageRepo::last(conn, &id)?.map(Message::from))
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
