//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use carelink_core::time::now_micros;
use carelink_core::traits::{
    AssignmentRegistry, ConversationStore, IdentityService, MessageStore, PatientDirectory,
};
use carelink_core::{
    CaregiverId, ChatError, ChatResult, Conversation, ConversationId, HistoryQuery, Message,
    MessageId, NewMessage, PatientId, PatientRecord, Principal, UserId,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::connection::ClientConnection;
use crate::resolver::ConversationResolver;

#[derive(Default)]
struct Tables {
    patients: HashMap<PatientId, PatientRecord>,
    caregivers: HashMap<UserId, CaregiverId>,
    assignments: HashMap<PatientId, Vec<CaregiverId>>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

/// Directory, assignments, conversations, and messages in one map set.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn patient(&self, id: &str, user: Option<&str>) {
        let _ = self.tables.lock().patients.insert(
            PatientId::from(id),
            PatientRecord {
                id: PatientId::from(id),
                user_id: user.map(UserId::from),
                display_name: id.to_owned(),
            },
        );
    }

    pub fn caregiver(&self, id: &str, user: &str) {
        let _ = self
            .tables
            .lock()
            .caregivers
            .insert(UserId::from(user), CaregiverId::from(id));
    }

    pub fn assign(&self, patient: &str, caregiver: &str) {
        self.tables
            .lock()
            .assignments
            .entry(PatientId::from(patient))
            .or_default()
            .push(CaregiverId::from(caregiver));
    }

    pub fn unassign(&self, patient: &str, caregiver: &str) {
        if let Some(list) = self.tables.lock().assignments.get_mut(&PatientId::from(patient)) {
            list.retain(|c| c.as_str() != caregiver);
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn message_count(&self) -> usize {
        self.tables.lock().messages.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.tables.lock().conversations.len()
    }

    /// Patient `p1` (user `u-p1`) assigned to `c1` (`u-c1`), then `c2` (`u-c2`).
    /// Caregiver `c3` (`u-c3`) exists but is not assigned.
    pub fn seeded() -> Arc<Self> {
        let backend = Arc::new(Self::default());
        backend.patient("p1", Some("u-p1"));
        backend.caregiver("c1", "u-c1");
        backend.caregiver("c2", "u-c2");
        backend.caregiver("c3", "u-c3");
        backend.assign("p1", "c1");
        backend.assign("p1", "c2");
        backend
    }

    pub fn resolver(self: &Arc<Self>) -> ConversationResolver {
        ConversationResolver::new(self.clone(), self.clone(), self.clone())
    }
}

#[async_trait]
impl PatientDirectory for MemoryBackend {
    async fn find_patient(&self, patient_id: &PatientId) -> ChatResult<Option<PatientRecord>> {
        Ok(self.tables.lock().patients.get(patient_id).cloned())
    }

    async fn caregiver_for_user(&self, user_id: &UserId) -> ChatResult<Option<CaregiverId>> {
        Ok(self.tables.lock().caregivers.get(user_id).cloned())
    }

    async fn patients_for_user(&self, user_id: &UserId) -> ChatResult<Vec<PatientId>> {
        let tables = self.tables.lock();
        let mut ids: Vec<_> = tables
            .patients
            .values()
            .filter(|p| p.user_id.as_ref() == Some(user_id))
            .map(|p| p.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl AssignmentRegistry for MemoryBackend {
    async fn assigned_caregivers(&self, patient_id: &PatientId) -> ChatResult<Vec<CaregiverId>> {
        Ok(self
            .tables
            .lock()
            .assignments
            .get(patient_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ConversationStore for MemoryBackend {
    async fn find_or_create(
        &self,
        caregiver_id: &CaregiverId,
        patient_id: &PatientId,
    ) -> ChatResult<Conversation> {
        let mut tables = self.tables.lock();
        if let Some(existing) = tables
            .conversations
            .iter()
            .find(|c| &c.caregiver_id == caregiver_id && &c.patient_id == patient_id)
        {
            return Ok(existing.clone());
        }
        let conv = Conversation {
            id: ConversationId::new(),
            patient_id: patient_id.clone(),
            caregiver_id: caregiver_id.clone(),
            created_at: now_micros(),
        };
        tables.conversations.push(conv.clone());
        Ok(conv)
    }

    async fn get(&self, conversation_id: &ConversationId) -> ChatResult<Option<Conversation>> {
        Ok(self
            .tables
            .lock()
            .conversations
            .iter()
            .find(|c| &c.id == conversation_id)
            .cloned())
    }

    async fn for_caregiver(&self, caregiver_id: &CaregiverId) -> ChatResult<Vec<Conversation>> {
        Ok(self
            .tables
            .lock()
            .conversations
            .iter()
            .filter(|c| &c.caregiver_id == caregiver_id)
            .cloned()
            .collect())
    }

    async fn for_patients(&self, patient_ids: &[PatientId]) -> ChatResult<Vec<Conversation>> {
        Ok(self
            .tables
            .lock()
            .conversations
            .iter()
            .filter(|c| patient_ids.contains(&c.patient_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageStore for MemoryBackend {
    async fn insert_message(&self, message: NewMessage) -> ChatResult<Message> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ChatError::TransientStore("database is locked".into()));
        }
        let mut tables = self.tables.lock();
        let sequence = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == message.conversation_id)
            .map(|m| m.sequence)
            .max()
            .unwrap_or(0)
            + 1;
        let stamp = tables.messages.len() + 1;
        let stored = Message {
            id: MessageId::new(),
            conversation_id: message.conversation_id,
            sender_user_id: message.sender_user_id,
            text: message.text,
            attachment_ref: message.attachment_ref,
            is_read: false,
            created_at: format!("2026-10-15T09:00:00.{stamp:06}Z"),
            sequence,
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }

    async fn history(
        &self,
        conversation_id: &ConversationId,
        query: &HistoryQuery,
    ) -> ChatResult<Vec<Message>> {
        let tables = self.tables.lock();
        let mut page: Vec<_> = tables
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .filter(|m| query.before.as_ref().is_none_or(|b| m.created_at < *b))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        page.truncate(query.limit as usize);
        Ok(page)
    }

    async fn mark_read(&self, conversation_id: &ConversationId, viewer: &UserId) -> ChatResult<u64> {
        let mut tables = self.tables.lock();
        let mut changed = 0;
        for m in tables.messages.iter_mut().filter(|m| {
            &m.conversation_id == conversation_id
                && !m.is_read
                && m.sender_user_id.as_ref() != Some(viewer)
        }) {
            m.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn count_unread(
        &self,
        conversation_id: &ConversationId,
        viewer: &UserId,
    ) -> ChatResult<u64> {
        let tables = self.tables.lock();
        Ok(tables
            .messages
            .iter()
            .filter(|m| {
                &m.conversation_id == conversation_id
                    && !m.is_read
                    && m.sender_user_id.as_ref() != Some(viewer)
            })
            .count() as u64)
    }

    async fn last_message(&self, conversation_id: &ConversationId) -> ChatResult<Option<Message>> {
        Ok(self
            .tables
            .lock()
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .max_by_key(|m| m.sequence)
            .cloned())
    }
}

/// Accepts `token-<user>-<role>` credentials.
pub struct StaticIdentity;

#[async_trait]
impl IdentityService for StaticIdentity {
    async fn authenticate(&self, credential: &str) -> ChatResult<Principal> {
        let rest = credential
            .strip_prefix("token-")
            .ok_or_else(|| ChatError::Authentication("unknown token".into()))?;
        let (user, role) = rest
            .rsplit_once('-')
            .ok_or_else(|| ChatError::Authentication("malformed token".into()))?;
        Ok(Principal::new(user, carelink_core::Role::from_claim(role)))
    }
}

pub fn connection(
    principal: Principal,
    capacity: usize,
) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        Arc::new(ClientConnection::new(
            carelink_core::ConnectionId::new(),
            principal,
            tx,
        )),
        rx,
    )
}

/// Drain everything currently queued on a receiver.
pub fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        out.push(serde_json::from_str(&raw).unwrap());
    }
    out
}
