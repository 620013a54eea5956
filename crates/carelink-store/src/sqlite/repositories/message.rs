//! Message repository: append-only messages with per-conversation order.
//!
//! `sequence` is the persistence-order authority. `created_at` is assigned in
//! the same write and nudged forward by one microsecond whenever the clock
//! would not move past the previous message, so it is strictly increasing
//! within a conversation.

use carelink_core::MessageId;
use carelink_core::time::{format_micros, parse};
use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::MessageRow;

const COLUMNS: &str =
    "id, conversation_id, sequence, sender_user_id, text, attachment_ref, is_read, created_at";

// `?2` is the viewer; null senders never equal anyone.
const NOT_FROM_VIEWER: &str = "(sender_user_id IS NULL OR sender_user_id <> ?2)";

/// Input for [`MessageRepo::insert`].
#[derive(Clone, Copy, Debug)]
pub struct InsertMessage<'a> {
    /// Target conversation (must exist).
    pub conversation_id: &'a str,
    /// Author, `None` for system messages.
    pub sender_user_id: Option<&'a str>,
    /// Normalised text body.
    pub text: &'a str,
    /// Attachment reference.
    pub attachment_ref: Option<&'a str>,
}

/// Message repository. Stateless; every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Append a message. Call inside a write transaction so the sequence and
    /// timestamp reads are consistent with the insert.
    pub fn insert(conn: &Connection, input: &InsertMessage<'_>) -> Result<MessageRow> {
        let (sequence, previous): (i64, Option<String>) = conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1, MAX(created_at)
             FROM messages WHERE conversation_id = ?1",
            params![input.conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let created_at = next_timestamp(Utc::now(), previous.as_deref());
        let id = MessageId::new().into_inner();

        let _ = conn.execute(
            "INSERT INTO messages (id, conversation_id, sequence, sender_user_id, text,
                                   attachment_ref, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                id,
                input.conversation_id,
                sequence,
                input.sender_user_id,
                input.text,
                input.attachment_ref,
                created_at
            ],
        )?;

        Ok(MessageRow {
            id,
            conversation_id: input.conversation_id.to_owned(),
            sequence,
            sender_user_id: input.sender_user_id.map(str::to_owned),
            text: input.text.to_owned(),
            attachment_ref: input.attachment_ref.map(str::to_owned),
            is_read: false,
            created_at,
        })
    }

    /// Newest-first page, optionally strictly older than `before`
    /// (canonical timestamp).
    pub fn list_page(
        conn: &Connection,
        conversation_id: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM messages
             WHERE conversation_id = ?1 AND (?2 IS NULL OR created_at < ?2)
             ORDER BY sequence DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![conversation_id, before, limit], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent message.
    pub fn last(conn: &Connection, conversation_id: &str) -> Result<Option<MessageRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM messages WHERE conversation_id = ?1
                     ORDER BY sequence DESC LIMIT 1"
                ),
                params![conversation_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Flip every unread message not authored by `viewer`. Returns the count.
    pub fn mark_read(conn: &Connection, conversation_id: &str, viewer: &str) -> Result<u64> {
        let changed = conn.execute(
            &format!(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND is_read = 0 AND {NOT_FROM_VIEWER}"
            ),
            params![conversation_id, viewer],
        )?;
        Ok(changed as u64)
    }

    /// Unread messages not authored by `viewer`.
    pub fn count_unread(conn: &Connection, conversation_id: &str, viewer: &str) -> Result<u64> {
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1 AND is_read = 0 AND {NOT_FROM_VIEWER}"
            ),
            params![conversation_id, viewer],
            |row| row.get(0),
        )?;
        Ok(count.unsigned_abs())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
        Ok(MessageRow {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sequence: row.get(2)?,
            sender_user_id: row.get(3)?,
            text: row.get(4)?,
            attachment_ref: row.get(5)?,
            is_read: row.get::<_, i32>(6)? == 1,
            created_at: row.get(7)?,
        })
    }
}

/// Pick a timestamp strictly after `previous` (canonical form), preferring
/// the wall clock.
pub(crate) fn next_timestamp(now: DateTime<Utc>, previous: Option<&str>) -> String {
    let candidate = format_micros(now);
    match previous {
        Some(prev) if candidate.as_str() <= prev => parse(prev)
            .map(|p| format_micros(p + TimeDelta::microseconds(1)))
            .unwrap_or(candidate),
        _ => candidate,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
