//! Conversation repository: one row per (caregiver, patient) pair.

use carelink_core::ConversationId;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::errors::Result;
use crate::sqlite::row_types::ConversationRow;

const COLUMNS: &str = "id, patient_id, caregiver_id, created_at";

/// Conversation repository. Stateless; every method takes `&Connection`.
pub struct ConversationRepo;

impl ConversationRepo {
    /// Return the conversation for the pair, inserting it if absent.
    ///
    /// The insert is `ON CONFLICT DO NOTHING` against the pair's unique
    /// index, so concurrent callers all read back the first writer's row.
    /// The boolean reports whether this call created it.
    pub fn find_or_create(
        conn: &Connection,
        caregiver_id: &str,
        patient_id: &str,
    ) -> Result<(ConversationRow, bool)> {
        let id = ConversationId::new();
        let now = carelink_core::time::now_micros();
        let inserted = conn.execute(
            "INSERT INTO conversations (id, patient_id, caregiver_id, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (caregiver_id, patient_id) DO NOTHING",
            params![id.as_str(), patient_id, caregiver_id, now],
        )?;
        let row = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM conversations WHERE caregiver_id = ?1 AND patient_id = ?2"
            ),
            params![caregiver_id, patient_id],
            Self::map_row,
        )?;
        Ok((row, inserted == 1))
    }

    /// Get a conversation by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"),
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All conversations of a caregiver, oldest first.
    pub fn list_for_caregiver(conn: &Connection, caregiver_id: &str) -> Result<Vec<ConversationRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM conversations WHERE caregiver_id = ?1 ORDER BY created_at, id"
        ))?;
        let rows = stmt
            .query_map(params![caregiver_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All conversations of any of the given patients, oldest first.
    pub fn list_for_patients(conn: &Connection, patient_ids: &[&str]) -> Result<Vec<ConversationRow>> {
        if patient_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; patient_ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM conversations
             WHERE patient_id IN ({placeholders})
             ORDER BY created_at, id"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(patient_ids.iter()), Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
        Ok(ConversationRow {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            caregiver_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
