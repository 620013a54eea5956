//! Care directory repository: patients, caregivers, and ordered assignments.
//!
//! Assignments follow the list model. The legacy primary/secondary pair is
//! imported as positions 0 and 1 by [`DirectoryRepo::import_legacy_pair`].

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::{CaregiverRow, PatientRow};

/// Directory repository. Stateless; every method takes `&Connection`.
pub struct DirectoryRepo;

impl DirectoryRepo {
    /// Insert a patient.
    pub fn insert_patient(
        conn: &Connection,
        id: &str,
        user_id: Option<&str>,
        display_name: &str,
    ) -> Result<PatientRow> {
        let now = carelink_core::time::now_micros();
        let _ = conn.execute(
            "INSERT INTO patients (id, user_id, display_name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, display_name, now],
        )?;
        Ok(PatientRow {
            id: id.to_owned(),
            user_id: user_id.map(str::to_owned),
            display_name: display_name.to_owned(),
        })
    }

    /// Insert a caregiver.
    pub fn insert_caregiver(
        conn: &Connection,
        id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<CaregiverRow> {
        let now = carelink_core::time::now_micros();
        let _ = conn.execute(
            "INSERT INTO caregivers (id, user_id, display_name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, display_name, now],
        )?;
        Ok(CaregiverRow {
            id: id.to_owned(),
            user_id: user_id.to_owned(),
            display_name: display_name.to_owned(),
        })
    }

    /// Get a patient by ID.
    pub fn get_patient(conn: &Connection, id: &str) -> Result<Option<PatientRow>> {
        let row = conn
            .query_row(
                "SELECT id, user_id, display_name FROM patients WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PatientRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Patient IDs owned by a user account.
    pub fn patients_for_user(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT id FROM patients WHERE user_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Caregiver ID for a login account.
    pub fn caregiver_for_user(conn: &Connection, user_id: &str) -> Result<Option<String>> {
        let id = conn
            .query_row(
                "SELECT id FROM caregivers WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Assign a caregiver to a patient.
    ///
    /// `position: None` appends after the current last assignment. Reassigning
    /// an existing pair moves it to the new position.
    pub fn assign(
        conn: &Connection,
        patient_id: &str,
        caregiver_id: &str,
        position: Option<i64>,
    ) -> Result<i64> {
        let position = match position {
            Some(p) => p,
            None => conn.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM caregiver_assignments WHERE patient_id = ?1",
                params![patient_id],
                |row| row.get(0),
            )?,
        };
        let now = carelink_core::time::now_micros();
        let _ = conn.execute(
            "INSERT INTO caregiver_assignments (patient_id, caregiver_id, position, assigned_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (patient_id, caregiver_id) DO UPDATE SET position = excluded.position",
            params![patient_id, caregiver_id, position, now],
        )?;
        Ok(position)
    }

    /// Remove an assignment. Returns whether a row was deleted.
    pub fn unassign(conn: &Connection, patient_id: &str, caregiver_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM caregiver_assignments WHERE patient_id = ?1 AND caregiver_id = ?2",
            params![patient_id, caregiver_id],
        )?;
        Ok(changed > 0)
    }

    /// Replace a patient's assignments with a legacy primary/secondary pair.
    pub fn import_legacy_pair(
        conn: &Connection,
        patient_id: &str,
        primary: Option<&str>,
        secondary: Option<&str>,
    ) -> Result<()> {
        let _ = conn.execute(
            "DELETE FROM caregiver_assignments WHERE patient_id = ?1",
            params![patient_id],
        )?;
        for (position, caregiver) in [(0, primary), (1, secondary)] {
            if let Some(caregiver_id) = caregiver {
                let _ = Self::assign(conn, patient_id, caregiver_id, Some(position))?;
            }
        }
        Ok(())
    }

    /// Caregivers assigned to a patient, in assignment order.
    pub fn assigned_caregivers(conn: &Connection, patient_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT caregiver_id FROM caregiver_assignments
             WHERE patient_id = ?1
             ORDER BY position ASC, assigned_at ASC, caregiver_id ASC",
        )?;
        let ids = stmt
            .query_map(params![patient_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::repositories::test_support::setup;

    fn seed(conn: &Connection) {
        DirectoryRepo::insert_patient(conn, "p1", Some("u-p1"), "Pat").unwrap();
        for (id, user) in [("c1", "u-c1"), ("c2", "u-c2"), ("c3", "u-c3")] {
            DirectoryRepo::insert_caregiver(conn, id, user, id).unwrap();
        }
    }

    #[test]
    fn get_patient_roundtrip() {
        let conn = setup();
        seed(&conn);
        let p = DirectoryRepo::get_patient(&conn, "p1").unwrap().unwrap();
        assert_eq!(p.user_id.as_deref(), Some("u-p1"));
        assert!(DirectoryRepo::get_patient(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn caregiver_lookup_by_user() {
        let conn = setup();
        seed(&conn);
        assert_eq!(
            DirectoryRepo::caregiver_for_user(&conn, "u-c2").unwrap().as_deref(),
            Some("c2")
        );
        assert!(DirectoryRepo::caregiver_for_user(&conn, "u-p1").unwrap().is_none());
    }

    #[test]
    fn patients_for_user_lists_owned_records() {
        let conn = setup();
        seed(&conn);
        DirectoryRepo::insert_patient(&conn, "p2", Some("u-p1"), "Pat child").unwrap();
        DirectoryRepo::insert_patient(&conn, "p3", None, "No login").unwrap();
        assert_eq!(
            DirectoryRepo::patients_for_user(&conn, "u-p1").unwrap(),
            vec!["p1".to_string(), "p2".to_string()]
        );
    }

    #[test]
    fn append_assignments_keep_order() {
        let conn = setup();
        seed(&conn);
        assert_eq!(DirectoryRepo::assign(&conn, "p1", "c2", None).unwrap(), 0);
        assert_eq!(DirectoryRepo::assign(&conn, "p1", "c1", None).unwrap(), 1);
        assert_eq!(
            DirectoryRepo::assigned_caregivers(&conn, "p1").unwrap(),
            vec!["c2".to_string(), "c1".to_string()]
        );
    }

    #[test]
    fn explicit_position_reorders() {
        let conn = setup();
        seed(&conn);
        DirectoryRepo::assign(&conn, "p1", "c1", None).unwrap();
        DirectoryRepo::assign(&conn, "p1", "c2", None).unwrap();
        DirectoryRepo::assign(&conn, "p1", "c2", Some(-1)).unwrap();
        assert_eq!(
            DirectoryRepo::assigned_caregivers(&conn, "p1").unwrap()[0],
            "c2"
        );
    }

    #[test]
    fn unassign_removes() {
        let conn = setup();
        seed(&conn);
        DirectoryRepo::assign(&conn, "p1", "c1", None).unwrap();
        assert!(DirectoryRepo::unassign(&conn, "p1", "c1").unwrap());
        assert!(!DirectoryRepo::unassign(&conn, "p1", "c1").unwrap());
        assert!(DirectoryRepo::assigned_caregivers(&conn, "p1").unwrap().is_empty());
    }

    #[test]
    fn legacy_pair_maps_to_positions() {
        let conn = setup();
        seed(&conn);
        DirectoryRepo::assign(&conn, "p1", "c3", None).unwrap();
        DirectoryRepo::import_legacy_pair(&conn, "p1", Some("c2"), Some("c1")).unwrap();
        assert_eq!(
            DirectoryRepo::assigned_caregivers(&conn, "p1").unwrap(),
            vec!["c2".to_string(), "c1".to_string()]
        );
    }

    #[test]
    fn legacy_pair_without_primary() {
        let conn = setup();
        seed(&conn);
        DirectoryRepo::import_legacy_pair(&conn, "p1", None, Some("c1")).unwrap();
        assert_eq!(
            DirectoryRepo::assigned_caregivers(&conn, "p1").unwrap(),
            vec!["c1".to_string()]
        );
    }

    #[test]
    fn assignment_requires_known_caregiver() {
        let conn = setup();
        seed(&conn);
        assert!(DirectoryRepo::assign(&conn, "p1", "ghost", None).is_err());
    }
}
