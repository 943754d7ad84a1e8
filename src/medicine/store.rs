//! SQL access for the `medicines` table.
//!
//! Reads return [`StoreError`] so the due check can tell a transient failure
//! from bad input; writes validate first and use `anyhow`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{times_from_json, times_to_json, Medicine, NewMedicine};
use crate::reminder::error::StoreError;

const MEDICINE_COLUMNS: &str =
    "id, user_id, name, dosage, times, notes, is_taken, last_taken, created_at";

/// Raw row before the JSON and timestamp columns are parsed.
struct MedicineRow {
    id: i64,
    user_id: String,
    name: String,
    dosage: String,
    times: String,
    notes: Option<String>,
    is_taken: bool,
    last_taken: Option<String>,
    created_at: String,
}

impl MedicineRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            dosage: row.get(3)?,
            times: row.get(4)?,
            notes: row.get(5)?,
            is_taken: row.get(6)?,
            last_taken: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_medicine(self) -> Result<Medicine, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id,
            reason,
        };
        let times = times_from_json(&self.times).map_err(corrupt)?;
        let last_taken = self
            .last_taken
            .as_deref()
            .map(DateTime::parse_from_rfc3339)
            .transpose()
            .map_err(|e| corrupt(format!("bad last_taken: {e}")))?
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Medicine {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            dosage: self.dosage,
            times,
            notes: self.notes,
            is_taken: self.is_taken,
            last_taken,
            created_at: self.created_at,
        })
    }
}

fn query_medicines(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Medicine>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, MedicineRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(MedicineRow::into_medicine).collect()
}

/// Insert a validated medicine and return it with its assigned id.
pub fn insert_medicine(conn: &Connection, new: &NewMedicine) -> Result<Medicine> {
    new.validate()?;

    let created_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO medicines (user_id, name, dosage, times, notes, is_taken, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            new.user_id.trim(),
            new.name.trim(),
            new.dosage.trim(),
            times_to_json(&new.times),
            new.notes,
            created_at,
        ],
    )
    .context("failed to insert medicine")?;

    let id = conn.last_insert_rowid();
    get_medicine(conn, id)?.context("inserted medicine vanished")
}

pub fn get_medicine(conn: &Connection, id: i64) -> Result<Option<Medicine>, StoreError> {
    let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicines WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], MedicineRow::from_row)
        .optional()?;
    row.map(MedicineRow::into_medicine).transpose()
}

/// All medicines of a user, in insertion order.
pub fn list_medicines(conn: &Connection, user_id: &str) -> Result<Vec<Medicine>, StoreError> {
    let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicines WHERE user_id = ?1 ORDER BY id");
    query_medicines(conn, &sql, params![user_id])
}

/// Medicines of a user not yet marked as taken.
pub fn pending_medicines(conn: &Connection, user_id: &str) -> Result<Vec<Medicine>, StoreError> {
    let sql = format!(
        "SELECT {MEDICINE_COLUMNS} FROM medicines WHERE user_id = ?1 AND is_taken = 0 ORDER BY id"
    );
    query_medicines(conn, &sql, params![user_id])
}

/// Medicines of a user scheduled at exactly `time`.
pub fn medicines_at_time(
    conn: &Connection,
    user_id: &str,
    time: NaiveTime,
) -> Result<Vec<Medicine>, StoreError> {
    let sql = format!(
        "SELECT {MEDICINE_COLUMNS} FROM medicines WHERE user_id = ?1 \
         AND ?2 IN (SELECT value FROM json_each(medicines.times)) ORDER BY id"
    );
    query_medicines(conn, &sql, params![user_id, time.format("%H:%M:%S").to_string()])
}

/// Distinct users that own at least one medicine.
pub fn list_users(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM medicines ORDER BY user_id")?;
    let users = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(users)
}

/// Mark a medicine taken (stamping `last_taken`) or missed (clearing it).
/// Returns the updated record, or `None` if the id does not exist.
pub fn set_taken(
    conn: &Connection,
    id: i64,
    taken: bool,
    at: DateTime<Utc>,
) -> Result<Option<Medicine>> {
    let last_taken = taken.then(|| at.to_rfc3339());
    let changed = conn
        .execute(
            "UPDATE medicines SET is_taken = ?1, last_taken = ?2 WHERE id = ?3",
            params![taken, last_taken, id],
        )
        .context("failed to update medicine status")?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(get_medicine(conn, id)?)
}

/// Replace the editable fields of an existing medicine.
pub fn update_medicine(conn: &Connection, medicine: &Medicine) -> Result<bool> {
    NewMedicine {
        user_id: medicine.user_id.clone(),
        name: medicine.name.clone(),
        dosage: medicine.dosage.clone(),
        times: medicine.times.clone(),
        notes: medicine.notes.clone(),
    }
    .validate()?;

    let changed = conn
        .execute(
            "UPDATE medicines SET name = ?1, dosage = ?2, times = ?3, notes = ?4, \
             is_taken = ?5, last_taken = ?6 WHERE id = ?7 AND user_id = ?8",
            params![
                medicine.name.trim(),
                medicine.dosage.trim(),
                times_to_json(&medicine.times),
                medicine.notes,
                medicine.is_taken,
                medicine.last_taken.map(|t| t.to_rfc3339()),
                medicine.id,
                medicine.user_id,
            ],
        )
        .context("failed to update medicine")?;
    Ok(changed == 1)
}

/// Delete a medicine, returning the removed record.
pub fn delete_medicine(conn: &Connection, id: i64) -> Result<Option<Medicine>> {
    let Some(existing) = get_medicine(conn, id)? else {
        return Ok(None);
    };
    conn.execute("DELETE FROM medicines WHERE id = ?1", params![id])
        .context("failed to delete medicine")?;
    Ok(Some(existing))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn new_medicine(user: &str, name: &str, times: Vec<NaiveTime>) -> NewMedicine {
        NewMedicine {
            user_id: user.into(),
            name: name.into(),
            dosage: "500mg".into(),
            times,
            notes: None,
        }
    }

    #[test]
    fn insert_assigns_id_and_round_trips() {
        let conn = test_db();
        let aspirin = new_medicine("alice", "Aspirin", vec![t(8, 0), t(20, 0)]);
        let med = insert_medicine(&conn, &aspirin).unwrap();
        assert!(med.id > 0);
        assert!(!med.is_taken);
        assert!(med.last_taken.is_none());

        let loaded = get_medicine(&conn, med.id).unwrap().unwrap();
        assert_eq!(loaded, med);
    }

    #[test]
    fn insert_rejects_invalid() {
        let conn = test_db();
        assert!(insert_medicine(&conn, &new_medicine("alice", "", vec![t(8, 0)])).is_err());
        assert!(insert_medicine(&conn, &new_medicine("alice", "Aspirin", vec![])).is_err());
    }

    #[test]
    fn list_is_scoped_by_user_in_insertion_order() {
        let conn = test_db();
        insert_medicine(&conn, &new_medicine("alice", "B", vec![t(9, 0)])).unwrap();
        insert_medicine(&conn, &new_medicine("bob", "X", vec![t(9, 0)])).unwrap();
        insert_medicine(&conn, &new_medicine("alice", "A", vec![t(7, 0)])).unwrap();

        let names: Vec<String> = list_medicines(&conn, "alice")
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(list_users(&conn).unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn set_taken_stamps_and_clears_last_taken() {
        let conn = test_db();
        let med = insert_medicine(&conn, &new_medicine("alice", "Aspirin", vec![t(8, 0)])).unwrap();
        let at = Utc::now();

        let taken = set_taken(&conn, med.id, true, at).unwrap().unwrap();
        assert!(taken.is_taken);
        assert!(taken.last_taken.is_some());
        assert!(pending_medicines(&conn, "alice").unwrap().is_empty());

        let missed = set_taken(&conn, med.id, false, at).unwrap().unwrap();
        assert!(!missed.is_taken);
        assert!(missed.last_taken.is_none());
        assert_eq!(pending_medicines(&conn, "alice").unwrap().len(), 1);

        assert!(set_taken(&conn, 9999, true, at).unwrap().is_none());
    }

    #[test]
    fn medicines_at_time_matches_exact_time() {
        let conn = test_db();
        insert_medicine(&conn, &new_medicine("alice", "Morning", vec![t(8, 0)])).unwrap();
        insert_medicine(&conn, &new_medicine("alice", "Both", vec![t(20, 0), t(8, 0)])).unwrap();
        insert_medicine(&conn, &new_medicine("alice", "Evening", vec![t(20, 0)])).unwrap();

        let names: Vec<String> = medicines_at_time(&conn, "alice", t(8, 0))
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Morning", "Both"]);
        assert!(medicines_at_time(&conn, "alice", t(8, 1)).unwrap().is_empty());
    }

    #[test]
    fn update_and_delete() {
        let conn = test_db();
        let aspirin = new_medicine("alice", "Aspirin", vec![t(8, 0)]);
        let mut med = insert_medicine(&conn, &aspirin).unwrap();
        med.dosage = "250mg".into();
        med.times.push(t(14, 0));
        assert!(update_medicine(&conn, &med).unwrap());
        assert_eq!(get_medicine(&conn, med.id).unwrap().unwrap().times.len(), 2);

        let removed = delete_medicine(&conn, med.id).unwrap().unwrap();
        assert_eq!(removed.dosage, "250mg");
        assert!(get_medicine(&conn, med.id).unwrap().is_none());
        assert!(delete_medicine(&conn, med.id).unwrap().is_none());
    }

    #[test]
    fn corrupt_times_surface_as_store_error() {
        let conn = test_db();
        conn.execute(
            "INSERT INTO medicines (user_id, name, dosage, times, created_at) \
             VALUES ('alice', 'x', 'y', 'oops', 'now')",
            [],
        )
        .unwrap();
        let err = list_medicines(&conn, "alice").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
