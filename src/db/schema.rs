//! SQL DDL for the medrem tables.
//!
//! Defines the `medicines`, `scheduled_work`, and `schema_meta` tables. The
//! `notifications` outbox arrives with migration v2. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Medicine records, one row per medicine per user
CREATE TABLE IF NOT EXISTS medicines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL CHECK(length(user_id) > 0),
    name TEXT NOT NULL,
    dosage TEXT NOT NULL,
    times TEXT NOT NULL,
    notes TEXT,
    is_taken INTEGER NOT NULL DEFAULT 0 CHECK(is_taken IN (0, 1)),
    last_taken TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_medicines_user ON medicines(user_id);

-- Unique periodic work, the source of truth for what is scheduled
CREATE TABLE IF NOT EXISTS scheduled_work (
    unique_name TEXT PRIMARY KEY,
    id TEXT NOT NULL,
    tags TEXT NOT NULL,
    input TEXT NOT NULL,
    interval_ms INTEGER NOT NULL,
    flex_ms INTEGER NOT NULL,
    next_run_at_ms INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'enqueued' CHECK(state IN ('enqueued','failed')),
    run_attempt_count INTEGER NOT NULL DEFAULT 0,
    run_count INTEGER NOT NULL DEFAULT 0,
    generation INTEGER NOT NULL DEFAULT 1,
    last_outcome TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_work_due ON scheduled_work(state, next_run_at_ms);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"medicines".to_string()));
        assert!(tables.contains(&"scheduled_work".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
        assert!(!tables.contains(&"notifications".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn empty_user_id_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO medicines (user_id, name, dosage, times, created_at) \
             VALUES ('', 'a', 'b', '[]', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
