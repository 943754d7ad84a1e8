pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared connection handle, constructed once at startup and passed to every component.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open (or create) the medrem database at the given path with the schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets the daemon read while the CLI writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Wrap a connection for sharing across async tasks.
pub fn shared(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub medicine_count: i64,
    pub user_count: i64,
    pub active_work_count: i64,
    pub failed_work_count: i64,
    pub notification_count: i64,
}

/// Run `PRAGMA integrity_check` and collect row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity_details: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .context("integrity check failed to run")?;
    let count = |sql: &str| -> Result<i64> {
        conn.query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("count query failed: {sql}"))
    };

    Ok(HealthReport {
        integrity_ok: integrity_details == "ok",
        integrity_details,
        schema_version: migrations::get_schema_version(conn)?,
        medicine_count: count("SELECT COUNT(*) FROM medicines")?,
        user_count: count("SELECT COUNT(DISTINCT user_id) FROM medicines")?,
        active_work_count: count("SELECT COUNT(*) FROM scheduled_work WHERE state = 'enqueued'")?,
        failed_work_count: count("SELECT COUNT(*) FROM scheduled_work WHERE state = 'failed'")?,
        notification_count: count("SELECT COUNT(*) FROM notifications")?,
    })
}
