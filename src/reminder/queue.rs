//! Persistent unique periodic work, stored in the `scheduled_work` table.
//!
//! The table is the source of truth for what is scheduled: the CLI enqueues
//! and cancels rows, the `serve` executor polls them. Every write that
//! replaces a request bumps `generation`, and outcome writes are guarded by
//! the generation that was claimed, so an in-flight tick can never resurrect
//! cancelled work or clobber a newer registration.

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;

use super::clock::Clock;
use super::error::ScheduleError;
use super::time_math::wall_clock_millis;
use super::work::{
    EnqueueOutcome, ExistingWorkPolicy, PeriodicWorkRequest, SchedulingFacility, TickOutcome,
    WorkInfo, WorkState,
};
use crate::db::SharedConnection;

const WORK_COLUMNS: &str = "unique_name, id, tags, input, interval_ms, flex_ms, next_run_at_ms, \
     state, run_attempt_count, run_count, generation, last_outcome";

/// Insert or replace unique periodic work. `now_ms` is local wall-clock millis.
pub fn enqueue_unique(
    conn: &mut Connection,
    unique_name: &str,
    policy: ExistingWorkPolicy,
    request: &PeriodicWorkRequest,
    now_ms: i64,
) -> Result<EnqueueOutcome, ScheduleError> {
    let tx = conn.transaction()?;

    let existing: Option<String> = tx
        .query_row(
            "SELECT state FROM scheduled_work WHERE unique_name = ?1",
            params![unique_name],
            |row| row.get(0),
        )
        .optional()?;

    let tags = serde_json::to_string(&request.tags)?;
    let input = serde_json::to_string(&request.input)?;
    let interval_ms = duration_ms(request.interval);
    let flex_ms = duration_ms(request.flex);
    let next_run_at_ms = now_ms.saturating_add(duration_ms(request.initial_delay));
    let updated_at = chrono::Utc::now().to_rfc3339();

    let outcome = match (existing.as_deref(), policy) {
        (Some("enqueued"), ExistingWorkPolicy::Keep) => EnqueueOutcome::Kept,
        (Some(_), _) => {
            tx.execute(
                "UPDATE scheduled_work SET tags = ?1, input = ?2, interval_ms = ?3, flex_ms = ?4, \
                 next_run_at_ms = ?5, state = 'enqueued', run_attempt_count = 0, \
                 generation = generation + 1, updated_at = ?6 WHERE unique_name = ?7",
                params![tags, input, interval_ms, flex_ms, next_run_at_ms, updated_at, unique_name],
            )?;
            EnqueueOutcome::Updated
        }
        (None, _) => {
            let id = uuid::Uuid::now_v7().to_string();
            tx.execute(
                "INSERT INTO scheduled_work (unique_name, id, tags, input, interval_ms, flex_ms, \
                 next_run_at_ms, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    unique_name,
                    id,
                    tags,
                    input,
                    interval_ms,
                    flex_ms,
                    next_run_at_ms,
                    updated_at
                ],
            )?;
            EnqueueOutcome::Inserted
        }
    };

    tx.commit()?;
    tracing::debug!(unique_name, outcome = ?outcome, next_run_at_ms, "work enqueued");
    Ok(outcome)
}

/// Delete every work row whose tag list contains `tag`.
pub fn cancel_by_tag(conn: &Connection, tag: &str) -> Result<usize, ScheduleError> {
    let removed = conn.execute(
        "DELETE FROM scheduled_work WHERE EXISTS \
         (SELECT 1 FROM json_each(scheduled_work.tags) WHERE json_each.value = ?1)",
        params![tag],
    )?;
    Ok(removed)
}

/// Work rows carrying `tag`, ordered by unique name.
pub fn work_by_tag(conn: &Connection, tag: &str) -> Result<Vec<WorkInfo>, ScheduleError> {
    let sql = format!(
        "SELECT {WORK_COLUMNS} FROM scheduled_work WHERE EXISTS \
         (SELECT 1 FROM json_each(scheduled_work.tags) WHERE json_each.value = ?1) \
         ORDER BY unique_name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![tag], row_to_work_info)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every work row, ordered by unique name.
pub fn all_work(conn: &Connection) -> Result<Vec<WorkInfo>, ScheduleError> {
    let sql = format!("SELECT {WORK_COLUMNS} FROM scheduled_work ORDER BY unique_name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_work_info)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Enqueued work whose next run time is at or before `now_ms`, earliest first.
pub fn due_work(conn: &Connection, now_ms: i64) -> Result<Vec<WorkInfo>, ScheduleError> {
    let sql = format!(
        "SELECT {WORK_COLUMNS} FROM scheduled_work \
         WHERE state = 'enqueued' AND next_run_at_ms <= ?1 ORDER BY next_run_at_ms, unique_name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![now_ms], row_to_work_info)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Persist the outcome of a tick for the generation that was claimed.
///
/// Returns `false` when the row was cancelled or replaced in the meantime;
/// nothing is written in that case.
pub fn record_outcome(
    conn: &Connection,
    claimed: &WorkInfo,
    outcome: TickOutcome,
    next_run_at_ms: i64,
) -> Result<bool, ScheduleError> {
    let updated_at = chrono::Utc::now().to_rfc3339();
    let changed = match outcome {
        TickOutcome::Success => conn.execute(
            "UPDATE scheduled_work SET next_run_at_ms = ?1, run_attempt_count = 0, \
             run_count = run_count + 1, last_outcome = 'success', updated_at = ?2 \
             WHERE unique_name = ?3 AND generation = ?4",
            params![next_run_at_ms, updated_at, claimed.unique_name, claimed.generation],
        )?,
        TickOutcome::Retry => conn.execute(
            "UPDATE scheduled_work SET next_run_at_ms = ?1, \
             run_attempt_count = run_attempt_count + 1, run_count = run_count + 1, \
             last_outcome = 'retry', updated_at = ?2 \
             WHERE unique_name = ?3 AND generation = ?4",
            params![next_run_at_ms, updated_at, claimed.unique_name, claimed.generation],
        )?,
        TickOutcome::Failed => conn.execute(
            "UPDATE scheduled_work SET state = 'failed', run_count = run_count + 1, \
             last_outcome = 'failed', updated_at = ?1 \
             WHERE unique_name = ?2 AND generation = ?3",
            params![updated_at, claimed.unique_name, claimed.generation],
        )?,
    };
    Ok(changed == 1)
}

fn duration_ms(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn row_to_work_info(row: &Row<'_>) -> rusqlite::Result<WorkInfo> {
    let tags: String = row.get(2)?;
    let input: String = row.get(3)?;
    let state: String = row.get(7)?;
    let last_outcome: Option<String> = row.get(11)?;

    Ok(WorkInfo {
        unique_name: row.get(0)?,
        id: row.get(1)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_error(2, e))?,
        input: serde_json::from_str(&input).map_err(|e| conversion_error(3, e))?,
        interval_ms: row.get(4)?,
        flex_ms: row.get(5)?,
        next_run_at_ms: row.get(6)?,
        state: state.parse::<WorkState>().map_err(|e| conversion_error(7, e))?,
        run_attempt_count: row.get(8)?,
        run_count: row.get(9)?,
        generation: row.get(10)?,
        last_outcome: last_outcome
            .map(|o| o.parse::<TickOutcome>())
            .transpose()
            .map_err(|e| conversion_error(11, e))?,
    })
}

/// [`SchedulingFacility`] over the shared SQLite connection.
#[derive(Clone)]
pub struct SqliteWorkQueue {
    db: SharedConnection,
    clock: Arc<dyn Clock>,
}

impl SqliteWorkQueue {
    pub fn new(db: SharedConnection, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, ScheduleError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ScheduleError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| ScheduleError::Unavailable(format!("db lock poisoned: {e}")))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| ScheduleError::Unavailable(format!("work queue task failed: {e}")))?
    }

    pub fn now_ms(&self) -> i64 {
        wall_clock_millis(self.clock.local_now())
    }

    pub async fn due(&self) -> Result<Vec<WorkInfo>, ScheduleError> {
        let now_ms = self.now_ms();
        self.with_conn(move |conn| due_work(conn, now_ms)).await
    }

    pub async fn all(&self) -> Result<Vec<WorkInfo>, ScheduleError> {
        self.with_conn(|conn| all_work(conn)).await
    }

    pub async fn record(
        &self,
        claimed: WorkInfo,
        outcome: TickOutcome,
        next_run_at_ms: i64,
    ) -> Result<bool, ScheduleError> {
        self.with_conn(move |conn| record_outcome(conn, &claimed, outcome, next_run_at_ms))
            .await
    }
}

#[async_trait]
impl SchedulingFacility for SqliteWorkQueue {
    async fn enqueue_unique_periodic(
        &self,
        unique_name: &str,
        policy: ExistingWorkPolicy,
        request: PeriodicWorkRequest,
    ) -> Result<EnqueueOutcome, ScheduleError> {
        let now_ms = self.now_ms();
        let unique_name = unique_name.to_string();
        self.with_conn(move |conn| enqueue_unique(conn, &unique_name, policy, &request, now_ms))
            .await
    }

    async fn cancel_all_by_tag(&self, tag: &str) -> Result<usize, ScheduleError> {
        let tag = tag.to_string();
        self.with_conn(move |conn| cancel_by_tag(conn, &tag)).await
    }

    async fn work_by_tag(&self, tag: &str) -> Result<Vec<WorkInfo>, ScheduleError> {
        let tag = tag.to_string();
        self.with_conn(move |conn| work_by_tag(conn, &tag)).await
    }
}
