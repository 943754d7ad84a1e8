//! Notification outbox: every delivery upserts a row keyed by the stable
//! notification id, so a reminder repeated on later ticks overwrites the
//! earlier one and bumps `delivery_count`.

use async_trait::async_trait;
use chrono::NaiveTime;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::Arc;

use super::{NotificationSink, ReminderNotification};
use crate::db::SharedConnection;
use crate::medicine::types::Medicine;
use crate::reminder::clock::Clock;
use crate::reminder::error::DeliveryError;

/// A row of the `notifications` table.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxEntry {
    pub id: String,
    pub user_id: String,
    pub medicine_id: i64,
    pub title: String,
    pub body: String,
    pub matched_time: String,
    pub delivery_count: u32,
    pub first_delivered_at: String,
    pub last_delivered_at: String,
}

/// Insert or overwrite the notification.
pub fn upsert_notification(
    conn: &Connection,
    notification: &ReminderNotification,
    delivered_at: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, user_id, medicine_id, title, body, matched_time, \
         delivery_count, first_delivered_at, last_delivered_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7) \
         ON CONFLICT(id) DO UPDATE SET title = excluded.title, body = excluded.body, \
         delivery_count = delivery_count + 1, last_delivered_at = excluded.last_delivered_at",
        params![
            notification.id,
            notification.user_id,
            notification.medicine_id,
            notification.title,
            notification.body,
            notification.matched_time.format("%H:%M:%S").to_string(),
            delivered_at,
        ],
    )?;
    Ok(())
}

/// Outbox rows for a user, most recently delivered first.
pub fn list_notifications(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<OutboxEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, medicine_id, title, body, matched_time, delivery_count, \
         first_delivered_at, last_delivered_at FROM notifications \
         WHERE user_id = ?1 ORDER BY last_delivered_at DESC, id",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(OutboxEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                medicine_id: row.get(2)?,
                title: row.get(3)?,
                body: row.get(4)?,
                matched_time: row.get(5)?,
                delivery_count: row.get(6)?,
                first_delivered_at: row.get(7)?,
                last_delivered_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Clone)]
pub struct OutboxSink {
    db: SharedConnection,
    clock: Arc<dyn Clock>,
}

impl OutboxSink {
    pub fn new(db: SharedConnection, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl NotificationSink for OutboxSink {
    async fn deliver(
        &self,
        medicine: &Medicine,
        matched_time: NaiveTime,
    ) -> Result<(), DeliveryError> {
        let notification = ReminderNotification::for_medicine(medicine, matched_time);
        let delivered_at = self.clock.utc_now().to_rfc3339();
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<(), DeliveryError> {
            let conn = db
                .lock()
                .map_err(|e| DeliveryError::Unavailable(format!("db lock poisoned: {e}")))?;
            upsert_notification(&conn, &notification, &delivered_at)?;
            tracing::debug!(id = %notification.id, "notification written to outbox");
            Ok(())
        })
        .await
        .map_err(|e| DeliveryError::Unavailable(format!("outbox task failed: {e}")))?
    }
}
