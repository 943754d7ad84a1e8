//! Notification content and delivery.
//!
//! The due check decides *whether* to notify; a [`NotificationSink`] decides
//! *how*. Sinks are selected from configuration via [`create_sink`].

pub mod command;
pub mod outbox;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Serialize;
use std::sync::Arc;

use crate::config::NotificationConfig;
use crate::db::SharedConnection;
use crate::medicine::types::Medicine;
use crate::reminder::clock::Clock;
use crate::reminder::error::DeliveryError;
use crate::reminder::time_math::format_12h;

pub const NOTIFICATION_TITLE: &str = "Medicine Reminder";

/// Stable id per (medicine, time), so a repeated reminder replaces the
/// previous one instead of stacking.
pub fn notification_id(medicine_id: i64, time: NaiveTime) -> String {
    format!("medicine-{medicine_id}-{}", time.format("%H%M%S"))
}

/// Rendered notification content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderNotification {
    pub id: String,
    pub user_id: String,
    pub medicine_id: i64,
    pub title: String,
    pub body: String,
    pub matched_time: NaiveTime,
}

impl ReminderNotification {
    pub fn for_medicine(medicine: &Medicine, matched_time: NaiveTime) -> Self {
        Self {
            id: notification_id(medicine.id, matched_time),
            user_id: medicine.user_id.clone(),
            medicine_id: medicine.id,
            title: NOTIFICATION_TITLE.to_string(),
            body: format!(
                "Time to take {} ({}) at {}",
                medicine.name,
                medicine.dosage,
                format_12h(matched_time)
            ),
            matched_time,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        medicine: &Medicine,
        matched_time: NaiveTime,
    ) -> Result<(), DeliveryError>;
}

/// Writes each reminder to the log at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(
        &self,
        medicine: &Medicine,
        matched_time: NaiveTime,
    ) -> Result<(), DeliveryError> {
        let notification = ReminderNotification::for_medicine(medicine, matched_time);
        tracing::info!(
            id = %notification.id,
            user_id = %notification.user_id,
            title = %notification.title,
            "{}",
            notification.body
        );
        Ok(())
    }
}

/// Create the sink named by `config.sink`: `log`, `outbox`, or `command`.
pub fn create_sink(
    config: &NotificationConfig,
    db: SharedConnection,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn NotificationSink>> {
    match config.sink.as_str() {
        "log" => Ok(Arc::new(LogSink)),
        "outbox" => Ok(Arc::new(outbox::OutboxSink::new(db, clock))),
        "command" => Ok(Arc::new(command::CommandSink::new(
            config.command.clone(),
            config.args.clone(),
        ))),
        other => {
            anyhow::bail!("unknown notification sink: {other}. Supported: log, outbox, command")
        }
    }
}
