//! Desktop delivery through an external notifier program, e.g.
//! `notify-send --urgency=critical "Medicine Reminder" "Time to take ..."`.

use async_trait::async_trait;
use chrono::NaiveTime;
use tokio::process::Command;

use super::{NotificationSink, ReminderNotification};
use crate::medicine::types::Medicine;
use crate::reminder::error::DeliveryError;

#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// `args` go before the title and body.
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

#[async_trait]
impl NotificationSink for CommandSink {
    async fn deliver(
        &self,
        medicine: &Medicine,
        matched_time: NaiveTime,
    ) -> Result<(), DeliveryError> {
        let notification = ReminderNotification::for_medicine(medicine, matched_time);

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&notification.title)
            .arg(&notification.body)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeliveryError::Command(format!("failed to spawn {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::Command(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(id = %notification.id, program = %self.program, "notification sent");
        Ok(())
    }
}
