//! The body of one due-check tick.
//!
//! A tick validates its input, reads the user's medicines, picks at most one
//! due time per untaken medicine and hands each match to the notification
//! sink. Every failure is folded into a [`TickOutcome`] at the boundary.

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Serialize;
use std::sync::Arc;

use super::clock::Clock;
use super::error::TickError;
use super::time_math::{seconds_since_midnight, within_window, DEFAULT_DUE_WINDOW_SECS};
use super::work::{TickOutcome, WorkInput, Worker};
use crate::medicine::types::Medicine;
use crate::medicine::ReminderStore;
use crate::notify::NotificationSink;

/// The first time of `medicine` inside the due window, or `None` when the
/// medicine is already taken or nothing matches.
pub fn find_due_time(
    medicine: &Medicine,
    now_seconds: u32,
    window_seconds: u32,
) -> Option<NaiveTime> {
    if medicine.is_taken {
        return None;
    }
    medicine
        .times
        .iter()
        .copied()
        .find(|t| within_window(seconds_since_midnight(*t), now_seconds, window_seconds))
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub outcome: TickOutcome,
    /// Medicines read from the store.
    pub evaluated: usize,
    /// `(medicine_id, matched_time)` for every successful delivery.
    pub delivered: Vec<(i64, NaiveTime)>,
    pub failed: usize,
}

impl TickReport {
    fn terminal(outcome: TickOutcome) -> Self {
        Self {
            outcome,
            evaluated: 0,
            delivered: Vec::new(),
            failed: 0,
        }
    }
}

#[derive(Clone)]
pub struct DueCheckRunner {
    store: Arc<dyn ReminderStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    due_window_secs: u32,
}

impl DueCheckRunner {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            due_window_secs: DEFAULT_DUE_WINDOW_SECS,
        }
    }

    pub fn with_due_window(mut self, seconds: u32) -> Self {
        self.due_window_secs = seconds;
        self
    }

    pub async fn run_tick(&self, input: &WorkInput) -> TickReport {
        match self.check(input).await {
            Ok(report) => report,
            Err(e) => {
                let outcome = e.outcome();
                match outcome {
                    TickOutcome::Failed => {
                        tracing::error!(user_id = %input.user_id, error = %e, "due check failed")
                    }
                    _ => {
                        tracing::warn!(user_id = %input.user_id, error = %e, "due check will retry")
                    }
                }
                TickReport::terminal(outcome)
            }
        }
    }

    async fn check(&self, input: &WorkInput) -> Result<TickReport, TickError> {
        if input.user_id.trim().is_empty() {
            return Err(TickError::InvalidInput("user_id is missing".into()));
        }

        let medicines = self.store.all_medicines(&input.user_id).await?;
        let now_seconds = seconds_since_midnight(self.clock.local_now().time());

        let mut report = TickReport::terminal(TickOutcome::Success);
        report.evaluated = medicines.len();

        for medicine in &medicines {
            let Some(matched) = find_due_time(medicine, now_seconds, self.due_window_secs) else {
                continue;
            };
            match self.sink.deliver(medicine, matched).await {
                Ok(()) => report.delivered.push((medicine.id, matched)),
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        medicine_id = medicine.id,
                        matched = %matched,
                        error = %e,
                        "reminder delivery failed"
                    );
                }
            }
        }

        tracing::debug!(
            user_id = %input.user_id,
            target_seconds = input.target_seconds,
            evaluated = report.evaluated,
            delivered = report.delivered.len(),
            failed = report.failed,
            "due check complete"
        );
        Ok(report)
    }
}

#[async_trait]
impl Worker for DueCheckRunner {
    async fn do_work(&self, input: &WorkInput) -> TickOutcome {
        self.run_tick(input).await.outcome
    }
}
