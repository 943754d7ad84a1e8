//! Vocabulary shared by the schedule registry, the work queue, and the
//! executor: periodic work requests, uniqueness policies, tick outcomes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ScheduleError;

/// Shortest recurrence the work queue accepts.
pub const MIN_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Shortest flex window the work queue accepts.
pub const MIN_FLEX: Duration = Duration::from_secs(5 * 60);

/// Input data carried by every reminder work item.
///
/// Fields default when absent so that a malformed row still reaches the
/// runner and fails there instead of vanishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkInput {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub target_seconds: u32,
}

/// What to do when work with the same unique name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    /// Leave the existing enqueued work untouched.
    Keep,
    /// Replace the request in place, keeping the work id.
    Update,
}

/// A recurring work request before it is enqueued.
#[derive(Debug, Clone)]
pub struct PeriodicWorkRequest {
    pub input: WorkInput,
    pub interval: Duration,
    pub flex: Duration,
    pub initial_delay: Duration,
    pub tags: Vec<String>,
}

impl PeriodicWorkRequest {
    /// Interval is raised to [`MIN_PERIODIC_INTERVAL`]; flex is clamped to
    /// `[MIN_FLEX, interval]`.
    pub fn new(input: WorkInput, interval: Duration, flex: Duration) -> Self {
        let interval = interval.max(MIN_PERIODIC_INTERVAL);
        let flex = flex.clamp(MIN_FLEX, interval);
        Self {
            input,
            interval,
            flex,
            initial_delay: Duration::ZERO,
            tags: Vec::new(),
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn add_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }
}

/// Terminal signal of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    Success,
    /// Transient failure; run again after backoff.
    Retry,
    /// Permanent failure; the work stops.
    Failed,
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TickOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "retry" => Ok(Self::Retry),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown tick outcome: {s}")),
        }
    }
}

/// What an enqueue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Inserted,
    Updated,
    Kept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    Enqueued,
    Failed,
}

impl WorkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for WorkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueued" => Ok(Self::Enqueued),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown work state: {s}")),
        }
    }
}

/// Snapshot of one persisted work item.
#[derive(Debug, Clone, Serialize)]
pub struct WorkInfo {
    pub id: String,
    pub unique_name: String,
    pub tags: Vec<String>,
    pub input: WorkInput,
    pub interval_ms: i64,
    pub flex_ms: i64,
    /// Local wall-clock milliseconds, see [`super::time_math::wall_clock_millis`].
    pub next_run_at_ms: i64,
    pub state: WorkState,
    pub run_attempt_count: u32,
    pub run_count: u32,
    pub generation: i64,
    pub last_outcome: Option<TickOutcome>,
}

impl WorkInfo {
    pub fn next_run_at(&self) -> Option<NaiveDateTime> {
        DateTime::from_timestamp_millis(self.next_run_at_ms).map(|dt| dt.naive_utc())
    }
}

/// The recurring-task facility the registry drives.
#[async_trait]
pub trait SchedulingFacility: Send + Sync {
    /// Enqueue periodic work under `unique_name`, resolving collisions with `policy`.
    async fn enqueue_unique_periodic(
        &self,
        unique_name: &str,
        policy: ExistingWorkPolicy,
        request: PeriodicWorkRequest,
    ) -> Result<EnqueueOutcome, ScheduleError>;

    /// Remove every work item carrying `tag`. Returns how many were removed.
    async fn cancel_all_by_tag(&self, tag: &str) -> Result<usize, ScheduleError>;

    /// List work items carrying `tag`, ordered by unique name.
    async fn work_by_tag(&self, tag: &str) -> Result<Vec<WorkInfo>, ScheduleError>;
}

/// The body the executor runs on every tick.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn do_work(&self, input: &WorkInput) -> TickOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> WorkInput {
        WorkInput {
            user_id: "alice".into(),
            target_seconds: 28_800,
        }
    }

    #[test]
    fn request_enforces_minimums() {
        let req =
            PeriodicWorkRequest::new(input(), Duration::from_secs(60), Duration::from_secs(1));
        assert_eq!(req.interval, MIN_PERIODIC_INTERVAL);
        assert_eq!(req.flex, MIN_FLEX);
    }

    #[test]
    fn flex_is_clamped_to_interval() {
        let req = PeriodicWorkRequest::new(
            input(),
            Duration::from_secs(20 * 60),
            Duration::from_secs(60 * 60),
        );
        assert_eq!(req.flex, Duration::from_secs(20 * 60));
    }

    #[test]
    fn tags_are_deduplicated() {
        let req = PeriodicWorkRequest::new(input(), MIN_PERIODIC_INTERVAL, MIN_FLEX)
            .add_tag("a")
            .add_tag("a")
            .add_tag("b");
        assert_eq!(req.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_input_fields_default() {
        let parsed: WorkInput = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.user_id, "");
        assert_eq!(parsed.target_seconds, 0);
    }
}
