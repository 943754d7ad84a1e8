//! One recurring due check per (user, time of day).
//!
//! The registry derives deterministic work names and tags and hands requests
//! to a [`SchedulingFacility`]; it keeps no state of its own. Re-registering a
//! key replaces its work in place, so a key never has two live schedules.

use chrono::NaiveTime;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::clock::Clock;
use super::error::ScheduleError;
use super::time_math::{
    delay_resuming, delay_until, seconds_since_midnight, time_from_seconds, wall_clock_millis,
    SECONDS_PER_DAY,
};
use super::work::{
    EnqueueOutcome, ExistingWorkPolicy, PeriodicWorkRequest, SchedulingFacility, WorkInfo,
    WorkInput, MIN_FLEX, MIN_PERIODIC_INTERVAL,
};
use crate::config::ScheduleConfig;

pub const WORK_NAME_PREFIX: &str = "medicine_reminder";

/// Identity of a recurring schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScheduleKey {
    pub user_id: String,
    pub target_seconds: u32,
}

impl ScheduleKey {
    pub fn new(user_id: impl Into<String>, target_seconds: u32) -> Result<Self, ScheduleError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(ScheduleError::InvalidKey("user id must not be empty".into()));
        }
        if target_seconds >= SECONDS_PER_DAY {
            return Err(ScheduleError::InvalidKey(format!(
                "target {target_seconds}s is outside one day"
            )));
        }
        Ok(Self {
            user_id,
            target_seconds,
        })
    }

    /// `medicine_reminder_{user_id}_{target_seconds}`
    pub fn unique_name(&self) -> String {
        format!("{WORK_NAME_PREFIX}_{}_{}", self.user_id, self.target_seconds)
    }

    pub fn target_time(&self) -> NaiveTime {
        time_from_seconds(self.target_seconds)
    }
}

/// Tag shared by all of a user's schedules: `medicine_reminder_{user_id}`.
pub fn user_tag(user_id: &str) -> String {
    format!("{WORK_NAME_PREFIX}_{user_id}")
}

/// Recurrence settings applied to every registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub interval: Duration,
    pub flex: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            interval: MIN_PERIODIC_INTERVAL,
            flex: MIN_FLEX,
        }
    }
}

impl From<&ScheduleConfig> for SchedulePolicy {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            interval: config.interval(),
            flex: config.flex(),
        }
    }
}

/// What [`ScheduleRegistry::register`] submitted.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleEntry {
    pub key: ScheduleKey,
    pub unique_name: String,
    pub tag: String,
    pub initial_delay: Duration,
    pub interval: Duration,
    pub flex: Duration,
    pub enqueue: EnqueueOutcome,
}

#[derive(Clone)]
pub struct ScheduleRegistry {
    facility: Arc<dyn SchedulingFacility>,
    clock: Arc<dyn Clock>,
    policy: SchedulePolicy,
}

impl ScheduleRegistry {
    pub fn new(
        facility: Arc<dyn SchedulingFacility>,
        clock: Arc<dyn Clock>,
        policy: SchedulePolicy,
    ) -> Self {
        Self {
            facility,
            clock,
            policy,
        }
    }

    /// Register (or refresh) the recurring due check for `(user_id, target_seconds)`.
    ///
    /// The first run is delayed until the next occurrence of the target time.
    pub async fn register(
        &self,
        user_id: &str,
        target_seconds: u32,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let key = ScheduleKey::new(user_id, target_seconds)?;
        let now_ms = wall_clock_millis(self.clock.local_now());
        let initial_delay = Duration::from_millis(delay_until(key.target_seconds, now_ms));
        self.submit(key, initial_delay).await
    }

    /// Like [`Self::register`], but a key whose due window of `window_seconds`
    /// is still open runs right away instead of tomorrow.
    pub async fn register_resuming(
        &self,
        user_id: &str,
        target_seconds: u32,
        window_seconds: u32,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let key = ScheduleKey::new(user_id, target_seconds)?;
        let now_ms = wall_clock_millis(self.clock.local_now());
        let initial_delay =
            Duration::from_millis(delay_resuming(key.target_seconds, now_ms, window_seconds));
        self.submit(key, initial_delay).await
    }

    async fn submit(
        &self,
        key: ScheduleKey,
        initial_delay: Duration,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let unique_name = key.unique_name();
        let tag = user_tag(&key.user_id);

        let request = PeriodicWorkRequest::new(
            WorkInput {
                user_id: key.user_id.clone(),
                target_seconds: key.target_seconds,
            },
            self.policy.interval,
            self.policy.flex,
        )
        .with_initial_delay(initial_delay)
        .add_tag(tag.clone());
        let (interval, flex) = (request.interval, request.flex);

        let enqueue = self
            .facility
            .enqueue_unique_periodic(&unique_name, ExistingWorkPolicy::Update, request)
            .await?;

        tracing::info!(
            unique_name = %unique_name,
            delay_secs = initial_delay.as_secs(),
            outcome = ?enqueue,
            "reminder registered"
        );

        Ok(ScheduleEntry {
            key,
            unique_name,
            tag,
            initial_delay,
            interval,
            flex,
            enqueue,
        })
    }

    pub async fn register_time(
        &self,
        user_id: &str,
        time: NaiveTime,
    ) -> Result<ScheduleEntry, ScheduleError> {
        self.register(user_id, seconds_since_midnight(time)).await
    }

    /// Cancel every schedule of `user_id`. A no-op when there are none.
    ///
    /// A tick already running is not interrupted and may still deliver.
    pub async fn cancel(&self, user_id: &str) -> Result<usize, ScheduleError> {
        let removed = self.facility.cancel_all_by_tag(&user_tag(user_id)).await?;
        tracing::info!(user_id, removed, "reminders cancelled");
        Ok(removed)
    }

    /// The user's schedules as the facility sees them.
    pub async fn schedules(&self, user_id: &str) -> Result<Vec<WorkInfo>, ScheduleError> {
        self.facility.work_by_tag(&user_tag(user_id)).await
    }
}
