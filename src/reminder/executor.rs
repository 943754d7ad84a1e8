//! Runs due work from the queue.
//!
//! Each poll claims every enqueued row whose next run time has passed, runs
//! the worker for all of them concurrently under the tick budget, then writes
//! the outcomes back. A successful tick keeps the period anchored to the
//! scheduled run time, so runs land a whole interval apart. A tick that
//! panics or overruns is recorded as Retry. A poll finishes before the next one starts, so a unique
//! name never has two ticks in flight.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::error::ScheduleError;
use super::queue::SqliteWorkQueue;
use super::work::{TickOutcome, WorkInfo, Worker};
use crate::config::ScheduleConfig;

/// Exponential backoff applied to Retry outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    /// Delay before attempt number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max: Duration::from_secs(5 * 60 * 60),
        }
    }
}

impl From<&ScheduleConfig> for BackoffPolicy {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            base: Duration::from_secs(config.retry_backoff_secs),
            max: Duration::from_secs(config.max_backoff_secs),
        }
    }
}

/// Result of one tick as recorded by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRun {
    pub unique_name: String,
    pub outcome: TickOutcome,
    /// `None` for Failed; the work does not run again.
    pub next_run_at_ms: Option<i64>,
    /// `false` when the work was cancelled or re-registered mid-tick.
    pub recorded: bool,
}

pub struct WorkExecutor {
    queue: Arc<SqliteWorkQueue>,
    worker: Arc<dyn Worker>,
    backoff: BackoffPolicy,
    poll_interval: Duration,
    tick_budget: Duration,
}

impl WorkExecutor {
    pub fn new(queue: Arc<SqliteWorkQueue>, worker: Arc<dyn Worker>) -> Self {
        let defaults = ScheduleConfig::default();
        Self {
            queue,
            worker,
            backoff: BackoffPolicy::default(),
            poll_interval: defaults.poll_interval(),
            tick_budget: defaults.tick_budget(),
        }
    }

    pub fn from_config(
        queue: Arc<SqliteWorkQueue>,
        worker: Arc<dyn Worker>,
        config: &ScheduleConfig,
    ) -> Self {
        Self::new(queue, worker)
            .with_backoff(BackoffPolicy::from(config))
            .with_poll_interval(config.poll_interval())
            .with_tick_budget(config.tick_budget())
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_tick_budget(mut self, budget: Duration) -> Self {
        self.tick_budget = budget;
        self
    }

    /// Run every due work item once and record the outcomes.
    pub async fn poll_once(&self) -> Result<Vec<TickRun>, ScheduleError> {
        let due = self.queue.due().await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(count = due.len(), "running due work");

        let mut ticks = JoinSet::new();
        for work in due {
            let worker = Arc::clone(&self.worker);
            let budget = self.tick_budget;
            ticks.spawn(async move {
                let input = work.input.clone();
                let mut tick = tokio::spawn(async move { worker.do_work(&input).await });
                let outcome = match tokio::time::timeout(budget, &mut tick).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        tracing::error!(
                            unique_name = %work.unique_name,
                            error = %e,
                            "tick aborted"
                        );
                        TickOutcome::Retry
                    }
                    Err(_) => {
                        tick.abort();
                        tracing::warn!(
                            unique_name = %work.unique_name,
                            budget_secs = budget.as_secs(),
                            "tick exceeded its budget"
                        );
                        TickOutcome::Retry
                    }
                };
                (work, outcome)
            });
        }

        let mut runs = Vec::new();
        while let Some(joined) = ticks.join_next().await {
            match joined {
                Ok((work, outcome)) => runs.push(self.finish(work, outcome).await),
                Err(e) => tracing::error!(error = %e, "tick supervisor aborted"),
            }
        }
        runs.sort_by(|a, b| a.unique_name.cmp(&b.unique_name));
        Ok(runs)
    }

    async fn finish(&self, work: WorkInfo, outcome: TickOutcome) -> TickRun {
        let now_ms = self.queue.now_ms();
        let next_run_at_ms = match outcome {
            TickOutcome::Success => Some(next_period_end(
                work.next_run_at_ms,
                work.interval_ms,
                now_ms,
            )),
            TickOutcome::Retry => {
                let delay = self.backoff.delay(work.run_attempt_count.saturating_add(1));
                let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
                Some(now_ms.saturating_add(delay_ms))
            }
            TickOutcome::Failed => None,
        };

        let unique_name = work.unique_name.clone();
        let recorded = match self
            .queue
            .record(work, outcome, next_run_at_ms.unwrap_or(now_ms))
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                tracing::error!(
                    unique_name = %unique_name,
                    error = %e,
                    "failed to record tick outcome"
                );
                false
            }
        };

        if recorded {
            tracing::info!(
                unique_name = %unique_name,
                outcome = %outcome,
                next_run_at_ms = ?next_run_at_ms,
                "tick finished"
            );
        } else {
            tracing::debug!(
                unique_name = %unique_name,
                "work changed during tick; outcome dropped"
            );
        }

        TickRun {
            unique_name,
            outcome,
            next_run_at_ms,
            recorded,
        }
    }

    /// Poll until `shutdown` turns true. An in-flight poll is finished first.
    pub async fn run_until(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(poll_secs = self.poll_interval.as_secs(), "work executor started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.poll_once().await {
                tracing::warn!(error = %e, "poll failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("work executor stopped");
    }
}

/// First period boundary after `now_ms`, counted in whole intervals from
/// `anchor_ms`. Missed periods are skipped, not replayed.
fn next_period_end(anchor_ms: i64, interval_ms: i64, now_ms: i64) -> i64 {
    let interval_ms = interval_ms.max(1);
    let next = anchor_ms.saturating_add(interval_ms);
    if next > now_ms {
        return next;
    }
    let missed = now_ms.saturating_sub(next) / interval_ms + 1;
    next.saturating_add(missed.saturating_mul(interval_ms))
}

/// A receiver that turns true on Ctrl-C (and SIGTERM on unix).
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("received Ctrl-C"),
            _ = terminate => tracing::info!("received SIGTERM"),
        }

        let _ = tx.send(true);
    });

    rx
}
