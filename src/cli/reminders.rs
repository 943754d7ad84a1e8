//! CLI commands that inspect or drive the reminder schedule.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use std::sync::Arc;

use super::medicine::format_delay;
use super::App;
use medrem::config::MedremConfig;
use medrem::medicine::SqliteReminderStore;
use medrem::notify::{self, outbox};
use medrem::reminder::clock::{Clock, FixedClock};
use medrem::reminder::runner::DueCheckRunner;
use medrem::reminder::time_math::{
    format_12h, seconds_since_midnight, time_from_seconds, wall_clock_millis,
};
use medrem::reminder::work::WorkInput;

/// Run one due check for `user` with the configured sink.
pub async fn check(config: &MedremConfig, user: &str, at: Option<NaiveTime>) -> Result<()> {
    let app = App::open(config)?;
    let clock: Arc<dyn Clock> = match at {
        Some(time) => Arc::new(FixedClock::new(app.clock.local_now().date().and_time(time))),
        None => Arc::clone(&app.clock),
    };

    let store = Arc::new(SqliteReminderStore::new(Arc::clone(&app.db)));
    let sink =
        notify::create_sink(&app.config.notification, Arc::clone(&app.db), Arc::clone(&clock))?;
    let runner = DueCheckRunner::new(store, sink, Arc::clone(&clock))
        .with_due_window(app.config.schedule.due_window_secs);

    let now = clock.local_now().time();
    let report = runner
        .run_tick(&WorkInput {
            user_id: user.to_string(),
            target_seconds: seconds_since_midnight(now),
        })
        .await;

    println!("Due check for {user} at {}", format_12h(now));
    println!("  Outcome:     {}", report.outcome);
    println!("  Evaluated:   {}", report.evaluated);
    println!("  Delivered:   {}", report.delivered.len());
    for (id, time) in &report.delivered {
        println!("    #{id} at {}", format_12h(*time));
    }
    if report.failed > 0 {
        println!("  Failed:      {}", report.failed);
    }
    Ok(())
}

pub async fn schedules(config: &MedremConfig, user: &str, json: bool) -> Result<()> {
    let app = App::open(config)?;
    let work = app.service.schedules(user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&work)?);
        return Ok(());
    }
    if work.is_empty() {
        println!("No reminders scheduled for {user}.");
        return Ok(());
    }

    let now_ms = wall_clock_millis(app.clock.local_now());
    for info in &work {
        let target = time_from_seconds(info.input.target_seconds);
        let next = info
            .next_run_at()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "?".into());
        let wait = u64::try_from(info.next_run_at_ms - now_ms).unwrap_or(0) / 1000;
        println!(
            "{}  {}  next {} (in {})  runs {}  attempts {}  last {}",
            format_12h(target),
            info.state.as_str(),
            next,
            format_delay(wait),
            info.run_count,
            info.run_attempt_count,
            info.last_outcome.map(|o| o.as_str()).unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn resync(config: &MedremConfig, user: &str, all: bool) -> Result<()> {
    let app = App::open(config)?;
    let entries = if all {
        app.service.resync_all().await?
    } else {
        app.service.resync_user(user).await?
    };
    println!("Registered {} reminder(s).", entries.len());
    Ok(())
}

pub async fn notifications(config: &MedremConfig, user: &str) -> Result<()> {
    let app = App::open(config)?;
    let db = Arc::clone(&app.db);
    let user_id = user.to_string();
    let entries = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        outbox::list_notifications(&conn, &user_id).context("failed to read notifications")
    })
    .await
    .context("db task failed")??;

    if entries.is_empty() {
        println!("No notifications for {user}.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{}  {}  (x{}, last {})",
            entry.id, entry.body, entry.delivery_count, entry.last_delivered_at
        );
    }
    Ok(())
}
