//! CLI `serve` command: run due reminders until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;

use super::App;
use medrem::config::MedremConfig;
use medrem::medicine::SqliteReminderStore;
use medrem::notify;
use medrem::reminder::executor::{shutdown_signal, WorkExecutor};
use medrem::reminder::runner::DueCheckRunner;

pub async fn serve(config: &MedremConfig, resync: bool) -> Result<()> {
    let app = App::open(config)?;

    if resync {
        let entries = app
            .service
            .resync_all()
            .await
            .context("failed to resync reminders at startup")?;
        tracing::info!(schedules = entries.len(), "reminders resynced");
    }

    let store = Arc::new(SqliteReminderStore::new(Arc::clone(&app.db)));
    let sink = notify::create_sink(
        &app.config.notification,
        Arc::clone(&app.db),
        Arc::clone(&app.clock),
    )?;
    let runner = DueCheckRunner::new(store, sink, Arc::clone(&app.clock))
        .with_due_window(app.config.schedule.due_window_secs);
    let executor =
        WorkExecutor::from_config(app.queue.clone(), Arc::new(runner), &app.config.schedule);

    tracing::info!(
        db = %app.config.resolved_db_path().display(),
        sink = %app.config.notification.sink,
        "medrem serving reminders"
    );
    executor.run_until(shutdown_signal()).await;
    Ok(())
}
