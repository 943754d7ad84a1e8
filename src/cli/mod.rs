pub mod doctor;
pub mod medicine;
pub mod reminders;
pub mod serve;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use std::sync::Arc;

use medrem::config::MedremConfig;
use medrem::db::{self, SharedConnection};
use medrem::reminder::clock::{Clock, SystemClock};
use medrem::reminder::queue::SqliteWorkQueue;
use medrem::reminder::registry::{SchedulePolicy, ScheduleRegistry};
use medrem::service::MedicineService;

/// Components shared by every command that touches the database.
pub struct App {
    pub config: MedremConfig,
    pub db: SharedConnection,
    pub clock: Arc<dyn Clock>,
    pub queue: Arc<SqliteWorkQueue>,
    pub service: MedicineService,
}

impl App {
    pub fn open(config: &MedremConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        let db = db::shared(conn);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let queue = Arc::new(SqliteWorkQueue::new(Arc::clone(&db), Arc::clone(&clock)));
        let registry = ScheduleRegistry::new(
            queue.clone(),
            Arc::clone(&clock),
            SchedulePolicy::from(&config.schedule),
        );
        let service = MedicineService::new(Arc::clone(&db), registry, Arc::clone(&clock))
            .with_reschedule_remaining_on_delete(config.schedule.reschedule_remaining_on_delete)
            .with_due_window(config.schedule.due_window_secs);

        Ok(Self {
            config: config.clone(),
            db,
            clock,
            queue,
            service,
        })
    }
}

/// clap value parser for `HH:MM[:SS]`.
pub fn parse_time(value: &str) -> Result<NaiveTime, String> {
    medrem::reminder::time_math::parse_time_of_day(value).map_err(|e| e.to_string())
}

pub fn ask(query: &str) {
    println!("{}", medrem::assistant::respond(query));
}
