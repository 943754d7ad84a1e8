#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use medrem::db::{self, SharedConnection};
use medrem::medicine::store;
use medrem::medicine::types::{Medicine, NewMedicine};
use medrem::notify::NotificationSink;
use medrem::reminder::clock::{Clock, FixedClock};
use medrem::reminder::error::DeliveryError;
use medrem::reminder::queue::SqliteWorkQueue;
use medrem::reminder::registry::{SchedulePolicy, ScheduleRegistry};
use medrem::service::MedicineService;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&mut conn).unwrap();
    conn
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Local time on a fixed test day.
pub fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 14).unwrap().and_time(t(h, m))
}

/// Insert a medicine directly through the store module.
pub fn insert_medicine(conn: &Connection, user: &str, name: &str, times: &[NaiveTime]) -> Medicine {
    store::insert_medicine(
        conn,
        &NewMedicine {
            user_id: user.into(),
            name: name.into(),
            dosage: "500mg".into(),
            times: times.to_vec(),
            notes: None,
        },
    )
    .unwrap()
}

pub fn new_medicine(user: &str, name: &str, times: &[NaiveTime]) -> NewMedicine {
    NewMedicine {
        user_id: user.into(),
        name: name.into(),
        dosage: "500mg".into(),
        times: times.to_vec(),
        notes: None,
    }
}

/// Everything wired over one in-memory database and a fixed clock.
pub struct Harness {
    pub db: SharedConnection,
    pub clock: Arc<FixedClock>,
    pub dyn_clock: Arc<dyn Clock>,
    pub queue: Arc<SqliteWorkQueue>,
    pub registry: ScheduleRegistry,
    pub service: MedicineService,
}

pub fn harness(now: NaiveDateTime) -> Harness {
    let db = db::shared(test_db());
    let clock = Arc::new(FixedClock::new(now));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let queue = Arc::new(SqliteWorkQueue::new(Arc::clone(&db), Arc::clone(&dyn_clock)));
    let registry =
        ScheduleRegistry::new(queue.clone(), Arc::clone(&dyn_clock), SchedulePolicy::default());
    let service = MedicineService::new(Arc::clone(&db), registry.clone(), Arc::clone(&dyn_clock));
    Harness {
        db,
        clock,
        dyn_clock,
        queue,
        registry,
        service,
    }
}

/// Sink that records `(medicine_id, matched_time)` for every delivery.
#[derive(Default)]
pub struct RecordingSink {
    pub calls: Mutex<Vec<(i64, NaiveTime)>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<(i64, NaiveTime)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(
        &self,
        medicine: &Medicine,
        matched_time: NaiveTime,
    ) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push((medicine.id, matched_time));
        Ok(())
    }
}
