//! Medicine mutations that keep the reminder schedules in step.
//!
//! Every write goes to the store first and then to the [`ScheduleRegistry`].
//! If scheduling fails after a successful write the record stays, and
//! `resync_user` brings the schedules back in line.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::db::SharedConnection;
use crate::medicine::store;
use crate::medicine::types::{Medicine, MedicineEdit, NewMedicine};
use crate::reminder::clock::Clock;
use crate::reminder::registry::{ScheduleEntry, ScheduleRegistry};
use crate::reminder::time_math::{seconds_since_midnight, DEFAULT_DUE_WINDOW_SECS};
use crate::reminder::work::WorkInfo;

/// A stored medicine and the schedules registered for it.
#[derive(Debug, Clone, Serialize)]
pub struct Scheduled {
    pub medicine: Medicine,
    pub schedules: Vec<ScheduleEntry>,
}

/// Result of deleting a medicine.
#[derive(Debug, Clone, Serialize)]
pub struct Deleted {
    pub medicine: Medicine,
    /// Schedules removed for the owning user.
    pub cancelled: usize,
    /// Schedules registered again for the user's remaining medicines.
    pub rescheduled: Vec<ScheduleEntry>,
}

/// Result of editing a medicine.
#[derive(Debug, Clone, Serialize)]
pub struct Edited {
    pub medicine: Medicine,
    /// Schedules removed for the owning user; 0 when the times did not change.
    pub cancelled: usize,
    pub rescheduled: Vec<ScheduleEntry>,
}

#[derive(Clone)]
pub struct MedicineService {
    db: SharedConnection,
    registry: ScheduleRegistry,
    clock: Arc<dyn Clock>,
    reschedule_remaining_on_delete: bool,
    due_window_secs: u32,
}

impl MedicineService {
    pub fn new(db: SharedConnection, registry: ScheduleRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            registry,
            clock,
            reschedule_remaining_on_delete: true,
            due_window_secs: DEFAULT_DUE_WINDOW_SECS,
        }
    }

    /// Due window used when schedules are restored after a delete or edit.
    pub fn with_due_window(mut self, seconds: u32) -> Self {
        self.due_window_secs = seconds;
        self
    }

    /// When false, deleting a medicine leaves the user with no schedules
    /// until the next resync.
    pub fn with_reschedule_remaining_on_delete(mut self, enabled: bool) -> Self {
        self.reschedule_remaining_on_delete = enabled;
        self
    }

    pub fn registry(&self) -> &ScheduleRegistry {
        &self.registry
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&*conn)
        })
        .await
        .context("db task failed")?
    }

    /// Store a medicine and register one schedule per time of day.
    pub async fn add_medicine(&self, new: NewMedicine) -> Result<Scheduled> {
        // 1. Validate and insert
        new.validate()?;
        let medicine = self
            .with_db(move |conn| store::insert_medicine(conn, &new))
            .await?;

        tracing::info!(
            id = medicine.id,
            user_id = %medicine.user_id,
            times = medicine.times.len(),
            "medicine added"
        );

        // 2. One schedule per distinct time
        let schedules = self
            .register_times(&medicine.user_id, distinct_seconds(std::slice::from_ref(&medicine)))
            .await
            .with_context(|| {
                format!("medicine {} saved but scheduling failed; run `medrem resync`", medicine.id)
            })?;

        Ok(Scheduled {
            medicine,
            schedules,
        })
    }

    /// Mark a medicine taken or missed. `None` if the id does not exist.
    pub async fn set_status(&self, id: i64, taken: bool) -> Result<Option<Medicine>> {
        let at = self.clock.utc_now();
        let updated = self
            .with_db(move |conn| store::set_taken(conn, id, taken, at))
            .await?;
        if let Some(medicine) = &updated {
            tracing::info!(id, user_id = %medicine.user_id, taken, "medicine status changed");
        }
        Ok(updated)
    }

    /// Change the fields of a medicine. `None` if the id does not exist.
    ///
    /// When the times change, the owner's schedules are cancelled and
    /// restored from the stored medicines, so no stale time keeps firing.
    pub async fn update_medicine(&self, id: i64, edit: MedicineEdit) -> Result<Option<Edited>> {
        let updated = self
            .with_db(move |conn| {
                let Some(mut medicine) = store::get_medicine(conn, id)? else {
                    return Ok(None);
                };
                let times_changed = edit.apply(&mut medicine);
                if !store::update_medicine(conn, &medicine)? {
                    return Ok(None);
                }
                Ok(Some((medicine, times_changed)))
            })
            .await?;
        let Some((medicine, times_changed)) = updated else {
            return Ok(None);
        };

        let (cancelled, rescheduled) = if times_changed {
            let cancelled = self
                .registry
                .cancel(&medicine.user_id)
                .await
                .context("failed to cancel reminders")?;
            (cancelled, self.restore_user(&medicine.user_id).await?)
        } else {
            (0, Vec::new())
        };

        tracing::info!(
            id,
            user_id = %medicine.user_id,
            times_changed,
            rescheduled = rescheduled.len(),
            "medicine updated"
        );

        Ok(Some(Edited {
            medicine,
            cancelled,
            rescheduled,
        }))
    }

    /// Delete a medicine and cancel its owner's schedules.
    ///
    /// Cancellation is per user, so the schedules of the user's other
    /// medicines go with it; they are registered again unless that was
    /// disabled. A key whose due window is still open keeps today's
    /// reminders.
    pub async fn delete_medicine(&self, id: i64) -> Result<Option<Deleted>> {
        let Some(medicine) = self
            .with_db(move |conn| store::delete_medicine(conn, id))
            .await?
        else {
            return Ok(None);
        };

        let cancelled = self
            .registry
            .cancel(&medicine.user_id)
            .await
            .context("failed to cancel reminders")?;

        let rescheduled = if self.reschedule_remaining_on_delete {
            self.restore_user(&medicine.user_id).await?
        } else {
            Vec::new()
        };

        tracing::info!(
            id,
            user_id = %medicine.user_id,
            cancelled,
            rescheduled = rescheduled.len(),
            "medicine deleted"
        );

        Ok(Some(Deleted {
            medicine,
            cancelled,
            rescheduled,
        }))
    }

    /// Register every time of every medicine of `user_id`. Safe to repeat.
    pub async fn resync_user(&self, user_id: &str) -> Result<Vec<ScheduleEntry>> {
        let medicines = self.list(user_id, false).await?;
        self.register_times(user_id, distinct_seconds(&medicines))
            .await
            .with_context(|| format!("failed to resync reminders for {user_id}"))
    }

    /// Register the user's times again after a cancel. Keys still inside
    /// their due window run right away.
    async fn restore_user(&self, user_id: &str) -> Result<Vec<ScheduleEntry>> {
        let medicines = self.list(user_id, false).await?;
        let mut entries = Vec::new();
        for target in distinct_seconds(&medicines) {
            let entry = self
                .registry
                .register_resuming(user_id, target, self.due_window_secs)
                .await
                .with_context(|| format!("failed to restore reminders for {user_id}"))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// [`Self::resync_user`] for every user that owns a medicine.
    pub async fn resync_all(&self) -> Result<Vec<ScheduleEntry>> {
        let users = self
            .with_db(|conn| Ok(store::list_users(conn)?))
            .await?;
        let mut entries = Vec::new();
        for user in users {
            entries.extend(self.resync_user(&user).await?);
        }
        Ok(entries)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Medicine>> {
        self.with_db(move |conn| Ok(store::get_medicine(conn, id)?))
            .await
    }

    pub async fn list(&self, user_id: &str, pending_only: bool) -> Result<Vec<Medicine>> {
        let user_id = user_id.to_string();
        self.with_db(move |conn| {
            let medicines = if pending_only {
                store::pending_medicines(conn, &user_id)?
            } else {
                store::list_medicines(conn, &user_id)?
            };
            Ok(medicines)
        })
        .await
    }

    /// Medicines of `user_id` scheduled at exactly `time`.
    pub async fn at_time(&self, user_id: &str, time: NaiveTime) -> Result<Vec<Medicine>> {
        let user_id = user_id.to_string();
        self.with_db(move |conn| Ok(store::medicines_at_time(conn, &user_id, time)?))
            .await
    }

    pub async fn schedules(&self, user_id: &str) -> Result<Vec<WorkInfo>> {
        Ok(self.registry.schedules(user_id).await?)
    }

    async fn register_times(
        &self,
        user_id: &str,
        seconds: BTreeSet<u32>,
    ) -> Result<Vec<ScheduleEntry>> {
        let mut entries = Vec::with_capacity(seconds.len());
        for target in seconds {
            entries.push(self.registry.register(user_id, target).await?);
        }
        Ok(entries)
    }
}

fn distinct_seconds(medicines: &[Medicine]) -> BTreeSet<u32> {
    medicines
        .iter()
        .flat_map(|m| m.times.iter())
        .map(|t| seconds_since_midnight(*t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::clock::FixedClock;
    use crate::reminder::queue::SqliteWorkQueue;
    use crate::reminder::registry::SchedulePolicy;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn service() -> MedicineService {
        service_at(7, 0)
    }

    fn service_at(h: u32, m: u32) -> MedicineService {
        let db = crate::db::shared(crate::db::open_memory_database().unwrap());
        let now = NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
        let queue = Arc::new(SqliteWorkQueue::new(Arc::clone(&db), Arc::clone(&clock)));
        let registry = ScheduleRegistry::new(queue, Arc::clone(&clock), SchedulePolicy::default());
        MedicineService::new(db, registry, clock)
    }

    fn new_medicine(name: &str, times: Vec<NaiveTime>) -> NewMedicine {
        NewMedicine {
            user_id: "alice".into(),
            name: name.into(),
            dosage: "500mg".into(),
            times,
            notes: None,
        }
    }

    #[test]
    fn distinct_seconds_merges_duplicates() {
        let m = Medicine {
            id: 1,
            user_id: "alice".into(),
            name: "Aspirin".into(),
            dosage: "500mg".into(),
            times: vec![t(8, 0), t(8, 0), t(20, 0)],
            notes: None,
            is_taken: false,
            last_taken: None,
            created_at: String::new(),
        };
        let seconds: Vec<u32> = distinct_seconds(&[m]).into_iter().collect();
        assert_eq!(seconds, vec![28_800, 72_000]);
    }

    #[tokio::test]
    async fn add_registers_one_schedule_per_time() {
        let svc = service();
        let added = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0), t(20, 0)]))
            .await
            .unwrap();
        assert_eq!(added.schedules.len(), 2);
        assert_eq!(svc.schedules("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn add_rejects_invalid_medicine() {
        let svc = service();
        assert!(svc.add_medicine(new_medicine("", vec![t(8, 0)])).await.is_err());
        assert!(svc.add_medicine(new_medicine("Aspirin", vec![])).await.is_err());
        assert!(svc.schedules("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_status_stamps_and_clears_last_taken() {
        let svc = service();
        let id = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0)]))
            .await
            .unwrap()
            .medicine
            .id;

        let taken = svc.set_status(id, true).await.unwrap().unwrap();
        assert!(taken.is_taken);
        assert!(taken.last_taken.is_some());

        let missed = svc.set_status(id, false).await.unwrap().unwrap();
        assert!(!missed.is_taken);
        assert!(missed.last_taken.is_none());

        assert!(svc.set_status(9_999, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reschedules_remaining_medicines() {
        let svc = service();
        let aspirin = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0)]))
            .await
            .unwrap();
        svc.add_medicine(new_medicine("Vitamin D", vec![t(20, 0)]))
            .await
            .unwrap();

        let deleted = svc.delete_medicine(aspirin.medicine.id).await.unwrap().unwrap();
        assert_eq!(deleted.cancelled, 2);
        assert_eq!(deleted.rescheduled.len(), 1);

        let left = svc.schedules("alice").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].input.target_seconds, 72_000);
    }

    #[tokio::test]
    async fn delete_without_reschedule_cancels_everything() {
        let svc = service().with_reschedule_remaining_on_delete(false);
        let aspirin = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0)]))
            .await
            .unwrap();
        svc.add_medicine(new_medicine("Vitamin D", vec![t(20, 0)]))
            .await
            .unwrap();

        svc.delete_medicine(aspirin.medicine.id).await.unwrap();
        assert!(svc.schedules("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_is_none() {
        assert!(service().delete_medicine(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resync_is_idempotent() {
        let svc = service();
        svc.add_medicine(new_medicine("Aspirin", vec![t(8, 0)])).await.unwrap();
        svc.add_medicine(new_medicine("Ibuprofen", vec![t(8, 0), t(14, 0)]))
            .await
            .unwrap();

        svc.resync_all().await.unwrap();
        svc.resync_user("alice").await.unwrap();
        assert_eq!(svc.schedules("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn at_time_and_pending_filters() {
        let svc = service();
        let aspirin = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0)]))
            .await
            .unwrap();
        svc.add_medicine(new_medicine("Vitamin D", vec![t(20, 0)]))
            .await
            .unwrap();
        svc.set_status(aspirin.medicine.id, true).await.unwrap();

        let at_eight = svc.at_time("alice", t(8, 0)).await.unwrap();
        assert_eq!(at_eight.len(), 1);
        assert_eq!(at_eight[0].name, "Aspirin");

        let pending = svc.list("alice", true).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "Vitamin D");
        assert_eq!(svc.list("alice", false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_inside_a_due_window_keeps_todays_reminders() {
        let svc = service_at(8, 5);
        let aspirin = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0)]))
            .await
            .unwrap();
        svc.add_medicine(new_medicine("Vitamin D", vec![t(8, 0), t(7, 0)]))
            .await
            .unwrap();

        let deleted = svc.delete_medicine(aspirin.medicine.id).await.unwrap().unwrap();
        let delays: Vec<(u32, u64)> = deleted
            .rescheduled
            .iter()
            .map(|e| (e.key.target_seconds, e.initial_delay.as_secs()))
            .collect();
        // 07:00 is past its window and rolls over; 08:00 runs now
        assert_eq!(delays, vec![(25_200, 23 * 3600 - 5 * 60), (28_800, 0)]);
    }

    #[tokio::test]
    async fn update_with_new_times_replaces_schedules() {
        let svc = service();
        let aspirin = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0)]))
            .await
            .unwrap();
        svc.add_medicine(new_medicine("Vitamin D", vec![t(20, 0)]))
            .await
            .unwrap();

        let edit = MedicineEdit {
            times: Some(vec![t(9, 0)]),
            ..Default::default()
        };
        let edited = svc
            .update_medicine(aspirin.medicine.id, edit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edited.medicine.times, vec![t(9, 0)]);
        assert_eq!(edited.cancelled, 2);

        let mut targets: Vec<u32> = svc
            .schedules("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.input.target_seconds)
            .collect();
        targets.sort();
        assert_eq!(targets, vec![32_400, 72_000]);
        assert_eq!(svc.get(aspirin.medicine.id).await.unwrap().unwrap().times, vec![t(9, 0)]);
    }

    #[tokio::test]
    async fn update_without_time_change_leaves_schedules() {
        let svc = service();
        let aspirin = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0)]))
            .await
            .unwrap();
        let before = svc.schedules("alice").await.unwrap();

        let edit = MedicineEdit {
            dosage: Some("250mg".into()),
            ..Default::default()
        };
        let edited = svc
            .update_medicine(aspirin.medicine.id, edit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edited.medicine.dosage, "250mg");
        assert_eq!(edited.cancelled, 0);
        assert!(edited.rescheduled.is_empty());
        let after = svc.schedules("alice").await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].generation, before[0].generation);
        assert_eq!(after[0].next_run_at_ms, before[0].next_run_at_ms);
    }

    #[tokio::test]
    async fn update_rejects_invalid_and_unknown() {
        let svc = service();
        let aspirin = svc
            .add_medicine(new_medicine("Aspirin", vec![t(8, 0)]))
            .await
            .unwrap();

        let empty_times = MedicineEdit {
            times: Some(Vec::new()),
            ..Default::default()
        };
        assert!(svc.update_medicine(aspirin.medicine.id, empty_times).await.is_err());
        assert_eq!(svc.schedules("alice").await.unwrap().len(), 1);

        let rename = MedicineEdit {
            name: Some("Ibuprofen".into()),
            ..Default::default()
        };
        assert!(svc.update_medicine(9_999, rename).await.unwrap().is_none());
    }
}
