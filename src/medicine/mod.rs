pub mod store;
pub mod types;

use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::Arc;

use crate::db::SharedConnection;
use crate::reminder::error::StoreError;
use types::Medicine;

/// Read access to medicine records, as consumed by the due check.
///
/// Implementations must tolerate concurrent callers; ticks for different
/// users or times may read at the same moment.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// All medicines of a user, `times` in insertion order.
    async fn all_medicines(&self, user_id: &str) -> Result<Vec<Medicine>, StoreError>;

    /// Medicines of a user not yet marked as taken.
    async fn pending_medicines(&self, user_id: &str) -> Result<Vec<Medicine>, StoreError>;
}

/// [`ReminderStore`] backed by the shared SQLite connection. Queries run on
/// the blocking pool.
#[derive(Clone)]
pub struct SqliteReminderStore {
    db: SharedConnection,
}

impl SqliteReminderStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("db lock poisoned: {e}")))?;
            f(&*conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl ReminderStore for SqliteReminderStore {
    async fn all_medicines(&self, user_id: &str) -> Result<Vec<Medicine>, StoreError> {
        let user_id = user_id.to_string();
        self.read(move |conn| store::list_medicines(conn, &user_id)).await
    }

    async fn pending_medicines(&self, user_id: &str) -> Result<Vec<Medicine>, StoreError> {
        let user_id = user_id.to_string();
        self.read(move |conn| store::pending_medicines(conn, &user_id)).await
    }
}
