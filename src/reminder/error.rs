//! Error taxonomy of the reminder subsystem.

use thiserror::Error;

use super::work::TickOutcome;

/// The reminder store could not answer a query.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("corrupt medicine row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// A single notification could not be rendered or sent.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),

    #[error("notifier command failed: {0}")]
    Command(String),

    #[error("outbox write failed: {0}")]
    Outbox(#[from] rusqlite::Error),
}

/// Registering or cancelling a schedule failed.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("invalid schedule key: {0}")]
    InvalidKey(String),

    #[error("work queue unavailable: {0}")]
    Unavailable(String),

    #[error("work queue query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("work input is not valid JSON: {0}")]
    Input(#[from] serde_json::Error),
}

/// Why a tick ended without success.
#[derive(Error, Debug)]
pub enum TickError {
    #[error("invalid tick input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

impl TickError {
    /// Terminal signal handed back to the work queue.
    pub fn outcome(&self) -> TickOutcome {
        match self {
            Self::InvalidInput(_) => TickOutcome::Failed,
            Self::StoreUnavailable(_) => TickOutcome::Retry,
        }
    }
}
