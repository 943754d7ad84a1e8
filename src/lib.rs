//! Medicine reminders with a persistent recurring schedule.
//!
//! Users record medicines with one or more daily times. Each (user, time)
//! pair gets one recurring due check; on every tick the check looks for
//! untaken medicines whose time falls inside the due window and notifies.
//!
//! # Architecture
//!
//! - **Storage**: SQLite holds medicines, the scheduled work queue and the
//!   notification outbox in one file
//! - **Scheduling**: unique periodic work keyed by
//!   `medicine_reminder_{user}_{seconds}`, tagged per user for cancellation
//! - **Execution**: `medrem serve` polls due work and runs ticks concurrently
//!   under a time budget, with exponential backoff on Retry
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`medicine`]: Medicine records and the store the due check reads
//! - [`reminder`]: Time math, schedule registry, due check, work queue, executor
//! - [`notify`]: Notification content and sinks
//! - [`service`]: Medicine mutations that keep schedules in step
//! - [`assistant`]: Canned how-to answers

pub mod assistant;
pub mod config;
pub mod db;
pub mod medicine;
pub mod notify;
pub mod reminder;
pub mod service;
