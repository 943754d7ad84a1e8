//! Reminder scheduling and delivery.
//!
//! - [`time_math`]: seconds-of-day arithmetic, delays and due windows
//! - [`registry`]: one recurring due check per (user, time of day)
//! - [`runner`]: the due check run on every tick
//! - [`queue`] and [`executor`]: the persistent recurring-task facility

pub mod clock;
pub mod error;
pub mod executor;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod time_math;
pub mod work;
