//! Injectable source of "now".

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn local_now(&self) -> NaiveDateTime;

    /// Current instant, used for audit timestamps.
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The host clock in the host time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Local time and UTC are the same.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn local_now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.local_now().and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn fixed_clock_advances() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(23, 50, 0)
            .unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::minutes(15));
        assert_eq!(clock.local_now(), start + Duration::minutes(15));
        assert_eq!(clock.utc_now().naive_utc(), start + Duration::minutes(15));
    }
}
