//! Business clock.
//!
//! Commands carry an explicit `occurred_at` so aggregates stay deterministic;
//! the clock is only consulted at the application boundary to stamp them.

use std::sync::RwLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Source of the current business time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The current business date (UTC calendar day).
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Pin the clock to midday of the given date.
    pub fn on(date: NaiveDate) -> Self {
        Self::new(midday(date))
    }

    pub fn set_today(&self, date: NaiveDate) {
        if let Ok(mut now) = self.now.write() {
            *now = midday(date);
        }
    }

    pub fn advance_days(&self, days: i64) {
        if let Ok(mut now) = self.now.write() {
            *now += Duration::days(days);
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

fn midday(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(12, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_by_whole_days() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let clock = FixedClock::on(start);
        clock.advance_days(3);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
