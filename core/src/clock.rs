use chrono::{Local, NaiveDate, NaiveTime, Timelike};

/// Source of "today" and "now" in the user's local zone.
///
/// Everything that depends on the current day takes a `Clock` instead of
/// reading the system time, so weekly and monthly windows can be pinned in tests.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now(&self) -> NaiveTime;
}

/// The local system clock, with times truncated to the minute.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> NaiveTime {
        truncate_to_minute(Local::now().time())
    }
}

/// A clock frozen at a given day and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    pub today: NaiveDate,
    pub now: NaiveTime,
}

impl FixedClock {
    #[must_use]
    pub fn new(today: NaiveDate, now: NaiveTime) -> Self {
        Self { today, now }
    }

    /// Frozen at noon on `today`.
    #[must_use]
    pub fn on(today: NaiveDate) -> Self {
        Self::new(today, NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN))
    }

    pub fn set_today(&mut self, today: NaiveDate) {
        self.today = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }

    fn now(&self) -> NaiveTime {
        self.now
    }
}

/// Entry times are stored at minute resolution.
#[must_use]
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}
