use chrono::{DateTime, TimeDelta, Utc};

/// A periodic task evaluated from the tick loop.
///
/// `poll` returns `true` at most once per period; the next due time is
/// computed from the moment the task actually ran, so a late tick never
/// causes a burst of catch-up runs.
#[derive(Debug, Clone)]
pub struct Schedule {
    next_due: DateTime<Utc>,
    period: TimeDelta,
}

impl Schedule {
    /// First run at `first_due`, then every `period`.
    pub fn starting_at(first_due: DateTime<Utc>, period: TimeDelta) -> Self {
        Self { next_due: first_due, period }
    }

    /// First run one `period` after `now`.
    pub fn every(now: DateTime<Utc>, period: TimeDelta) -> Self {
        Self::starting_at(now + period, period)
    }

    /// Returns `true` if the task is due and advances the schedule.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.period;
        true
    }

    pub fn next_due(&self) -> DateTime<Utc> {
        self.next_due
    }
}
