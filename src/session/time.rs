// src/session/time.rs

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Source of wall-clock time for a session.
///
/// Deadlines are absolute instants, so everything that needs "now" asks this
/// trait instead of counting ticks.
pub trait TimeSource: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Used to simulate a host that suspended the process for a while: advancing
/// it by a large step is exactly what a throttled background tab looks like
/// from the session's point of view.
#[derive(Debug)]
pub struct ManualTime {
    nanos: AtomicI64,
}

impl ManualTime {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            nanos: AtomicI64::new(start.timestamp_nanos_opt().unwrap_or(i64::MAX)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.nanos.fetch_add(step, Ordering::SeqCst);
    }
}

impl Default for ManualTime {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Time left until `deadline_at`, clamped at zero.
pub fn remaining_until(deadline_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let left = deadline_at - now;
    if left <= TimeDelta::zero() {
        Duration::ZERO
    } else {
        left.to_std().unwrap_or_default()
    }
}
