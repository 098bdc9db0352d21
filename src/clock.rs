//! Time source abstraction
//!
//! The engine never reads the wall clock directly; every time-dependent decision
//! (window decay, cooldown, throttling) goes through a [`Clock`].

use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;
use std::rc::Rc;

/// Source of the current time
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
///
/// Clones share the same instant, so a test (or a replay driver) can keep a handle
/// and move time forward while the engine owns another clone.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Rc::new(Cell::new(start.timestamp_millis())),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        self.millis.set(instant.timestamp_millis());
    }

    pub fn advance(&self, by: Duration) {
        self.millis.set(self.millis.get() + by.num_milliseconds());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.millis.get()).unwrap_or_default()
    }
}
