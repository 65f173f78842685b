//! Fixed-period scheduling for the mixer loop
//!
//! Deadlines are absolute: each tick advances the next deadline by exactly
//! one period, so time spent mixing and writing does not accumulate as drift.
//! A loop that falls badly behind (suspended process, stalled device) is
//! re-anchored instead of bursting to catch up.

use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Periods of lag tolerated before the schedule is re-anchored
pub const MAX_LAG_PERIODS: u32 = 4;

#[derive(Debug)]
pub struct Cadence {
    period: Duration,
    next: Instant,
    reanchors: u64,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(Instant::now(), period)
    }

    /// First deadline is one period after `start`
    pub fn starting_at(start: Instant, period: Duration) -> Self {
        Self {
            period,
            next: start + period,
            reanchors: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Upcoming deadline
    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Times the schedule has been reset after falling behind
    pub fn reanchors(&self) -> u64 {
        self.reanchors
    }

    /// Consume the current deadline and return how long to sleep until it.
    ///
    /// Zero when the deadline has already passed.
    pub fn advance(&mut self, now: Instant) -> Duration {
        let deadline = self.next;

        if now <= deadline {
            self.next = deadline + self.period;
            return deadline - now;
        }

        let lag = now - deadline;
        if lag > self.period * MAX_LAG_PERIODS {
            self.reanchors += 1;
            debug!(lag_ms = lag.as_millis() as u64, "Mixer fell behind, re-anchoring cadence");
            self.next = now + self.period;
        } else {
            self.next = deadline + self.period;
        }
        Duration::ZERO
    }

    /// Block the calling thread until the next deadline
    pub fn wait(&mut self) {
        let sleep = self.advance(Instant::now());
        if !sleep.is_zero() {
            thread::sleep(sleep);
        }
    }
}
