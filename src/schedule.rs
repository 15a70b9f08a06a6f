//! Heartbeat-to-poll scheduling.
//!
//! The host ticks far more often than the vendors should be polled. The
//! scheduler turns those ticks into one poll per interval.

use chrono::{DateTime, Local, TimeDelta};

use crate::config::PollInterval;

#[derive(Debug)]
pub struct PollScheduler {
    next_poll: DateTime<Local>,
    interval: TimeDelta,
}

impl PollScheduler {
    /// The first tick at or after `now` is due.
    pub fn new(interval: PollInterval, now: DateTime<Local>) -> Self {
        Self {
            next_poll: now,
            interval: TimeDelta::minutes(i64::from(interval.minutes())),
        }
    }

    /// Whether a poll cycle should run at `now`.
    ///
    /// When due, the next poll is rescheduled before returning, so the
    /// interval is measured from tick to tick however long the cycle takes.
    pub fn due(&mut self, now: DateTime<Local>) -> bool {
        if now < self.next_poll {
            return false;
        }
        self.next_poll = now + self.interval;
        true
    }

    pub fn next_poll(&self) -> DateTime<Local> {
        self.next_poll
    }
}
