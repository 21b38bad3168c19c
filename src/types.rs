use std::ops::{Add, AddAssign, Deref, Sub};

use parse_display::Display;
use serde::{Deserialize, Serialize};

const SECS_PER_DAY: f64 = 3600.0 * 24.0;

/// A time point in simulation, in seconds since start
#[derive(Debug, Clone, Copy, Default, PartialOrd, PartialEq, Display, Serialize, Deserialize)]
#[display("{0}")]
pub struct Time(pub f64);

impl Time {
    pub fn days(&self) -> f64 {
        self.0 / SECS_PER_DAY
    }
}

/// A duration of time in simulation, in seconds
#[derive(Debug, Clone, Copy, Default, PartialOrd, PartialEq, Display, Serialize, Deserialize)]
#[display("{0}")]
pub struct Duration(pub f64);

impl Duration {
    pub fn from_days(days: f64) -> Self {
        Duration(days * SECS_PER_DAY)
    }

    pub fn days(&self) -> f64 {
        self.0 / SECS_PER_DAY
    }
}

impl Deref for Duration {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        Time(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Time {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Time {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration(self.0 - rhs.0)
    }
}

/// A batch of events moving between pipeline stages.
///
/// Packets are plain values: whoever receives one absorbs its counts and drops it.
/// `total_size` is always derived from the event count, never set on its own.
#[derive(Debug, Clone, Copy, PartialEq, Display, Serialize)]
#[display("{events} events")]
pub struct DataPacket {
    events: u64,
    per_event_size: f64,
    total_size: f64,
}

impl DataPacket {
    pub fn new(events: u64, per_event_size: f64) -> Self {
        Self {
            events,
            per_event_size,
            total_size: events as f64 * per_event_size,
        }
    }

    /// A packet carrying nothing, the result of every transfer that moved no events
    pub fn empty(per_event_size: f64) -> Self {
        Self::new(0, per_event_size)
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    /// Size of one event, in MB
    pub fn per_event_size(&self) -> f64 {
        self.per_event_size
    }

    /// Size of the whole packet, in MB
    pub fn total_size(&self) -> f64 {
        self.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}
