//! Virtual time
//!
//! The engine never reads a wall clock. Every timestamp it stores is a
//! [`VirtualTime`] handed out by its [`Clock`](crate::Clock), which lets the
//! simulator run hours of protocol activity in milliseconds and lets tests
//! step time by hand.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A monotonic virtual instant with microsecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The start of virtual time
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// An instant that is never reached (used for entries that never expire)
    pub const MAX: VirtualTime = VirtualTime(u64::MAX);

    /// Create an instant from microseconds since the start
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Create an instant from milliseconds since the start
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    /// Create an instant from seconds since the start
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    /// Microseconds since the start
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Time elapsed since the start
    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.0)
    }

    /// Duration from `earlier` to `self`, or zero if `earlier` is later
    pub fn saturating_since(&self, earlier: VirtualTime) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Duration from `self` until `later`, or zero if `later` has passed
    pub fn until(&self, later: VirtualTime) -> Duration {
        later.saturating_since(*self)
    }

    /// Add a duration, saturating at [`VirtualTime::MAX`]
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl Add<Duration> for VirtualTime {
    type Output = VirtualTime;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl AddAssign<Duration> for VirtualTime {
    fn add_assign(&mut self, rhs: Duration) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub<Duration> for VirtualTime {
    type Output = VirtualTime;

    fn sub(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(micros))
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::MAX {
            return write!(f, "never");
        }
        write!(f, "{}.{:06}s", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}
