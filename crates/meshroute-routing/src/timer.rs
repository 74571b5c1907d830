//! Engine timers
//!
//! Timers are plain values. An engine schedules a [`Timer`] through its
//! [`Clock`] and gets it back through `handle_timer` when it fires.
//! [`TimerSet`] remembers the handle registered for every timer key, which
//! makes rescheduling cancel the previous instance and lets a firing that
//! lost a race with a cancel be recognised and ignored.

use std::collections::BTreeMap;
use std::time::Duration;

use meshroute_core::{Clock, NodeAddr, TimerHandle};

/// Every timer either engine schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timer {
    /// Send a hello beacon
    Hello,
    /// Age out silent neighbors
    NeighborPurge,
    /// Sweep expired routes
    TablePurge,
    /// Sweep the broadcast-id cache
    IdCachePurge,
    /// Reset the request rate limiter
    RreqRateReset,
    /// Reset the error rate limiter
    RerrRateReset,
    /// A route request got no reply in time
    RreqRetry(NodeAddr),
    /// A request held back by the rate limiter may go out now
    DeferredRreq(NodeAddr),
    /// A reply that asked for an ack was not acknowledged
    AckTimeout(NodeAddr),
    /// Full-table advertisement
    PeriodicUpdate,
    /// Advertise pending changes
    TriggeredUpdate,
    /// A destination's settling time is over
    SettlingExpired(NodeAddr),
}

/// Handles of the timers an engine has outstanding
#[derive(Debug, Default)]
pub struct TimerSet {
    pending: BTreeMap<Timer, TimerHandle>,
}

impl TimerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `timer`, replacing any outstanding instance of it
    pub fn schedule<C: Clock<Timer> + ?Sized>(&mut self, clock: &C, delay: Duration, timer: Timer) -> TimerHandle {
        if let Some(old) = self.pending.remove(&timer) {
            clock.cancel(old);
        }
        let handle = clock.schedule_after(delay, timer);
        self.pending.insert(timer, handle);
        handle
    }

    /// Schedule `timer` unless an instance is already outstanding
    pub fn schedule_if_idle<C: Clock<Timer> + ?Sized>(&mut self, clock: &C, delay: Duration, timer: Timer) -> bool {
        if self.pending.contains_key(&timer) {
            return false;
        }
        self.schedule(clock, delay, timer);
        true
    }

    /// Cancel an outstanding timer; `false` if none was registered
    pub fn cancel<C: Clock<Timer> + ?Sized>(&mut self, clock: &C, timer: Timer) -> bool {
        match self.pending.remove(&timer) {
            Some(handle) => {
                clock.cancel(handle);
                true
            }
            None => false,
        }
    }

    /// Cancel everything
    pub fn cancel_all<C: Clock<Timer> + ?Sized>(&mut self, clock: &C) {
        for (_, handle) in std::mem::take(&mut self.pending) {
            clock.cancel(handle);
        }
    }

    /// Check if an instance of `timer` is outstanding
    pub fn is_pending(&self, timer: Timer) -> bool {
        self.pending.contains_key(&timer)
    }

    /// Registered handle of `timer`
    pub fn handle(&self, timer: Timer) -> Option<TimerHandle> {
        self.pending.get(&timer).copied()
    }

    /// Accept a firing
    ///
    /// Returns `true` and forgets the registration when `handle` is the
    /// registered one. Stale or cancelled firings return `false`.
    pub fn fired(&mut self, timer: Timer, handle: TimerHandle) -> bool {
        match self.pending.get(&timer) {
            Some(current) if *current == handle => {
                self.pending.remove(&timer);
                true
            }
            _ => false,
        }
    }

    /// Number of outstanding timers
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is outstanding
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
