//! Clock abstraction
//!
//! A [`Clock`] provides the current virtual time and lets the engine
//! register timers for later. Timers are plain values of type `T` rather
//! than closures: when a timer fires, the owner of the engine hands the
//! value back to the engine, which re-validates its state before acting.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::time::VirtualTime;

/// Handle identifying a scheduled timer, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerHandle(pub u64);

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Virtual time source with delayed, cancellable timers
///
/// Implementations must deliver timers in virtual-time order, and timers
/// due at the same instant in the order they were scheduled. A zero delay
/// is valid and means "after the current handler returns".
pub trait Clock<T> {
    /// The current virtual time
    fn now(&self) -> VirtualTime;

    /// Schedule `timer` to fire after `delay`
    fn schedule_after(&self, delay: Duration, timer: T) -> TimerHandle;

    /// Cancel a previously scheduled timer
    ///
    /// Cancelling a timer that already fired or was already cancelled is a no-op.
    fn cancel(&self, handle: TimerHandle);
}

impl<T, C: Clock<T> + ?Sized> Clock<T> for Arc<C> {
    fn now(&self) -> VirtualTime {
        (**self).now()
    }

    fn schedule_after(&self, delay: Duration, timer: T) -> TimerHandle {
        (**self).schedule_after(delay, timer)
    }

    fn cancel(&self, handle: TimerHandle) {
        (**self).cancel(handle)
    }
}
