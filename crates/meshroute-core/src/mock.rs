//! Deterministic test doubles
//!
//! [`ManualClock`] and [`MockTransport`] let a routing engine be driven one
//! handler at a time without a scheduler or a network.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meshroute_core::{ManualClock, MockTransport, NodeAddr, VirtualTime};
//!
//! let clock = Arc::new(ManualClock::new());
//! let transport = Arc::new(MockTransport::single(NodeAddr::new(10, 0, 0, 1)));
//!
//! // ... build an engine over clock.clone() and transport.clone() ...
//!
//! // Fire every timer due in the next second, in order
//! while let Some((handle, timer)) = clock.pop_due(VirtualTime::from_secs(1)) {
//!     engine.handle_timer(handle, timer);
//! }
//! let frames = transport.take_sent();
//! ```

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::address::{InterfaceInfo, NodeAddr};
use crate::clock::{Clock, TimerHandle};
use crate::error::TransportError;
use crate::time::VirtualTime;
use crate::transport::Transport;

/// A timer registered with a [`ManualClock`]
#[derive(Debug, Clone)]
pub struct PendingTimer<T> {
    /// Handle returned to the scheduler
    pub handle: TimerHandle,
    /// When the timer is due
    pub due: VirtualTime,
    /// The timer value
    pub timer: T,
    seq: u64,
}

#[derive(Debug)]
struct ManualClockState<T> {
    now: VirtualTime,
    next_id: u64,
    pending: Vec<PendingTimer<T>>,
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock<T> {
    state: Mutex<ManualClockState<T>>,
}

impl<T> ManualClock<T> {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::starting_at(VirtualTime::ZERO)
    }

    /// Create a clock at the given time
    pub fn starting_at(now: VirtualTime) -> Self {
        Self {
            state: Mutex::new(ManualClockState {
                now,
                next_id: 1,
                pending: Vec::new(),
            }),
        }
    }

    /// Move the clock forward without firing anything
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.now = state.now + by;
    }

    /// Number of timers still pending
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Check if a handle is still pending
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.state.lock().pending.iter().any(|p| p.handle == handle)
    }

    /// Due time of the earliest pending timer
    pub fn next_due(&self) -> Option<VirtualTime> {
        self.state.lock().pending.iter().map(|p| p.due).min()
    }

    /// Pop the earliest timer due at or before `deadline`
    ///
    /// The clock moves to the timer's due time. When nothing is due the
    /// clock moves to `deadline` and `None` is returned. Timers due at the
    /// same instant come out in scheduling order.
    pub fn pop_due(&self, deadline: VirtualTime) -> Option<(TimerHandle, T)> {
        let mut state = self.state.lock();
        let earliest = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= deadline)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(i, _)| i);

        match earliest {
            Some(index) => {
                let timer = state.pending.remove(index);
                if timer.due > state.now {
                    state.now = timer.due;
                }
                Some((timer.handle, timer.timer))
            }
            None => {
                if deadline > state.now {
                    state.now = deadline;
                }
                None
            }
        }
    }
}

impl<T: Clone> ManualClock<T> {
    /// Snapshot of the pending timers ordered by due time
    pub fn pending(&self) -> Vec<PendingTimer<T>> {
        let mut pending = self.state.lock().pending.clone();
        pending.sort_by_key(|p| (p.due, p.seq));
        pending
    }
}

impl<T> Default for ManualClock<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clock<T> for ManualClock<T> {
    fn now(&self) -> VirtualTime {
        self.state.lock().now
    }

    fn schedule_after(&self, delay: Duration, timer: T) -> TimerHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now + delay;
        let handle = TimerHandle(id);
        state.pending.push(PendingTimer {
            handle,
            due,
            timer,
            seq: id,
        });
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.state.lock().pending.retain(|p| p.handle != handle);
    }
}

/// A frame recorded by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Interface index the frame went out on
    pub interface: u32,
    /// Unicast destination, `None` for broadcasts
    pub dest: Option<NodeAddr>,
    /// The payload
    pub payload: Bytes,
}

impl SentFrame {
    /// Check if this frame was a broadcast
    pub fn is_broadcast(&self) -> bool {
        self.dest.is_none()
    }
}

/// A transport that records every frame instead of sending it
#[derive(Debug)]
pub struct MockTransport {
    interfaces: Vec<InterfaceInfo>,
    sent: Mutex<Vec<SentFrame>>,
    down_links: Mutex<HashSet<NodeAddr>>,
}

impl MockTransport {
    /// Create a transport exposing the given interfaces
    pub fn new(interfaces: Vec<InterfaceInfo>) -> Self {
        Self {
            interfaces,
            sent: Mutex::new(Vec::new()),
            down_links: Mutex::new(HashSet::new()),
        }
    }

    /// Create a transport with a single interface (index 1) bound to `local`
    pub fn single(local: NodeAddr) -> Self {
        Self::new(vec![InterfaceInfo::new(1, local, NodeAddr::BROADCAST)])
    }

    /// Make unicasts to `neighbor` fail with [`TransportError::LinkDown`]
    pub fn set_link_down(&self, neighbor: NodeAddr, down: bool) {
        let mut links = self.down_links.lock();
        if down {
            links.insert(neighbor);
        } else {
            links.remove(&neighbor);
        }
    }

    /// Take every recorded frame, leaving the record empty
    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Copy of the recorded frames
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    /// Number of recorded frames
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn check_interface(&self, interface: u32) -> Result<(), TransportError> {
        if self.interfaces.iter().any(|i| i.index == interface) {
            Ok(())
        } else {
            Err(TransportError::UnknownInterface(interface))
        }
    }
}

impl Transport for MockTransport {
    fn send_unicast(&self, interface: u32, dest: NodeAddr, payload: Bytes) -> Result<(), TransportError> {
        self.check_interface(interface)?;
        if self.down_links.lock().contains(&dest) {
            return Err(TransportError::LinkDown(dest));
        }
        self.sent.lock().push(SentFrame {
            interface,
            dest: Some(dest),
            payload,
        });
        Ok(())
    }

    fn send_broadcast(&self, interface: u32, payload: Bytes) -> Result<(), TransportError> {
        self.check_interface(interface)?;
        self.sent.lock().push(SentFrame {
            interface,
            dest: None,
            payload,
        });
        Ok(())
    }

    fn interfaces(&self) -> Vec<InterfaceInfo> {
        self.interfaces.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_orders_by_time_then_fifo() {
        let clock: ManualClock<&'static str> = ManualClock::new();
        clock.schedule_after(Duration::from_millis(20), "late");
        clock.schedule_after(Duration::from_millis(10), "first");
        clock.schedule_after(Duration::from_millis(10), "second");

        let deadline = VirtualTime::from_secs(1);
        let fired: Vec<_> = std::iter::from_fn(|| clock.pop_due(deadline))
            .map(|(_, t)| t)
            .collect();
        assert_eq!(fired, vec!["first", "second", "late"]);
        assert_eq!(clock.now(), deadline);
    }

    #[test]
    fn test_manual_clock_cancel() {
        let clock: ManualClock<u8> = ManualClock::new();
        let handle = clock.schedule_after(Duration::from_millis(5), 1);
        assert!(clock.is_pending(handle));

        clock.cancel(handle);
        assert!(!clock.is_pending(handle));
        assert!(clock.pop_due(VirtualTime::from_secs(1)).is_none());

        // Cancelling twice is harmless
        clock.cancel(handle);
    }

    #[test]
    fn test_manual_clock_zero_delay_fires_at_now() {
        let clock: ManualClock<u8> = ManualClock::starting_at(VirtualTime::from_secs(3));
        clock.schedule_after(Duration::ZERO, 7);
        let (_, timer) = clock.pop_due(clock.now()).unwrap();
        assert_eq!(timer, 7);
        assert_eq!(clock.now(), VirtualTime::from_secs(3));
    }

    #[test]
    fn test_mock_transport_records_frames() {
        let a = NodeAddr::new(10, 0, 0, 1);
        let b = NodeAddr::new(10, 0, 0, 2);
        let transport = MockTransport::single(a);

        tokio_test::assert_ok!(transport.send_broadcast(1, Bytes::from_static(b"hello")));
        tokio_test::assert_ok!(transport.send_unicast(1, b, Bytes::from_static(b"data")));

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].is_broadcast());
        assert_eq!(sent[1].dest, Some(b));
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_mock_transport_errors() {
        let a = NodeAddr::new(10, 0, 0, 1);
        let b = NodeAddr::new(10, 0, 0, 2);
        let transport = MockTransport::single(a);

        assert_eq!(
            transport.send_broadcast(9, Bytes::new()),
            Err(TransportError::UnknownInterface(9))
        );

        transport.set_link_down(b, true);
        assert_eq!(
            transport.send_unicast(1, b, Bytes::new()),
            Err(TransportError::LinkDown(b))
        );

        transport.set_link_down(b, false);
        assert!(transport.send_unicast(1, b, Bytes::new()).is_ok());
    }
}
