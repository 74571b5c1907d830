//! Discrete-event kernel
//!
//! A single [`EventQueue`] holds every pending event of a simulation run,
//! ordered by virtual time and, for events due at the same instant, by
//! insertion order. Each node sees the queue through a [`SimClock`] and a
//! [`SimTransport`]; both only enqueue events; nothing is dispatched
//! while an engine handler is running.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use meshroute_core::{Clock, InterfaceInfo, NodeAddr, TimerHandle, Transport, TransportError, VirtualTime};
use meshroute_routing::Timer;

use crate::types::{Frame, PeerId, SUBNET_BROADCAST, SimEvent, Target};

/// Interface index every simulated node uses
pub const SIM_INTERFACE: u32 = 1;

struct Scheduled {
    at: VirtualTime,
    seq: u64,
    event: SimEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Time-ordered event queue with cancellation
#[derive(Default)]
pub struct EventQueue {
    now: VirtualTime,
    next_seq: u64,
    heap: BinaryHeap<Reverse<Scheduled>>,
    /// Sequence numbers still live; cancelled entries stay in the heap and
    /// are skipped when popped
    live: HashSet<u64>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time (the due time of the last popped event)
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Schedule `event` after `delay`
    pub fn schedule(&mut self, delay: Duration, event: SimEvent) -> TimerHandle {
        self.schedule_at(self.now + delay, event)
    }

    /// Schedule `event` at an absolute time; times in the past mean "now"
    pub fn schedule_at(&mut self, at: VirtualTime, event: SimEvent) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(seq);
        self.heap.push(Reverse(Scheduled {
            at: at.max(self.now),
            seq,
            event,
        }));
        TimerHandle(seq)
    }

    /// Cancel a pending event; unknown or already-fired handles are ignored
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle.0)
    }

    /// Check if an event is still pending
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.live.contains(&handle.0)
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Due time of the next pending event
    pub fn peek_time(&mut self) -> Option<VirtualTime> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse(next)| next.at)
    }

    /// Remove the next event and move the clock to its due time
    pub fn pop(&mut self) -> Option<(TimerHandle, SimEvent)> {
        self.discard_cancelled();
        let Reverse(next) = self.heap.pop()?;
        self.live.remove(&next.seq);
        self.now = next.at;
        Some((TimerHandle(next.seq), next.event))
    }

    /// Move the clock forward without firing anything
    pub fn advance_to(&mut self, at: VirtualTime) {
        self.now = self.now.max(at);
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse(next)) = self.heap.peek() {
            if self.live.contains(&next.seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

/// Event queue shared by the simulation and every node's collaborators
pub type SharedQueue = Arc<Mutex<EventQueue>>;

/// A node's view of the kernel clock
#[derive(Clone)]
pub struct SimClock {
    node: PeerId,
    queue: SharedQueue,
}

impl SimClock {
    pub fn new(node: PeerId, queue: SharedQueue) -> Self {
        Self { node, queue }
    }
}

impl Clock<Timer> for SimClock {
    fn now(&self) -> VirtualTime {
        self.queue.lock().now()
    }

    fn schedule_after(&self, delay: Duration, timer: Timer) -> TimerHandle {
        self.queue.lock().schedule(
            delay,
            SimEvent::Timer {
                node: self.node,
                timer,
            },
        )
    }

    fn cancel(&self, handle: TimerHandle) {
        self.queue.lock().cancel(handle);
    }
}

/// A node's single interface onto the simulated medium
///
/// Sends are queued as `Transmit` events; the simulation resolves them
/// against the topology once the sending handler has returned.
#[derive(Clone)]
pub struct SimTransport {
    node: PeerId,
    queue: SharedQueue,
}

impl SimTransport {
    pub fn new(node: PeerId, queue: SharedQueue) -> Self {
        Self { node, queue }
    }

    fn transmit(&self, target: Target, payload: Bytes) {
        self.queue.lock().schedule(
            Duration::ZERO,
            SimEvent::Transmit {
                from: self.node,
                target,
                frame: Frame::Control(payload),
            },
        );
    }
}

impl Transport for SimTransport {
    fn send_unicast(&self, interface: u32, dest: NodeAddr, payload: Bytes) -> Result<(), TransportError> {
        if interface != SIM_INTERFACE {
            return Err(TransportError::UnknownInterface(interface));
        }
        let peer = PeerId::from_addr(dest).ok_or(TransportError::LinkDown(dest))?;
        self.transmit(Target::Unicast(peer), payload);
        Ok(())
    }

    fn send_broadcast(&self, interface: u32, payload: Bytes) -> Result<(), TransportError> {
        if interface != SIM_INTERFACE {
            return Err(TransportError::UnknownInterface(interface));
        }
        self.transmit(Target::Broadcast, payload);
        Ok(())
    }

    fn interfaces(&self) -> Vec<InterfaceInfo> {
        vec![InterfaceInfo::new(SIM_INTERFACE, self.node.addr(), SUBNET_BROADCAST)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_up(c: char) -> SimEvent {
        SimEvent::LinkUp(PeerId('A'), PeerId(c))
    }

    fn peer_of(event: &SimEvent) -> char {
        match event {
            SimEvent::LinkUp(_, b) => b.0,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_events_pop_in_time_order() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_millis(30), link_up('C'));
        queue.schedule(Duration::from_millis(10), link_up('B'));
        queue.schedule(Duration::from_millis(20), link_up('D'));

        let order: Vec<char> = std::iter::from_fn(|| queue.pop()).map(|(_, e)| peer_of(&e)).collect();
        assert_eq!(order, vec!['B', 'D', 'C']);
        assert_eq!(queue.now(), VirtualTime::from_millis(30));
    }

    #[test]
    fn test_same_instant_is_fifo() {
        let mut queue = EventQueue::new();
        for c in ['E', 'B', 'D', 'C'] {
            queue.schedule(Duration::from_millis(5), link_up(c));
        }
        let order: Vec<char> = std::iter::from_fn(|| queue.pop()).map(|(_, e)| peer_of(&e)).collect();
        assert_eq!(order, vec!['E', 'B', 'D', 'C']);
    }

    #[test]
    fn test_cancelled_events_are_skipped() {
        let mut queue = EventQueue::new();
        let first = queue.schedule(Duration::from_millis(1), link_up('B'));
        let second = queue.schedule(Duration::from_millis(2), link_up('C'));
        assert!(queue.cancel(first));
        assert!(!queue.cancel(first));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_time(), Some(VirtualTime::from_millis(2)));

        let (handle, event) = queue.pop().unwrap();
        assert_eq!(handle, second);
        assert_eq!(peer_of(&event), 'C');
        assert!(!queue.is_pending(second));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_past_times_are_clamped_to_now() {
        let mut queue = EventQueue::new();
        queue.advance_to(VirtualTime::from_secs(2));
        queue.schedule_at(VirtualTime::from_secs(1), link_up('B'));
        assert_eq!(queue.peek_time(), Some(VirtualTime::from_secs(2)));
    }

    #[test]
    fn test_clock_and_transport_enqueue_events() {
        let queue: SharedQueue = Arc::new(Mutex::new(EventQueue::new()));
        let clock = SimClock::new(PeerId('A'), queue.clone());
        let transport = SimTransport::new(PeerId('A'), queue.clone());

        let handle = clock.schedule_after(Duration::from_secs(1), Timer::Hello);
        transport.send_broadcast(SIM_INTERFACE, Bytes::from_static(b"rreq")).unwrap();
        assert!(matches!(
            transport.send_unicast(7, PeerId('B').addr(), Bytes::new()),
            Err(TransportError::UnknownInterface(7))
        ));
        assert!(matches!(
            transport.send_unicast(SIM_INTERFACE, NodeAddr::new(192, 168, 0, 1), Bytes::new()),
            Err(TransportError::LinkDown(_))
        ));

        // Transmit is due now and goes first
        let (_, event) = queue.lock().pop().unwrap();
        assert!(matches!(
            event,
            SimEvent::Transmit { from: PeerId('A'), target: Target::Broadcast, .. }
        ));
        clock.cancel(handle);
        assert!(queue.lock().pop().is_none());

        let iface = transport.interfaces()[0];
        assert_eq!(iface.local, PeerId('A').addr());
        assert!(iface.is_broadcast_for(SUBNET_BROADCAST));
    }
}
