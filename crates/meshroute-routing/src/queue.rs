//! Buffer for packets waiting on route discovery
//!
//! Entries are kept in one FIFO across all destinations, so flushing a
//! destination returns its packets in the order they were sent. Capacity is
//! bounded in total and per destination; overflow rejects the newest packet
//! rather than evicting an older one.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tracing::trace;

use meshroute_core::{DataPacket, NodeAddr, VirtualTime};

use crate::forward::{ErrorCallback, ForwardCallback};

/// A buffered packet and the callbacks supplied when it was routed
pub struct QueueEntry {
    /// The packet
    pub packet: DataPacket,
    /// Invoked when a route becomes available
    pub forward: ForwardCallback,
    /// Invoked when the packet is dropped
    pub error: ErrorCallback,
    /// When the packet entered the queue
    pub enqueued_at: VirtualTime,
}

impl QueueEntry {
    /// Create an entry; the timestamp is set on enqueue
    pub fn new(packet: DataPacket, forward: ForwardCallback, error: ErrorCallback) -> Self {
        Self {
            packet,
            forward,
            error,
            enqueued_at: VirtualTime::ZERO,
        }
    }

    /// Destination of the buffered packet
    pub fn destination(&self) -> NodeAddr {
        self.packet.destination()
    }

    fn is_timed_out(&self, timeout: Duration, now: VirtualTime) -> bool {
        now.saturating_since(self.enqueued_at) > timeout
    }
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("packet", &self.packet)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Bounded FIFO of [`QueueEntry`]
#[derive(Debug)]
pub struct PacketQueue {
    entries: VecDeque<QueueEntry>,
    max_len: usize,
    max_per_dst: usize,
    timeout: Duration,
}

impl PacketQueue {
    /// Create a queue
    ///
    /// # Arguments
    /// * `max_len` - Total capacity across every destination
    /// * `max_per_dst` - Capacity for any single destination
    /// * `timeout` - How long a packet may wait before it is discarded
    pub fn new(max_len: usize, max_per_dst: usize, timeout: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            max_len,
            max_per_dst,
            timeout,
        }
    }

    /// Buffer a packet
    ///
    /// Hands the entry back when the queue or the destination's share of it
    /// is full, or when the same packet is already buffered. Its callbacks
    /// are not invoked; the caller reports the drop.
    pub fn enqueue(&mut self, mut entry: QueueEntry, now: VirtualTime) -> Result<(), QueueEntry> {
        self.purge(now);

        let dst = entry.destination();
        let id = entry.packet.header.id;
        if self
            .entries
            .iter()
            .any(|e| e.packet.header.id == id && e.destination() == dst)
        {
            trace!(destination = %dst, packet_id = id, "packet already queued");
            return Err(entry);
        }
        if self.entries.len() >= self.max_len || self.count_for(dst) >= self.max_per_dst {
            trace!(destination = %dst, queued = self.entries.len(), "queue full");
            return Err(entry);
        }

        entry.enqueued_at = now;
        self.entries.push_back(entry);
        Ok(())
    }

    /// Remove the oldest live entry for `dst`
    pub fn dequeue(&mut self, dst: NodeAddr, now: VirtualTime) -> Option<QueueEntry> {
        self.purge(now);
        let index = self.entries.iter().position(|e| e.destination() == dst)?;
        self.entries.remove(index)
    }

    /// Remove every live entry for `dst`, oldest first
    pub fn dequeue_all(&mut self, dst: NodeAddr, now: VirtualTime) -> Vec<QueueEntry> {
        self.purge(now);
        let (matching, rest): (VecDeque<_>, VecDeque<_>) =
            self.entries.drain(..).partition(|e| e.destination() == dst);
        self.entries = rest;
        matching.into()
    }

    /// Check if anything is buffered for `dst`
    pub fn find(&mut self, dst: NodeAddr, now: VirtualTime) -> bool {
        self.purge(now);
        self.entries.iter().any(|e| e.destination() == dst)
    }

    /// Discard every entry for `dst` and return how many there were
    ///
    /// Callbacks are not invoked.
    pub fn drop_packet_with_dst(&mut self, dst: NodeAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.destination() != dst);
        before - self.entries.len()
    }

    /// Take every entry regardless of destination
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }

    /// Discard entries that waited longer than the timeout
    pub fn purge(&mut self, now: VirtualTime) {
        let timeout = self.timeout;
        self.entries.retain(|e| {
            let expired = e.is_timed_out(timeout, now);
            if expired {
                trace!(packet = %e.packet, waited = ?now.saturating_since(e.enqueued_at), "queued packet timed out");
            }
            !expired
        });
    }

    /// Destinations with buffered packets, in first-seen order
    pub fn destinations(&self) -> Vec<NodeAddr> {
        let mut out: Vec<NodeAddr> = Vec::new();
        for entry in &self.entries {
            let dst = entry.destination();
            if !out.contains(&dst) {
                out.push(dst);
            }
        }
        out
    }

    /// Number of buffered packets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn count_for(&self, dst: NodeAddr) -> usize {
        self.entries.iter().filter(|e| e.destination() == dst).count()
    }
}
