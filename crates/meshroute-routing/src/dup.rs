//! Suppression of re-flooded messages
//!
//! [`BroadcastIdCache`] remembers `(origin, request id)` pairs of route
//! requests. [`DuplicateCache`] does the same for broadcast data packets
//! and also records whether, and where, the packet was re-broadcast.

use std::collections::BTreeMap;
use std::time::Duration;

use meshroute_core::{NodeAddr, VirtualTime};

/// Recently seen route requests
#[derive(Debug, Clone)]
pub struct BroadcastIdCache {
    seen: BTreeMap<(NodeAddr, u32), VirtualTime>,
    lifetime: Duration,
}

impl BroadcastIdCache {
    /// Create a cache whose records live for `lifetime`
    pub fn new(lifetime: Duration) -> Self {
        Self {
            seen: BTreeMap::new(),
            lifetime,
        }
    }

    /// Check and record a request
    ///
    /// Returns `true` if the pair was seen within the lifetime. On first
    /// sight the pair is recorded and `false` is returned.
    pub fn is_duplicate(&mut self, origin: NodeAddr, id: u32, now: VirtualTime) -> bool {
        if let Some(expiry) = self.seen.get(&(origin, id))
            && now < *expiry
        {
            return true;
        }
        self.seen.insert((origin, id), now + self.lifetime);
        false
    }

    /// Record a request this node originates so its echoes are ignored
    pub fn record(&mut self, origin: NodeAddr, id: u32, now: VirtualTime) {
        self.seen.insert((origin, id), now + self.lifetime);
    }

    /// Drop expired records
    pub fn purge(&mut self, now: VirtualTime) {
        self.seen.retain(|_, expiry| now < *expiry);
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// A broadcast data packet already processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRecord {
    /// Originating node
    pub origin: NodeAddr,
    /// Packet id at the origin
    pub sequence: u64,
    /// When the record is forgotten
    pub expires_at: VirtualTime,
    /// Whether this node re-broadcast the packet
    pub forwarded: bool,
    /// Interfaces the packet went out on
    pub interfaces: Vec<u32>,
}

/// Recently seen broadcast data packets
#[derive(Debug, Clone)]
pub struct DuplicateCache {
    records: BTreeMap<(NodeAddr, u64), DuplicateRecord>,
    lifetime: Duration,
}

impl DuplicateCache {
    /// Create a cache whose records live for `lifetime`
    pub fn new(lifetime: Duration) -> Self {
        Self {
            records: BTreeMap::new(),
            lifetime,
        }
    }

    /// Check and record a packet; `true` means it was already seen
    pub fn check(&mut self, origin: NodeAddr, sequence: u64, now: VirtualTime) -> bool {
        if let Some(record) = self.records.get(&(origin, sequence))
            && now < record.expires_at
        {
            return true;
        }
        self.records.insert(
            (origin, sequence),
            DuplicateRecord {
                origin,
                sequence,
                expires_at: now + self.lifetime,
                forwarded: false,
                interfaces: Vec::new(),
            },
        );
        false
    }

    /// Note that the packet was re-broadcast on `interface`
    pub fn mark_forwarded(&mut self, origin: NodeAddr, sequence: u64, interface: u32) -> bool {
        match self.records.get_mut(&(origin, sequence)) {
            Some(record) => {
                record.forwarded = true;
                if !record.interfaces.contains(&interface) {
                    record.interfaces.push(interface);
                }
                true
            }
            None => false,
        }
    }

    /// Look up a record
    pub fn get(&self, origin: NodeAddr, sequence: u64) -> Option<&DuplicateRecord> {
        self.records.get(&(origin, sequence))
    }

    /// Drop expired records
    pub fn purge(&mut self, now: VirtualTime) {
        self.records.retain(|_, record| now < record.expires_at);
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
