//! One-hop neighbor liveness

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use meshroute_core::{NodeAddr, VirtualTime};

/// Expiry per neighbor, refreshed by every frame heard from it
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    neighbors: BTreeMap<NodeAddr, VirtualTime>,
}

impl NeighborTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh or insert a neighbor
    ///
    /// An existing later expiry is kept.
    pub fn update(&mut self, addr: NodeAddr, expires_at: VirtualTime) {
        let slot = self.neighbors.entry(addr).or_insert(expires_at);
        if expires_at > *slot {
            *slot = expires_at;
        }
    }

    /// Check if `addr` is a live neighbor
    pub fn is_neighbor(&self, addr: NodeAddr, now: VirtualTime) -> bool {
        self.neighbors.get(&addr).is_some_and(|expiry| now < *expiry)
    }

    /// Time until the neighbor expires, zero when unknown
    pub fn expire_time(&self, addr: NodeAddr, now: VirtualTime) -> Duration {
        self.neighbors
            .get(&addr)
            .map(|expiry| now.until(*expiry))
            .unwrap_or(Duration::ZERO)
    }

    /// Remove expired neighbors, calling `on_lost` once for each
    ///
    /// The expired set is collected before anything is removed, so the
    /// callback never sees a neighbor twice in one pass.
    pub fn purge(&mut self, now: VirtualTime, mut on_lost: impl FnMut(NodeAddr)) -> usize {
        let expired: Vec<NodeAddr> = self
            .neighbors
            .iter()
            .filter(|(_, expiry)| now >= **expiry)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in &expired {
            self.neighbors.remove(addr);
            debug!(neighbor = %addr, "neighbor expired");
            on_lost(*addr);
        }
        expired.len()
    }

    /// Forget a neighbor without reporting it
    pub fn remove(&mut self, addr: NodeAddr) -> bool {
        self.neighbors.remove(&addr).is_some()
    }

    /// Live neighbors in address order
    pub fn neighbors(&self, now: VirtualTime) -> Vec<NodeAddr> {
        self.neighbors
            .iter()
            .filter(|(_, expiry)| now < **expiry)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Forget every neighbor
    pub fn clear(&mut self) {
        self.neighbors.clear();
    }

    /// Number of tracked neighbors, live or not yet purged
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Check if no neighbor is tracked
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(c: char) -> NodeAddr {
        NodeAddr::new(10, 0, 0, (c as u8 - b'A') + 1)
    }

    #[test]
    fn test_update_keeps_later_expiry() {
        let mut table = NeighborTable::new();
        table.update(addr('B'), VirtualTime::from_secs(5));
        table.update(addr('B'), VirtualTime::from_secs(3));

        assert_eq!(table.expire_time(addr('B'), VirtualTime::from_secs(1)), Duration::from_secs(4));

        table.update(addr('B'), VirtualTime::from_secs(8));
        assert_eq!(table.expire_time(addr('B'), VirtualTime::from_secs(1)), Duration::from_secs(7));
    }

    #[test]
    fn test_is_neighbor() {
        let mut table = NeighborTable::new();
        table.update(addr('B'), VirtualTime::from_secs(2));

        assert!(table.is_neighbor(addr('B'), VirtualTime::from_secs(1)));
        assert!(!table.is_neighbor(addr('B'), VirtualTime::from_secs(2)));
        assert!(!table.is_neighbor(addr('C'), VirtualTime::ZERO));
        assert_eq!(table.expire_time(addr('C'), VirtualTime::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_purge_reports_each_expired_neighbor_once() {
        let mut table = NeighborTable::new();
        table.update(addr('B'), VirtualTime::from_secs(1));
        table.update(addr('C'), VirtualTime::from_secs(5));
        table.update(addr('D'), VirtualTime::from_secs(2));

        let mut lost = Vec::new();
        let count = table.purge(VirtualTime::from_secs(3), |n| lost.push(n));

        assert_eq!(count, 2);
        assert_eq!(lost, vec![addr('B'), addr('D')]);
        assert_eq!(table.len(), 1);

        // Second pass at the same instant finds nothing new
        let count = table.purge(VirtualTime::from_secs(3), |n| lost.push(n));
        assert_eq!(count, 0);
        assert_eq!(lost.len(), 2);
    }

    #[test]
    fn test_neighbors_and_clear() {
        let mut table = NeighborTable::new();
        table.update(addr('C'), VirtualTime::from_secs(5));
        table.update(addr('B'), VirtualTime::from_secs(5));

        assert_eq!(table.neighbors(VirtualTime::ZERO), vec![addr('B'), addr('C')]);
        assert!(table.remove(addr('B')));
        table.clear();
        assert!(table.is_empty());
    }
}
