//! Routing table with sequence-number freshness and hold-down
//!
//! The [`RoutingTable`] owns one [`RoutingTableEntry`] per destination.
//! Entries are never shared: callers get short-lived borrows or clones.
//!
//! Invalidation and deletion are separate steps. A broken route is first
//! marked [`RouteFlag::Invalid`] with a bumped sequence number and a short
//! hold-down expiry, so the unreachability can still be advertised, and is
//! only removed once that hold-down has passed.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::trace;

use meshroute_core::{InterfaceInfo, NodeAddr, VirtualTime};

use crate::forward::Route;
use crate::seqno::seq_newer;

/// Usability state of a route
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteFlag {
    /// The route can carry traffic
    #[display("VALID")]
    Valid,
    /// The route is known broken and in hold-down
    #[display("INVALID")]
    Invalid,
    /// A discovery for this destination is outstanding
    #[display("IN_SEARCH")]
    InSearch,
}

/// One destination's route record
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTableEntry {
    /// Destination address
    pub destination: NodeAddr,
    /// Next hop toward the destination
    pub next_hop: NodeAddr,
    /// Egress interface
    pub interface: InterfaceInfo,
    /// Destination sequence number
    pub seq_no: u32,
    /// Whether `seq_no` is authoritative
    pub valid_seq_no: bool,
    /// Hops to the destination
    pub hop_count: u16,
    /// When the entry goes stale
    pub expires_at: VirtualTime,
    /// Usability state
    pub flag: RouteFlag,
    /// Discovery attempts made for this destination
    pub rreq_count: u8,
    /// When the entry was last refreshed by the network
    pub updated_at: VirtualTime,
    /// Settling time used by the periodic protocol
    pub settling_time: Duration,
    /// Pending advertisement in the periodic protocol
    pub changed: bool,
    precursors: BTreeSet<NodeAddr>,
    blacklisted_until: Option<VirtualTime>,
}

impl RoutingTableEntry {
    /// Create a valid one-hop entry that never expires
    ///
    /// Use the `with_*` methods to fill in the rest.
    pub fn new(destination: NodeAddr, next_hop: NodeAddr, interface: InterfaceInfo) -> Self {
        Self {
            destination,
            next_hop,
            interface,
            seq_no: 0,
            valid_seq_no: false,
            hop_count: 1,
            expires_at: VirtualTime::MAX,
            flag: RouteFlag::Valid,
            rreq_count: 0,
            updated_at: VirtualTime::ZERO,
            settling_time: Duration::ZERO,
            changed: false,
            precursors: BTreeSet::new(),
            blacklisted_until: None,
        }
    }

    /// Set the sequence number and whether it is authoritative
    pub fn with_seq_no(mut self, seq_no: u32, valid: bool) -> Self {
        self.seq_no = seq_no;
        self.valid_seq_no = valid;
        self
    }

    /// Set the hop count
    pub fn with_hop_count(mut self, hop_count: u16) -> Self {
        self.hop_count = hop_count;
        self
    }

    /// Set the entry to expire `lifetime` after `now`
    pub fn with_lifetime(mut self, lifetime: Duration, now: VirtualTime) -> Self {
        self.expires_at = now + lifetime;
        self.updated_at = now;
        self
    }

    /// Set the flag
    pub fn with_flag(mut self, flag: RouteFlag) -> Self {
        self.flag = flag;
        self
    }

    /// The forwarding decision this entry represents
    pub fn route(&self) -> Route {
        Route {
            destination: self.destination,
            source: self.interface.local,
            gateway: self.next_hop,
            interface: self.interface.index,
        }
    }

    /// Take over the path of `fresh`, keeping precursors and blacklisting
    pub fn replace_route(&mut self, fresh: &RoutingTableEntry) {
        self.next_hop = fresh.next_hop;
        self.interface = fresh.interface;
        self.seq_no = fresh.seq_no;
        self.valid_seq_no = fresh.valid_seq_no;
        self.hop_count = fresh.hop_count;
        self.expires_at = fresh.expires_at;
        self.updated_at = fresh.updated_at;
        self.flag = fresh.flag;
        self.rreq_count = 0;
    }

    /// Check if the entry has reached its expiry
    pub fn is_expired(&self, now: VirtualTime) -> bool {
        now >= self.expires_at
    }

    /// Check if the entry is VALID and not expired
    pub fn is_usable(&self, now: VirtualTime) -> bool {
        self.flag == RouteFlag::Valid && !self.is_expired(now)
    }

    /// Time left before expiry
    pub fn remaining_lifetime(&self, now: VirtualTime) -> Duration {
        now.until(self.expires_at)
    }

    /// Time since the entry was last refreshed
    pub fn age(&self, now: VirtualTime) -> Duration {
        now.saturating_since(self.updated_at)
    }

    /// Set the expiry to `now + lifetime`
    pub fn set_lifetime(&mut self, lifetime: Duration, now: VirtualTime) {
        self.expires_at = now + lifetime;
    }

    /// Push the expiry out to at least `now + lifetime`
    pub fn extend_lifetime(&mut self, lifetime: Duration, now: VirtualTime) {
        self.expires_at = self.expires_at.max(now + lifetime);
    }

    /// Mark the route broken and start its hold-down
    pub fn invalidate(&mut self, bad_link_lifetime: Duration, now: VirtualTime) {
        if self.flag == RouteFlag::Invalid {
            return;
        }
        self.flag = RouteFlag::Invalid;
        self.rreq_count = 0;
        self.expires_at = now + bad_link_lifetime;
    }

    /// Record a neighbor that uses this node toward `destination`
    ///
    /// Returns `false` if the precursor was already known.
    pub fn insert_precursor(&mut self, precursor: NodeAddr) -> bool {
        self.precursors.insert(precursor)
    }

    /// Check if a neighbor is a precursor
    pub fn lookup_precursor(&self, precursor: NodeAddr) -> bool {
        self.precursors.contains(&precursor)
    }

    /// Forget a precursor
    pub fn delete_precursor(&mut self, precursor: NodeAddr) -> bool {
        self.precursors.remove(&precursor)
    }

    /// Forget every precursor
    pub fn delete_all_precursors(&mut self) {
        self.precursors.clear();
    }

    /// Check if no neighbor routes through this node toward `destination`
    pub fn precursors_empty(&self) -> bool {
        self.precursors.is_empty()
    }

    /// The precursors, in address order
    pub fn precursors(&self) -> impl Iterator<Item = NodeAddr> + '_ {
        self.precursors.iter().copied()
    }

    /// Blacklist (or clear) the link to this neighbor as unidirectional
    pub fn set_unidirectional(&mut self, until: Option<VirtualTime>) {
        self.blacklisted_until = until;
    }

    /// Check if the link is currently blacklisted
    pub fn is_unidirectional(&self, now: VirtualTime) -> bool {
        self.blacklisted_until.is_some_and(|until| now < until)
    }
}

/// Mapping from destination to route
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: BTreeMap<NodeAddr, RoutingTableEntry>,
    /// Hold-down applied to expired VALID entries; `None` deletes them instead
    bad_link_lifetime: Option<Duration>,
}

impl RoutingTable {
    /// Create a table that puts expired routes into hold-down for `bad_link_lifetime`
    pub fn with_hold_down(bad_link_lifetime: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            bad_link_lifetime: Some(bad_link_lifetime),
        }
    }

    /// Create a table that removes expired routes outright
    pub fn without_hold_down() -> Self {
        Self::default()
    }

    /// Look up the entry for a destination, whatever its state
    pub fn lookup_route(&self, dest: NodeAddr) -> Option<&RoutingTableEntry> {
        self.entries.get(&dest)
    }

    /// Mutable lookup
    pub fn lookup_route_mut(&mut self, dest: NodeAddr) -> Option<&mut RoutingTableEntry> {
        self.entries.get_mut(&dest)
    }

    /// Look up a VALID, unexpired entry
    pub fn lookup_valid_route(&self, dest: NodeAddr, now: VirtualTime) -> Option<&RoutingTableEntry> {
        self.entries.get(&dest).filter(|e| e.is_usable(now))
    }

    /// Insert a new entry
    ///
    /// Returns `false` and keeps the existing entry if the destination is
    /// already present.
    pub fn add_route(&mut self, entry: RoutingTableEntry) -> bool {
        match self.entries.entry(entry.destination) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Replace an existing entry; returns `false` if absent
    pub fn update(&mut self, entry: RoutingTableEntry) -> bool {
        match self.entries.get_mut(&entry.destination) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => false,
        }
    }

    /// Remove an entry; returns `false` if absent
    pub fn delete_route(&mut self, dest: NodeAddr) -> bool {
        self.entries.remove(&dest).is_some()
    }

    /// Change the flag of an entry; returns `false` if absent
    pub fn set_entry_state(&mut self, dest: NodeAddr, flag: RouteFlag) -> bool {
        match self.entries.get_mut(&dest) {
            Some(entry) => {
                entry.flag = flag;
                if flag == RouteFlag::Invalid {
                    entry.rreq_count = 0;
                }
                true
            }
            None => false,
        }
    }

    /// Extend the lifetime of a VALID route after it carried traffic
    pub fn update_route_lifetime(&mut self, dest: NodeAddr, lifetime: Duration, now: VirtualTime) -> bool {
        match self.entries.get_mut(&dest) {
            Some(entry) if entry.flag == RouteFlag::Valid => {
                entry.rreq_count = 0;
                entry.extend_lifetime(lifetime, now);
                true
            }
            _ => false,
        }
    }

    /// Expire stale entries and return the ones removed
    ///
    /// With a hold-down, expired VALID entries become INVALID for the
    /// hold-down period and expired INVALID entries are removed. Without
    /// one, every expired entry except the hop-0 self entry is removed.
    /// IN_SEARCH entries are left alone: the discovery timer owns them.
    pub fn purge(&mut self, now: VirtualTime) -> Vec<RoutingTableEntry> {
        let expired: Vec<NodeAddr> = self
            .entries
            .values()
            .filter(|e| e.is_expired(now) && e.flag != RouteFlag::InSearch && e.hop_count > 0)
            .map(|e| e.destination)
            .collect();

        let mut removed = Vec::new();
        for dest in expired {
            let hold_down = self.bad_link_lifetime;
            let Some(entry) = self.entries.get_mut(&dest) else {
                continue;
            };
            match (entry.flag, hold_down) {
                (RouteFlag::Valid, Some(lifetime)) => {
                    trace!(destination = %dest, "route expired, entering hold-down");
                    entry.invalidate(lifetime, now);
                }
                _ => {
                    if let Some(entry) = self.entries.remove(&dest) {
                        trace!(destination = %dest, flag = %entry.flag, "route purged");
                        removed.push(entry);
                    }
                }
            }
        }
        removed
    }

    /// Invalidate every VALID route whose next hop is `next_hop`
    ///
    /// Each affected entry gets its sequence number bumped by one (an odd
    /// number signals "infinite metric" to periodic peers) and a hold-down
    /// of `delete_period`. Returns the affected destinations with their new
    /// sequence numbers.
    pub fn invalidate_routes_with_next_hop(
        &mut self,
        next_hop: NodeAddr,
        delete_period: Duration,
        now: VirtualTime,
    ) -> BTreeMap<NodeAddr, u32> {
        let mut unreachable = BTreeMap::new();
        for entry in self.entries.values_mut() {
            if entry.next_hop != next_hop || entry.flag != RouteFlag::Valid {
                continue;
            }
            debug_assert!(
                entry.hop_count > 0,
                "self entry for {} cannot route through a neighbor",
                entry.destination
            );
            entry.seq_no = entry.seq_no.wrapping_add(1);
            entry.invalidate(delete_period, now);
            unreachable.insert(entry.destination, entry.seq_no);
        }
        unreachable
    }

    /// Every entry whose next hop is `next_hop`
    pub fn entries_with_next_hop(&self, next_hop: NodeAddr) -> Vec<&RoutingTableEntry> {
        self.entries
            .values()
            .filter(|e| e.next_hop == next_hop)
            .collect()
    }

    /// Invalidate the VALID routes named in an error report
    ///
    /// The stored sequence number is raised to the reported one when the
    /// report is fresher.
    pub fn invalidate_routes_with_dst(&mut self, unreachable: &BTreeMap<NodeAddr, u32>, now: VirtualTime) {
        let lifetime = self.bad_link_lifetime.unwrap_or(Duration::ZERO);
        for (dest, seq_no) in unreachable {
            if let Some(entry) = self.entries.get_mut(dest) {
                if entry.flag != RouteFlag::Valid {
                    continue;
                }
                if seq_newer(*seq_no, entry.seq_no) {
                    entry.seq_no = *seq_no;
                }
                entry.invalidate(lifetime, now);
            }
        }
    }

    /// Blacklist the link to a neighbor as unidirectional
    pub fn mark_link_unidirectional(&mut self, neighbor: NodeAddr, blacklist_timeout: Duration, now: VirtualTime) -> bool {
        match self.entries.get_mut(&neighbor) {
            Some(entry) => {
                entry.set_unidirectional(Some(now + blacklist_timeout));
                true
            }
            None => false,
        }
    }

    /// Remove every entry that uses the given interface
    pub fn delete_all_routes_from_interface(&mut self, interface: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.interface.index != interface);
        before - self.entries.len()
    }

    /// Iterate over every entry in destination order
    pub fn iter(&self) -> impl Iterator<Item = &RoutingTableEntry> {
        self.entries.values()
    }

    /// All known destinations
    pub fn destinations(&self) -> Vec<NodeAddr> {
        self.entries.keys().copied().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(c: char) -> NodeAddr {
        NodeAddr::new(10, 0, 0, (c as u8 - b'A') + 1)
    }

    fn iface() -> InterfaceInfo {
        InterfaceInfo::new(1, addr('A'), NodeAddr::BROADCAST)
    }

    fn make_route(dest: char, next_hop: char, seq: u32, hops: u16) -> RoutingTableEntry {
        RoutingTableEntry::new(addr(dest), addr(next_hop), iface())
            .with_seq_no(seq, true)
            .with_hop_count(hops)
            .with_lifetime(Duration::from_secs(3), VirtualTime::ZERO)
    }

    #[test]
    fn test_add_route_does_not_overwrite() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));

        assert!(table.add_route(make_route('C', 'B', 4, 2)));
        assert!(!table.add_route(make_route('C', 'D', 9, 1)));

        let entry = table.lookup_route(addr('C')).unwrap();
        assert_eq!(entry.next_hop, addr('B'));
        assert_eq!(entry.seq_no, 4);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_requires_existing_entry() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        assert!(!table.update(make_route('C', 'B', 4, 2)));

        table.add_route(make_route('C', 'B', 4, 2));
        assert!(table.update(make_route('C', 'D', 6, 3)));
        assert_eq!(table.lookup_route(addr('C')).unwrap().next_hop, addr('D'));
    }

    #[test]
    fn test_delete_route() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('C', 'B', 4, 2));

        assert!(table.delete_route(addr('C')));
        assert!(!table.delete_route(addr('C')));
        assert!(table.is_empty());
    }

    #[test]
    fn test_lookup_valid_route_checks_flag_and_expiry() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('C', 'B', 4, 2));

        let now = VirtualTime::from_secs(1);
        assert!(table.lookup_valid_route(addr('C'), now).is_some());
        assert!(table.lookup_valid_route(addr('C'), VirtualTime::from_secs(3)).is_none());

        table.set_entry_state(addr('C'), RouteFlag::InSearch);
        assert!(table.lookup_valid_route(addr('C'), now).is_none());
        assert!(table.lookup_route(addr('C')).is_some());
    }

    #[test]
    fn test_purge_with_hold_down_invalidates_then_removes() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('C', 'B', 4, 2));

        // Expired VALID -> INVALID, kept for the hold-down
        let removed = table.purge(VirtualTime::from_secs(4));
        assert!(removed.is_empty());
        let entry = table.lookup_route(addr('C')).unwrap();
        assert_eq!(entry.flag, RouteFlag::Invalid);
        assert_eq!(entry.expires_at, VirtualTime::from_secs(19));

        // Hold-down over -> removed and reported
        let removed = table.purge(VirtualTime::from_secs(20));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].destination, addr('C'));
        assert!(table.lookup_route(addr('C')).is_none());
    }

    #[test]
    fn test_purge_without_hold_down_removes_expired() {
        let mut table = RoutingTable::without_hold_down();
        table.add_route(make_route('C', 'B', 4, 2));
        table.add_route(
            RoutingTableEntry::new(addr('A'), addr('A'), iface())
                .with_hop_count(0)
                .with_lifetime(Duration::ZERO, VirtualTime::ZERO),
        );

        let removed = table.purge(VirtualTime::from_secs(10));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].destination, addr('C'));
        // Self entry survives
        assert!(table.lookup_route(addr('A')).is_some());
    }

    #[test]
    fn test_purge_leaves_in_search_entries() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('C', 'B', 4, 2).with_flag(RouteFlag::InSearch));

        let removed = table.purge(VirtualTime::from_secs(100));
        assert!(removed.is_empty());
        assert_eq!(table.lookup_route(addr('C')).unwrap().flag, RouteFlag::InSearch);
    }

    #[test]
    fn test_invalidate_routes_with_next_hop() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        // A -> B -> C and A -> D -> E
        table.add_route(make_route('B', 'B', 2, 1));
        table.add_route(make_route('C', 'B', 6, 2));
        table.add_route(make_route('D', 'D', 3, 1));
        table.add_route(make_route('E', 'D', 8, 2));

        let now = VirtualTime::from_secs(1);
        let unreachable = table.invalidate_routes_with_next_hop(addr('B'), Duration::from_secs(15), now);

        assert_eq!(unreachable.len(), 2);
        assert_eq!(unreachable.get(&addr('B')), Some(&3));
        assert_eq!(unreachable.get(&addr('C')), Some(&7));

        let c = table.lookup_route(addr('C')).unwrap();
        assert_eq!(c.flag, RouteFlag::Invalid);
        assert_eq!(c.seq_no, 7);
        assert_eq!(c.expires_at, VirtualTime::from_secs(16));

        // Routes through D are untouched
        assert_eq!(table.lookup_route(addr('D')).unwrap().flag, RouteFlag::Valid);
        assert_eq!(table.lookup_route(addr('E')).unwrap().flag, RouteFlag::Valid);
        assert_eq!(table.lookup_route(addr('E')).unwrap().seq_no, 8);
    }

    #[test]
    fn test_invalidate_twice_does_not_bump_again() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('C', 'B', 6, 2));

        let now = VirtualTime::from_secs(1);
        table.invalidate_routes_with_next_hop(addr('B'), Duration::from_secs(15), now);
        let second = table.invalidate_routes_with_next_hop(addr('B'), Duration::from_secs(15), now);

        assert!(second.is_empty());
        assert_eq!(table.lookup_route(addr('C')).unwrap().seq_no, 7);
    }

    #[test]
    fn test_entries_with_next_hop() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('B', 'B', 2, 1));
        table.add_route(make_route('C', 'B', 6, 2));
        table.add_route(make_route('D', 'D', 3, 1));

        let via_b: Vec<NodeAddr> = table
            .entries_with_next_hop(addr('B'))
            .iter()
            .map(|e| e.destination)
            .collect();
        assert_eq!(via_b, vec![addr('B'), addr('C')]);
    }

    #[test]
    fn test_invalidate_routes_with_dst() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('C', 'B', 6, 2));
        table.add_route(make_route('D', 'B', 3, 2));

        let mut unreachable = BTreeMap::new();
        unreachable.insert(addr('C'), 9);
        unreachable.insert(addr('D'), 1);
        table.invalidate_routes_with_dst(&unreachable, VirtualTime::from_secs(1));

        let c = table.lookup_route(addr('C')).unwrap();
        assert_eq!(c.flag, RouteFlag::Invalid);
        assert_eq!(c.seq_no, 9);
        // Stale report never lowers the sequence number
        assert_eq!(table.lookup_route(addr('D')).unwrap().seq_no, 3);
    }

    #[test]
    fn test_precursors() {
        let mut entry = make_route('C', 'B', 6, 2);
        assert!(entry.precursors_empty());

        assert!(entry.insert_precursor(addr('D')));
        assert!(!entry.insert_precursor(addr('D')));
        assert!(entry.insert_precursor(addr('E')));
        assert!(entry.lookup_precursor(addr('E')));

        assert!(entry.delete_precursor(addr('D')));
        assert!(!entry.delete_precursor(addr('D')));
        assert_eq!(entry.precursors().collect::<Vec<_>>(), vec![addr('E')]);

        entry.delete_all_precursors();
        assert!(entry.precursors_empty());
    }

    #[test]
    fn test_entry_invalidate() {
        let mut entry = make_route('C', 'B', 6, 2);
        entry.rreq_count = 2;
        entry.invalidate(Duration::from_secs(3), VirtualTime::from_secs(10));

        assert_eq!(entry.flag, RouteFlag::Invalid);
        assert_eq!(entry.rreq_count, 0);
        assert_eq!(entry.expires_at, VirtualTime::from_secs(13));
    }

    #[test]
    fn test_mark_link_unidirectional() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('B', 'B', 2, 1));

        let now = VirtualTime::from_secs(1);
        assert!(table.mark_link_unidirectional(addr('B'), Duration::from_secs(5), now));
        assert!(!table.mark_link_unidirectional(addr('Z'), Duration::from_secs(5), now));

        let entry = table.lookup_route(addr('B')).unwrap();
        assert!(entry.is_unidirectional(VirtualTime::from_secs(3)));
        assert!(!entry.is_unidirectional(VirtualTime::from_secs(6)));
    }

    #[test]
    fn test_update_route_lifetime_only_for_valid() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        table.add_route(make_route('C', 'B', 6, 2));
        table.add_route(make_route('D', 'B', 6, 2).with_flag(RouteFlag::InSearch));

        let now = VirtualTime::from_secs(2);
        assert!(table.update_route_lifetime(addr('C'), Duration::from_secs(3), now));
        assert!(!table.update_route_lifetime(addr('D'), Duration::from_secs(3), now));
        assert_eq!(table.lookup_route(addr('C')).unwrap().expires_at, VirtualTime::from_secs(5));
    }

    #[test]
    fn test_delete_all_routes_from_interface() {
        let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
        let other = InterfaceInfo::new(2, addr('A'), NodeAddr::BROADCAST);
        table.add_route(make_route('B', 'B', 2, 1));
        table.add_route(RoutingTableEntry::new(addr('C'), addr('C'), other));

        assert_eq!(table.delete_all_routes_from_interface(2), 1);
        assert_eq!(table.destinations(), vec![addr('B')]);
    }
}
