//! Route maintenance
//!
//! Link failures, route error propagation to precursors and the periodic
//! sweeps of the neighbor table, routing table and packet queue.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use meshroute_core::{Clock, InterfaceInfo, NodeAddr, Transport};

use super::AodvEngine;
use crate::error::RoutingResult;
use crate::messages::{ControlMessage, RouteError};
use crate::table::{RouteFlag, RoutingTableEntry};
use crate::timer::Timer;

impl<C, X> AodvEngine<C, X>
where
    C: Clock<Timer>,
    X: Transport,
{
    /// Keep a one-hop route to the neighbor a control message came from
    pub(super) fn update_route_to_neighbor(&mut self, sender: NodeAddr, iface: InterfaceInfo) {
        let now = self.clock.now();
        let active = self.config.active_route_timeout;

        let Some(entry) = self.table.lookup_route_mut(sender) else {
            self.table.add_route(
                RoutingTableEntry::new(sender, sender, iface)
                    .with_seq_no(0, false)
                    .with_hop_count(1)
                    .with_lifetime(active, now),
            );
            return;
        };

        let direct = entry.flag == RouteFlag::Valid
            && entry.hop_count == 1
            && entry.next_hop == sender
            && entry.interface.index == iface.index;
        if direct {
            entry.extend_lifetime(active, now);
            return;
        }

        let lifetime = active.max(entry.remaining_lifetime(now));
        entry.next_hop = sender;
        entry.interface = iface;
        entry.hop_count = 1;
        entry.valid_seq_no = false;
        entry.flag = RouteFlag::Valid;
        entry.updated_at = now;
        entry.set_lifetime(lifetime, now);
        trace!(neighbor = %sender, "Route to neighbor now direct");
    }

    /// Invalidate everything routed through `neighbor` and tell the precursors
    pub(super) fn handle_link_failure(&mut self, neighbor: NodeAddr) -> RoutingResult<()> {
        let now = self.clock.now();
        let mut precursors: BTreeSet<NodeAddr> = self
            .table
            .entries_with_next_hop(neighbor)
            .into_iter()
            .filter(|e| e.flag == RouteFlag::Valid)
            .flat_map(|e| e.precursors())
            .collect();
        precursors.remove(&neighbor);

        let unreachable =
            self.table
                .invalidate_routes_with_next_hop(neighbor, self.config.delete_period(), now);
        if unreachable.is_empty() {
            trace!(neighbor = %neighbor, "Link lost, no active routes through it");
            return Ok(());
        }
        debug!(
            neighbor = %neighbor,
            routes = unreachable.len(),
            precursors = precursors.len(),
            "Link lost, routes invalidated"
        );
        self.send_rerr_batches(&unreachable, &precursors, false)
    }

    /// Split `unreachable` into full-size route errors for `precursors`
    fn send_rerr_batches(
        &mut self,
        unreachable: &BTreeMap<NodeAddr, u32>,
        precursors: &BTreeSet<NodeAddr>,
        no_delete: bool,
    ) -> RoutingResult<()> {
        let fresh = || {
            let mut rerr = RouteError::new();
            rerr.no_delete = no_delete;
            rerr
        };
        let mut rerr = fresh();
        for (&dst, &seq_no) in unreachable {
            if rerr.is_full() {
                let full = std::mem::replace(&mut rerr, fresh());
                self.send_rerr_message(full, precursors)?;
            }
            rerr.add_unreachable(dst, seq_no);
        }
        if rerr.is_empty() {
            return Ok(());
        }
        self.send_rerr_message(rerr, precursors)
    }

    /// Deliver a route error to `precursors`
    ///
    /// A single precursor gets a unicast over its route. Several get one
    /// broadcast on each interface their routes use.
    fn send_rerr_message(
        &mut self,
        rerr: RouteError,
        precursors: &BTreeSet<NodeAddr>,
    ) -> RoutingResult<()> {
        if precursors.is_empty() {
            trace!("No precursors, RERR not sent");
            return Ok(());
        }
        if self.rerr_count >= self.config.rerr_rate_limit {
            debug!(destinations = rerr.dest_count(), "RERR rate limit reached, dropping");
            return Ok(());
        }
        let now = self.clock.now();
        let message = ControlMessage::Rerr(rerr);

        if let (1, Some(&precursor)) = (precursors.len(), precursors.first()) {
            let Some(iface) = self
                .table
                .lookup_valid_route(precursor, now)
                .map(|e| e.interface)
            else {
                trace!(precursor = %precursor, "No route to precursor, RERR not sent");
                return Ok(());
            };
            self.rerr_count += 1;
            return self.send_control(iface, Some(precursor), &message);
        }

        let ifaces: BTreeSet<u32> = precursors
            .iter()
            .filter_map(|p| self.table.lookup_valid_route(*p, now))
            .map(|e| e.interface.index)
            .collect();
        if ifaces.is_empty() {
            return Ok(());
        }
        self.rerr_count += 1;
        for index in ifaces {
            let iface = self.interface(index)?;
            self.send_control(iface, None, &message)?;
        }
        Ok(())
    }

    /// Report a destination this node was asked to forward to but cannot reach
    pub(super) fn send_rerr_when_no_route_to_forward(
        &mut self,
        dst: NodeAddr,
        dst_seq_no: u32,
        origin: NodeAddr,
    ) -> RoutingResult<()> {
        if self.rerr_count >= self.config.rerr_rate_limit {
            debug!(destination = %dst, "RERR rate limit reached, dropping");
            return Ok(());
        }
        let now = self.clock.now();
        let mut rerr = RouteError::new();
        rerr.add_unreachable(dst, dst_seq_no);
        let message = ControlMessage::Rerr(rerr);
        self.rerr_count += 1;

        match self.table.lookup_valid_route(origin, now).cloned() {
            Some(to_origin) => {
                self.send_control(to_origin.interface, Some(to_origin.next_hop), &message)
            }
            None => self.broadcast_control(&message),
        }
    }

    pub(super) fn recv_error(&mut self, rerr: RouteError, src: NodeAddr) -> RoutingResult<()> {
        let now = self.clock.now();
        let mut unreachable = BTreeMap::new();
        let mut precursors = BTreeSet::new();
        let mut lost_neighbors = Vec::new();

        for &(dst, seq_no) in rerr.unreachable() {
            if self.neighbors.is_neighbor(dst, now) {
                lost_neighbors.push(dst);
                continue;
            }
            let Some(entry) = self.table.lookup_route(dst) else {
                continue;
            };
            if entry.next_hop != src || entry.flag != RouteFlag::Valid {
                continue;
            }
            precursors.extend(entry.precursors());
            unreachable.insert(dst, seq_no);
        }

        if !unreachable.is_empty() {
            debug!(from = %src, routes = unreachable.len(), "RERR received, invalidating");
            self.send_rerr_batches(&unreachable, &precursors, rerr.no_delete)?;
            self.table.invalidate_routes_with_dst(&unreachable, now);
        }

        for neighbor in lost_neighbors {
            debug!(neighbor = %neighbor, from = %src, "RERR names a neighbor, treating link as lost");
            self.neighbors.remove(neighbor);
            self.handle_link_failure(neighbor)?;
        }
        Ok(())
    }

    /// Run link failure for every neighbor that went silent
    pub(super) fn purge_neighbors(&mut self) -> RoutingResult<()> {
        let now = self.clock.now();
        let mut lost = Vec::new();
        self.neighbors.purge(now, |neighbor| lost.push(neighbor));
        for neighbor in lost {
            self.handle_link_failure(neighbor)?;
        }
        Ok(())
    }

    pub(super) fn purge_table(&mut self) {
        let now = self.clock.now();
        let removed = self.table.purge(now);
        if !removed.is_empty() {
            trace!(removed = removed.len(), "Routing table purged");
        }
        self.queue.purge(now);
    }
}
