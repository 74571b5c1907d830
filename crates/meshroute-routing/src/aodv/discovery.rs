//! Route discovery
//!
//! Originating, relaying and answering route requests, installing routes
//! from replies, hello beacons and reply acknowledgements.

use std::time::Duration;

use tracing::{debug, trace};

use meshroute_core::{Clock, DropReason, InterfaceInfo, NodeAddr, Transport};

use super::{AodvEngine, hop_u8};
use crate::error::RoutingResult;
use crate::messages::{ControlMessage, RouteReply, RouteRequest};
use crate::seqno::{seq_diff, seq_newer};
use crate::table::{RouteFlag, RoutingTableEntry};
use crate::timer::Timer;

/// Extra delay past the rate window before a deferred request goes out
const DEFERRED_RREQ_SLACK: Duration = Duration::from_micros(100);

/// Decide whether an advertised `(seq_no, hop_count)` replaces `existing`
///
/// The advertisement wins when the stored sequence number is not
/// authoritative, when it is strictly fresher, when it is equally fresh and
/// the stored route is not usable, or when it is equally fresh and shorter.
pub fn admits(existing: &RoutingTableEntry, seq_no: u32, hop_count: u16) -> bool {
    !existing.valid_seq_no
        || seq_newer(seq_no, existing.seq_no)
        || (seq_no == existing.seq_no && existing.flag != RouteFlag::Valid)
        || (seq_no == existing.seq_no && hop_count < existing.hop_count)
}

fn millis_u32(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

impl<C, X> AodvEngine<C, X>
where
    C: Clock<Timer>,
    X: Transport,
{
    /// Flood a route request for `dst`
    pub(super) fn send_request(&mut self, dst: NodeAddr) -> RoutingResult<()> {
        let now = self.clock.now();
        if self.rreq_count >= self.config.rreq_rate_limit {
            let delay = now.until(self.rate_window_end) + DEFERRED_RREQ_SLACK;
            debug!(destination = %dst, delay = ?delay, "RREQ rate limit reached, deferring");
            self.timers
                .schedule_if_idle(&self.clock, delay, Timer::DeferredRreq(dst));
            return Ok(());
        }
        self.rreq_count += 1;

        let diameter = self.config.net_diameter;
        let ers = self.config.expanding_ring_search;
        let mut ttl = if ers { self.config.ttl_start } else { diameter };
        let mut unknown_seq_no = true;
        let mut dest_seq_no = 0;
        let path_discovery = self.config.path_discovery_time();

        match self.table.lookup_route_mut(dst) {
            Some(entry) => {
                if ers {
                    let grown = hop_u8(entry.hop_count).saturating_add(self.config.ttl_increment);
                    ttl = if entry.flag != RouteFlag::InSearch {
                        grown.min(diameter)
                    } else if grown > self.config.ttl_threshold {
                        diameter
                    } else {
                        grown
                    };
                }
                if ttl == diameter {
                    entry.rreq_count = entry.rreq_count.saturating_add(1);
                }
                if entry.valid_seq_no {
                    dest_seq_no = entry.seq_no;
                    unknown_seq_no = false;
                }
                entry.hop_count = u16::from(ttl);
                entry.flag = RouteFlag::InSearch;
                entry.set_lifetime(path_discovery, now);
            }
            None => {
                let mut entry =
                    RoutingTableEntry::new(dst, NodeAddr::UNSPECIFIED, self.default_interface())
                        .with_hop_count(u16::from(ttl))
                        .with_flag(RouteFlag::InSearch)
                        .with_lifetime(path_discovery, now);
                if ttl == diameter {
                    entry.rreq_count = 1;
                }
                self.table.add_route(entry);
            }
        }

        self.seq_no = self.seq_no.wrapping_add(1);
        self.request_id = self.request_id.wrapping_add(1);
        let id = self.request_id;

        for iface in self.interfaces.clone() {
            let rreq = RouteRequest {
                gratuitous_reply: self.config.gratuitous_reply,
                destination_only: self.config.destination_only,
                unknown_seq_no,
                hop_count: 0,
                id,
                destination: dst,
                dest_seq_no,
                origin: iface.local,
                origin_seq_no: self.seq_no,
                ttl,
            };
            self.rreq_ids.record(iface.local, id, now);
            self.send_control(iface, None, &ControlMessage::Rreq(rreq))?;
        }
        debug!(destination = %dst, id, ttl, "RREQ sent");

        self.schedule_rreq_retry(dst);
        Ok(())
    }

    fn schedule_rreq_retry(&mut self, dst: NodeAddr) {
        let Some(entry) = self.table.lookup_route(dst) else {
            return;
        };
        let retry = if entry.hop_count < u16::from(self.config.net_diameter) {
            self.config.ring_traversal_time(hop_u8(entry.hop_count))
        } else {
            let backoff = u32::from(entry.rreq_count.saturating_sub(1)).min(16);
            self.config.net_traversal_time() * (1u32 << backoff)
        };
        trace!(destination = %dst, retry = ?retry, "RREQ retry scheduled");
        self.timers
            .schedule(&self.clock, retry, Timer::RreqRetry(dst));
    }

    /// No reply arrived in time for `dst`
    pub(super) fn route_request_timer_expire(&mut self, dst: NodeAddr) -> RoutingResult<()> {
        let now = self.clock.now();
        if self.table.lookup_valid_route(dst, now).is_some() {
            self.send_packet_from_queue(dst);
            self.notify_route_available(dst);
            return Ok(());
        }

        let (attempts, searching) = self
            .table
            .lookup_route(dst)
            .map(|e| (e.rreq_count, e.flag == RouteFlag::InSearch))
            .unwrap_or((0, false));

        if attempts >= self.config.rreq_retries || !searching {
            let dropped = self.queue.drop_packet_with_dst(dst);
            debug!(destination = %dst, attempts, dropped, "Route discovery failed");
            self.table.delete_route(dst);
            self.timers.cancel(&self.clock, Timer::DeferredRreq(dst));
            if let Some(listener) = self.listener.as_mut() {
                listener.on_route_unreachable(dst, DropReason::RetriesExhausted);
            }
            return Ok(());
        }

        self.send_request(dst)
    }

    pub(super) fn recv_request(
        &mut self,
        mut rreq: RouteRequest,
        iface: InterfaceInfo,
        src: NodeAddr,
    ) -> RoutingResult<()> {
        let now = self.clock.now();
        if self
            .table
            .lookup_route(src)
            .is_some_and(|e| e.is_unidirectional(now))
        {
            debug!(neighbor = %src, "Ignoring RREQ from blacklisted neighbor");
            return Ok(());
        }
        let origin = rreq.origin;
        if self.rreq_ids.is_duplicate(origin, rreq.id, now) {
            trace!(origin = %origin, id = rreq.id, "Duplicate RREQ, dropping");
            return Ok(());
        }

        rreq.hop_count = rreq.hop_count.saturating_add(1);
        let hop = u16::from(rreq.hop_count);

        // Reverse route must outlive the reply's trip back
        let min_lifetime = (self.config.net_traversal_time() * 2)
            .saturating_sub(self.config.node_traversal_time * 2 * u32::from(hop));
        match self.table.lookup_route_mut(origin) {
            Some(entry) => {
                if !entry.valid_seq_no || seq_newer(rreq.origin_seq_no, entry.seq_no) {
                    entry.seq_no = rreq.origin_seq_no;
                }
                entry.valid_seq_no = true;
                entry.next_hop = src;
                entry.interface = iface;
                entry.hop_count = hop;
                entry.flag = RouteFlag::Valid;
                entry.updated_at = now;
                let lifetime = min_lifetime.max(entry.remaining_lifetime(now));
                entry.set_lifetime(lifetime, now);
            }
            None => {
                self.table.add_route(
                    RoutingTableEntry::new(origin, src, iface)
                        .with_seq_no(rreq.origin_seq_no, true)
                        .with_hop_count(hop)
                        .with_lifetime(min_lifetime, now),
                );
            }
        }

        if self.is_my_own_address(rreq.destination) {
            debug!(origin = %origin, "RREQ for us, replying");
            return self.send_reply(&rreq);
        }

        if let Some(to_dst) = self.table.lookup_route(rreq.destination).cloned() {
            if to_dst.next_hop == src {
                debug!(destination = %to_dst.destination, "Dropping RREQ, reply would loop back");
                return Ok(());
            }
            let fresh_enough =
                rreq.unknown_seq_no || seq_diff(to_dst.seq_no, rreq.dest_seq_no) >= 0;
            if fresh_enough && to_dst.valid_seq_no {
                if !rreq.destination_only && to_dst.is_usable(now) {
                    return self.send_reply_by_intermediate_node(
                        to_dst.destination,
                        origin,
                        rreq.gratuitous_reply,
                    );
                }
                rreq.dest_seq_no = to_dst.seq_no;
                rreq.unknown_seq_no = false;
            }
        }

        if rreq.ttl < 2 {
            trace!(origin = %origin, "RREQ TTL exhausted");
            return Ok(());
        }
        rreq.ttl -= 1;
        trace!(origin = %origin, hop = rreq.hop_count, ttl = rreq.ttl, "Rebroadcasting RREQ");
        self.broadcast_control(&ControlMessage::Rreq(rreq))
    }

    /// Answer a request addressed to this node
    fn send_reply(&mut self, rreq: &RouteRequest) -> RoutingResult<()> {
        let base = if !rreq.unknown_seq_no && seq_newer(rreq.dest_seq_no, self.seq_no) {
            rreq.dest_seq_no
        } else {
            self.seq_no
        };
        self.seq_no = base.wrapping_add(1);

        let Some(to_origin) = self.table.lookup_route(rreq.origin).cloned() else {
            return Ok(());
        };
        let rrep = RouteReply {
            prefix_size: 0,
            hop_count: 0,
            destination: rreq.destination,
            dest_seq_no: self.seq_no,
            origin: rreq.origin,
            lifetime_ms: millis_u32(self.config.my_route_timeout()),
            ack_required: false,
            ttl: hop_u8(to_origin.hop_count),
        };
        self.send_control(
            to_origin.interface,
            Some(to_origin.next_hop),
            &ControlMessage::Rrep(rrep),
        )
    }

    /// Answer a request from a cached route
    fn send_reply_by_intermediate_node(
        &mut self,
        dst: NodeAddr,
        origin: NodeAddr,
        gratuitous: bool,
    ) -> RoutingResult<()> {
        let now = self.clock.now();
        let (Some(to_dst), Some(to_origin)) = (
            self.table.lookup_route(dst).cloned(),
            self.table.lookup_route(origin).cloned(),
        ) else {
            return Ok(());
        };

        let mut rrep = RouteReply {
            prefix_size: 0,
            hop_count: hop_u8(to_dst.hop_count),
            destination: dst,
            dest_seq_no: to_dst.seq_no,
            origin,
            lifetime_ms: millis_u32(to_dst.remaining_lifetime(now)),
            ack_required: false,
            ttl: hop_u8(to_origin.hop_count),
        };

        // A one-hop destination may sit behind a unidirectional link
        if to_dst.hop_count == 1 && self.config.enable_rrep_ack {
            rrep.ack_required = true;
            self.timers.schedule(
                &self.clock,
                self.config.next_hop_wait(),
                Timer::AckTimeout(to_origin.next_hop),
            );
        }

        if let Some(entry) = self.table.lookup_route_mut(dst) {
            entry.insert_precursor(to_origin.next_hop);
        }
        if let Some(entry) = self.table.lookup_route_mut(origin) {
            entry.insert_precursor(to_dst.next_hop);
        }

        debug!(destination = %dst, origin = %origin, "Replying from cached route");
        self.send_control(
            to_origin.interface,
            Some(to_origin.next_hop),
            &ControlMessage::Rrep(rrep),
        )?;

        if gratuitous {
            let gratuitous_rrep = RouteReply {
                prefix_size: 0,
                hop_count: hop_u8(to_origin.hop_count),
                destination: origin,
                dest_seq_no: to_origin.seq_no,
                origin: dst,
                lifetime_ms: millis_u32(to_origin.remaining_lifetime(now)),
                ack_required: false,
                ttl: hop_u8(to_dst.hop_count),
            };
            self.send_control(
                to_dst.interface,
                Some(to_dst.next_hop),
                &ControlMessage::Rrep(gratuitous_rrep),
            )?;
        }
        Ok(())
    }

    pub(super) fn recv_reply(
        &mut self,
        mut rrep: RouteReply,
        iface: InterfaceInfo,
        sender: NodeAddr,
    ) -> RoutingResult<()> {
        if rrep.is_hello() {
            self.process_hello(&rrep, iface);
            return Ok(());
        }
        let now = self.clock.now();
        let dst = rrep.destination;
        rrep.hop_count = rrep.hop_count.saturating_add(1);
        let hop = u16::from(rrep.hop_count);

        let fresh = RoutingTableEntry::new(dst, sender, iface)
            .with_seq_no(rrep.dest_seq_no, true)
            .with_hop_count(hop)
            .with_lifetime(Duration::from_millis(u64::from(rrep.lifetime_ms)), now);

        let admitted = match self.table.lookup_route_mut(dst) {
            Some(existing) => {
                let admitted = admits(existing, rrep.dest_seq_no, hop);
                if admitted {
                    existing.replace_route(&fresh);
                }
                admitted
            }
            None => self.table.add_route(fresh),
        };
        if admitted {
            trace!(destination = %dst, next_hop = %sender, hop, seq = rrep.dest_seq_no, "Route installed");
        } else {
            trace!(destination = %dst, seq = rrep.dest_seq_no, hop, "Stale RREP, route kept");
        }

        if rrep.ack_required {
            self.send_reply_ack(sender)?;
            rrep.ack_required = false;
        }

        if self.is_my_own_address(rrep.origin) {
            if self.table.lookup_valid_route(dst, now).is_none() {
                debug!(destination = %dst, seq = rrep.dest_seq_no, "Reply left no usable route, discovery continues");
                return Ok(());
            }
            let was_retrying = self.timers.cancel(&self.clock, Timer::RreqRetry(dst));
            let was_deferred = self.timers.cancel(&self.clock, Timer::DeferredRreq(dst));
            self.send_packet_from_queue(dst);
            if admitted && (was_retrying || was_deferred) {
                self.notify_route_available(dst);
            }
            return Ok(());
        }

        let Some(to_origin) = self
            .table
            .lookup_route(rrep.origin)
            .filter(|e| e.flag != RouteFlag::InSearch)
            .cloned()
        else {
            debug!(origin = %rrep.origin, "No reverse route for RREP, dropping");
            return Ok(());
        };
        if let Some(entry) = self.table.lookup_route_mut(rrep.origin) {
            entry.extend_lifetime(self.config.active_route_timeout, now);
        }

        if let Some(to_dst) = self.table.lookup_valid_route(dst, now).cloned() {
            for (route_to, precursor) in [
                (dst, to_origin.next_hop),
                (to_dst.next_hop, to_origin.next_hop),
                (rrep.origin, to_dst.next_hop),
                (to_origin.next_hop, to_dst.next_hop),
            ] {
                if let Some(entry) = self.table.lookup_route_mut(route_to) {
                    entry.insert_precursor(precursor);
                }
            }
        }

        if rrep.ttl < 2 {
            trace!(destination = %dst, "RREP TTL exhausted");
            return Ok(());
        }
        rrep.ttl -= 1;
        self.send_control(
            to_origin.interface,
            Some(to_origin.next_hop),
            &ControlMessage::Rrep(rrep),
        )
    }

    pub(super) fn recv_reply_ack(&mut self, neighbor: NodeAddr) {
        if self.timers.cancel(&self.clock, Timer::AckTimeout(neighbor)) {
            trace!(neighbor = %neighbor, "RREP-ACK received");
        }
    }

    fn send_reply_ack(&mut self, neighbor: NodeAddr) -> RoutingResult<()> {
        let iface = self
            .table
            .lookup_route(neighbor)
            .map(|e| e.interface)
            .unwrap_or_else(|| self.default_interface());
        self.send_control(iface, Some(neighbor), &ControlMessage::RrepAck)
    }

    pub(super) fn ack_timer_expire(&mut self, neighbor: NodeAddr) {
        let now = self.clock.now();
        let timeout = self.config.blacklist_timeout();
        if self.table.mark_link_unidirectional(neighbor, timeout, now) {
            debug!(neighbor = %neighbor, timeout = ?timeout, "No RREP-ACK, link blacklisted");
        }
    }

    /// Hello tick; skipped when a broadcast already went out this interval
    pub(super) fn hello_timer_expire(&mut self) -> RoutingResult<()> {
        let now = self.clock.now();
        let offset = match self.last_bcast_time {
            Some(last) => now.saturating_since(last),
            None => {
                self.send_hello()?;
                Duration::ZERO
            }
        };
        let next = self.config.hello_interval.saturating_sub(offset);
        self.timers.schedule(&self.clock, next, Timer::Hello);
        self.last_bcast_time = None;
        Ok(())
    }

    fn send_hello(&mut self) -> RoutingResult<()> {
        let lifetime_ms = millis_u32(self.config.hello_lifetime());
        for iface in self.interfaces.clone() {
            let hello = RouteReply {
                prefix_size: 0,
                hop_count: 0,
                destination: iface.local,
                dest_seq_no: self.seq_no,
                origin: iface.local,
                lifetime_ms,
                ack_required: false,
                ttl: 1,
            };
            self.send_control(iface, None, &ControlMessage::Rrep(hello))?;
        }
        Ok(())
    }

    fn process_hello(&mut self, hello: &RouteReply, iface: InterfaceInfo) {
        let now = self.clock.now();
        let neighbor = hello.destination;
        let hello_lifetime = self.config.hello_lifetime();

        match self.table.lookup_route_mut(neighbor) {
            Some(entry) => {
                let lifetime = hello_lifetime.max(entry.remaining_lifetime(now));
                entry.set_lifetime(lifetime, now);
                if !entry.valid_seq_no || seq_newer(hello.dest_seq_no, entry.seq_no) {
                    entry.seq_no = hello.dest_seq_no;
                }
                entry.valid_seq_no = true;
                entry.flag = RouteFlag::Valid;
                entry.interface = iface;
                entry.hop_count = 1;
                entry.next_hop = neighbor;
                entry.updated_at = now;
            }
            None => {
                self.table.add_route(
                    RoutingTableEntry::new(neighbor, neighbor, iface)
                        .with_seq_no(hello.dest_seq_no, true)
                        .with_hop_count(1)
                        .with_lifetime(Duration::from_millis(u64::from(hello.lifetime_ms)), now),
                );
            }
        }
        if self.config.enable_hello {
            self.neighbors.update(neighbor, now + hello_lifetime);
        }
        trace!(neighbor = %neighbor, "Hello processed");
    }
}
