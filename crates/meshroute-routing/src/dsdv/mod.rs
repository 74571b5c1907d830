//! Periodic table-driven routing (DSDV)
//!
//! [`DsdvEngine`] keeps a route to every reachable destination at all times.
//! Each node advertises its whole table on a periodic timer and pushes
//! triggered updates for changes in between. Sequence numbers originate at
//! the destination and are even while it is reachable; an odd sequence
//! number advertises a broken route.
//!
//! Changes are staged in a separate advertisement table. A change in hop
//! count is held back for a settling time before it is advertised, which
//! damps route flapping, while the forwarding table already uses it.

mod update;

pub use update::weighted_settling_time;

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, trace};

use meshroute_core::{
    Clock, DataPacket, DropReason, InterfaceInfo, NodeAddr, TimerHandle, Transport, TransportError,
};

use crate::config::DsdvConfig;
use crate::dup::DuplicateCache;
use crate::error::{RoutingError, RoutingResult};
use crate::forward::{
    ErrorCallback, ForwardCallback, InputDecision, LocalDeliverCallback, OutputDecision, Route,
    RouteListener,
};
use crate::queue::{PacketQueue, QueueEntry};
use crate::table::{RoutingTable, RoutingTableEntry};
use crate::timer::{Timer, TimerSet};

/// Upper bound of the random delay before a triggered update
const TRIGGER_JITTER_MICROS: u64 = 1000;

/// Periodic routing engine
pub struct DsdvEngine<C, X> {
    config: DsdvConfig,
    clock: C,
    transport: X,
    interfaces: Vec<InterfaceInfo>,
    started: bool,
    /// Forwarding table; holds the hop-0 self entry
    table: RoutingTable,
    /// Changes waiting to be advertised
    advertised: RoutingTable,
    queue: PacketQueue,
    data_ids: DuplicateCache,
    timers: TimerSet,
    listener: Option<Box<dyn RouteListener>>,
}

impl<C, X> DsdvEngine<C, X>
where
    C: Clock<Timer>,
    X: Transport,
{
    /// Create an engine over the given collaborators
    pub fn new(config: DsdvConfig, clock: C, transport: X) -> RoutingResult<Self> {
        config.validate()?;
        Ok(Self {
            table: RoutingTable::without_hold_down(),
            advertised: RoutingTable::without_hold_down(),
            queue: PacketQueue::new(
                config.max_queue_len,
                config.max_queued_per_dst,
                config.max_queue_time,
            ),
            data_ids: DuplicateCache::new(config.holddown_time()),
            timers: TimerSet::new(),
            interfaces: Vec::new(),
            started: false,
            listener: None,
            config,
            clock,
            transport,
        })
    }

    /// Install the self entries and arm the periodic update
    #[instrument(skip_all)]
    pub fn start(&mut self) -> RoutingResult<()> {
        if self.started {
            return Ok(());
        }
        self.interfaces = self.transport.interfaces();
        if self.interfaces.is_empty() {
            return Err(RoutingError::NoInterfaces);
        }
        self.started = true;

        let now = self.clock.now();
        for iface in self.interfaces.clone() {
            self.table.add_route(
                RoutingTableEntry::new(iface.local, iface.local, iface)
                    .with_seq_no(0, true)
                    .with_hop_count(0)
                    .with_lifetime(Duration::MAX, now),
            );
        }
        let jitter = Duration::from_micros(rand::rng().random_range(0..TRIGGER_JITTER_MICROS));
        self.timers.schedule(&self.clock, jitter, Timer::PeriodicUpdate);

        debug!(node = %self.local_address(), interfaces = self.interfaces.len(), "DSDV started");
        Ok(())
    }

    /// Cancel every timer and drop all state
    pub fn stop(&mut self) {
        self.timers.cancel_all(&self.clock);
        for entry in self.queue.drain() {
            (entry.error)(entry.packet, DropReason::EngineStopped);
        }
        self.table.clear();
        self.advertised.clear();
        self.started = false;
        debug!(node = %self.local_address(), "DSDV stopped");
    }

    /// Register the upper-layer route observer
    pub fn set_listener(&mut self, listener: Box<dyn RouteListener>) {
        self.listener = Some(listener);
    }

    /// Main address (the first interface's)
    pub fn local_address(&self) -> NodeAddr {
        self.interfaces
            .first()
            .map(|iface| iface.local)
            .unwrap_or(NodeAddr::UNSPECIFIED)
    }

    /// The forwarding table
    pub fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    /// The changes not yet advertised
    pub fn pending_advertisements(&self) -> &RoutingTable {
        &self.advertised
    }

    /// Number of buffered packets
    pub fn queued_packets(&self) -> usize {
        self.queue.len()
    }

    /// The configuration in use
    pub fn config(&self) -> &DsdvConfig {
        &self.config
    }

    /// Check if `start` has run
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Destinations one hop away
    pub fn neighbors(&self) -> Vec<NodeAddr> {
        let now = self.clock.now();
        self.table
            .iter()
            .filter(|e| e.hop_count == 1 && e.is_usable(now))
            .map(|e| e.destination)
            .collect()
    }

    /// Route a locally originated packet
    #[instrument(skip_all, fields(node = %self.local_address(), dst = %packet.destination()))]
    pub fn route_output(
        &mut self,
        packet: DataPacket,
        forward: ForwardCallback,
        error: ErrorCallback,
    ) -> RoutingResult<OutputDecision> {
        if !self.started {
            return Err(RoutingError::NotStarted);
        }
        let now = self.clock.now();
        let dst = packet.destination();

        let removed = self.purge_with_cascade();
        if !removed.is_empty() {
            for mut entry in removed {
                entry.seq_no = entry.seq_no.wrapping_add(1);
                entry.changed = true;
                self.advertised.delete_route(entry.destination);
                self.advertised.add_route(entry);
            }
            self.schedule_triggered_update(self.trigger_jitter());
        }

        if let Some(iface) = self.broadcast_interface(dst) {
            let route = Route {
                destination: dst,
                source: iface.local,
                gateway: NodeAddr::BROADCAST,
                interface: iface.index,
            };
            self.data_ids.check(packet.source(), packet.header.id, now);
            forward(route, packet);
            return Ok(OutputDecision::Forwarded(route));
        }

        if let Some(route) = self.resolve_route(dst) {
            if self.config.enable_buffering {
                self.look_for_queued_packets();
            }
            trace!(route = %route, "Route found");
            forward(route, packet);
            return Ok(OutputDecision::Forwarded(route));
        }

        if !self.config.enable_buffering {
            debug!("No route, buffering disabled");
            error(packet, DropReason::NoRoute);
            return Ok(OutputDecision::Dropped(DropReason::NoRoute));
        }
        match self.queue.enqueue(QueueEntry::new(packet, forward, error), now) {
            Ok(()) => {
                trace!(queued = self.queue.len(), "No route yet, packet buffered");
                Ok(OutputDecision::Queued)
            }
            Err(rejected) => {
                debug!(queued = self.queue.len(), "Queue full, dropping packet");
                (rejected.error)(rejected.packet, DropReason::QueueFull);
                Ok(OutputDecision::Dropped(DropReason::QueueFull))
            }
        }
    }

    /// Route a data packet received from neighbor `from` on `interface`
    #[instrument(skip_all, fields(node = %self.local_address(), packet = %packet))]
    pub fn route_input(
        &mut self,
        mut packet: DataPacket,
        interface: u32,
        from: NodeAddr,
        forward: ForwardCallback,
        deliver: LocalDeliverCallback,
        error: ErrorCallback,
    ) -> RoutingResult<InputDecision> {
        if !self.started {
            return Err(RoutingError::NotStarted);
        }
        let iface = self.interface(interface)?;
        let now = self.clock.now();
        let origin = packet.source();
        let dst = packet.destination();

        if self.is_my_own_address(origin) {
            trace!(from = %from, "Own packet looped back, dropping");
            return Ok(InputDecision::Dropped(DropReason::Duplicate));
        }

        if iface.is_broadcast_for(dst) {
            if self.data_ids.check(origin, packet.header.id, now) {
                trace!("Duplicate broadcast, dropping");
                return Ok(InputDecision::Dropped(DropReason::Duplicate));
            }
            deliver(packet.clone(), iface.index);
            if packet.header.ttl <= 1 {
                return Ok(InputDecision::Delivered { rebroadcast: false });
            }
            packet.header.ttl -= 1;
            let route = Route {
                destination: dst,
                source: iface.local,
                gateway: NodeAddr::BROADCAST,
                interface: iface.index,
            };
            self.data_ids.mark_forwarded(origin, packet.header.id, iface.index);
            forward(route, packet);
            return Ok(InputDecision::Delivered { rebroadcast: true });
        }

        if self.is_my_own_address(dst) {
            deliver(packet, interface);
            return Ok(InputDecision::Delivered { rebroadcast: false });
        }

        let Some(route) = self.resolve_route(dst) else {
            debug!("No route to forward");
            error(packet, DropReason::NoRoute);
            return Ok(InputDecision::Dropped(DropReason::NoRoute));
        };
        if packet.header.ttl <= 1 {
            debug!("TTL expired");
            error(packet, DropReason::TtlExpired);
            return Ok(InputDecision::Dropped(DropReason::TtlExpired));
        }
        packet.header.ttl -= 1;
        trace!(route = %route, "Forwarding");
        forward(route, packet);
        Ok(InputDecision::Forwarded(route))
    }

    /// Dispatch a fired timer
    #[instrument(skip_all, fields(node = %self.local_address(), timer = ?timer))]
    pub fn handle_timer(&mut self, handle: TimerHandle, timer: Timer) -> RoutingResult<()> {
        if !self.timers.fired(timer, handle) {
            trace!("Stale timer, ignoring");
            return Ok(());
        }
        match timer {
            Timer::PeriodicUpdate => self.send_periodic_update(),
            Timer::TriggeredUpdate | Timer::SettlingExpired(_) => self.send_triggered_update(),
            other => {
                debug!(timer = ?other, "Reactive-protocol timer ignored by periodic engine");
                Ok(())
            }
        }
    }

    /// Link-layer report that a unicast to `neighbor` failed
    ///
    /// Every route through the neighbor is withdrawn and advertised with
    /// an odd sequence number.
    #[instrument(skip_all, fields(node = %self.local_address(), neighbor = %neighbor))]
    pub fn notify_tx_error(&mut self, neighbor: NodeAddr) -> RoutingResult<()> {
        if !self.started {
            return Err(RoutingError::NotStarted);
        }
        let now = self.clock.now();
        let broken = self
            .table
            .invalidate_routes_with_next_hop(neighbor, Duration::ZERO, now);
        if broken.is_empty() {
            return Ok(());
        }
        debug!(routes = broken.len(), "Link lost, withdrawing routes");
        for dst in broken.keys() {
            if let Some(mut entry) = self.table.lookup_route(*dst).cloned() {
                self.table.delete_route(*dst);
                self.timers.cancel(&self.clock, Timer::SettlingExpired(*dst));
                entry.changed = true;
                self.advertised.delete_route(*dst);
                self.advertised.add_route(entry);
            }
        }
        self.schedule_triggered_update(self.trigger_jitter());
        Ok(())
    }

    /// Remove expired routes and every route whose next hop went with them
    fn purge_with_cascade(&mut self) -> Vec<RoutingTableEntry> {
        let now = self.clock.now();
        let mut removed = self.table.purge(now);
        let mut index = 0;
        while index < removed.len() {
            let gone = removed[index].destination;
            let dependents: Vec<NodeAddr> = self
                .table
                .entries_with_next_hop(gone)
                .into_iter()
                .filter(|e| e.hop_count > 0)
                .map(|e| e.destination)
                .collect();
            for dst in dependents {
                if let Some(entry) = self.table.lookup_route(dst).cloned() {
                    self.table.delete_route(dst);
                    removed.push(entry);
                }
            }
            index += 1;
        }
        if !removed.is_empty() {
            debug!(removed = removed.len(), "Stale routes purged");
        }
        removed
    }

    /// Resolve `dst` to a forwarding decision through its next hop's entry
    fn resolve_route(&self, dst: NodeAddr) -> Option<Route> {
        let now = self.clock.now();
        let entry = self.table.lookup_valid_route(dst, now)?;
        if entry.hop_count <= 1 {
            return Some(entry.route());
        }
        let via = self.table.lookup_valid_route(entry.next_hop, now)?;
        Some(Route {
            destination: dst,
            source: via.interface.local,
            gateway: via.next_hop,
            interface: via.interface.index,
        })
    }

    /// Send every buffered packet that now has a route
    fn look_for_queued_packets(&mut self) {
        let now = self.clock.now();
        for dst in self.queue.destinations() {
            let Some(route) = self.resolve_route(dst) else {
                continue;
            };
            let entries = self.queue.dequeue_all(dst, now);
            if !entries.is_empty() {
                debug!(destination = %dst, count = entries.len(), "Flushing queued packets");
            }
            for entry in entries {
                (entry.forward)(route, entry.packet);
            }
        }
    }

    fn notify_route_available(&mut self, dst: NodeAddr) {
        let Some(route) = self.resolve_route(dst) else {
            return;
        };
        if let Some(listener) = self.listener.as_mut() {
            listener.on_route_available(dst, &route);
        }
    }

    fn schedule_triggered_update(&mut self, delay: Duration) {
        if self
            .timers
            .schedule_if_idle(&self.clock, delay, Timer::TriggeredUpdate)
        {
            trace!(delay = ?delay, "Triggered update scheduled");
        }
    }

    fn trigger_jitter(&self) -> Duration {
        Duration::from_micros(rand::rng().random_range(0..TRIGGER_JITTER_MICROS))
    }

    fn interface(&self, index: u32) -> RoutingResult<InterfaceInfo> {
        self.interfaces
            .iter()
            .find(|iface| iface.index == index)
            .copied()
            .ok_or_else(|| TransportError::UnknownInterface(index).into())
    }

    fn broadcast_interface(&self, dst: NodeAddr) -> Option<InterfaceInfo> {
        if dst.is_broadcast() {
            return self.interfaces.first().copied();
        }
        self.interfaces
            .iter()
            .find(|iface| iface.broadcast == dst)
            .copied()
    }

    fn is_my_own_address(&self, addr: NodeAddr) -> bool {
        self.interfaces.iter().any(|iface| iface.local == addr)
    }
}
