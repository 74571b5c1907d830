//! Reactive on-demand routing (AODV)
//!
//! [`AodvEngine`] finds routes only when traffic needs them. A packet with
//! no route is buffered and a route request is flooded; the destination (or
//! a node with a fresh enough route) answers with a route reply that builds
//! the forward path hop by hop on its way back. Broken links are reported
//! upstream with route errors addressed to the precursors of each affected
//! route.
//!
//! The engine is a single-writer state machine. Every entry point runs to
//! completion; anything that has to wait is expressed as a [`Timer`]
//! scheduled on the injected [`Clock`] and re-validated when it fires.
//!
//! - [`discovery`]: route request / reply handling, hellos, RREP-ACK
//! - [`maintenance`]: link failures, route errors, periodic sweeps

mod discovery;
mod maintenance;

pub use discovery::admits;

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, trace};

use meshroute_core::{
    Clock, DataPacket, DropReason, InterfaceInfo, NodeAddr, TimerHandle, Transport, TransportError,
    VirtualTime,
};

use crate::config::AodvConfig;
use crate::dup::{BroadcastIdCache, DuplicateCache};
use crate::error::{RoutingError, RoutingResult};
use crate::forward::{
    ErrorCallback, ForwardCallback, InputDecision, LocalDeliverCallback, OutputDecision, Route,
    RouteListener,
};
use crate::messages::ControlMessage;
use crate::neighbor::NeighborTable;
use crate::queue::{PacketQueue, QueueEntry};
use crate::table::{RouteFlag, RoutingTable};
use crate::timer::{Timer, TimerSet};

/// Length of one rate-limiting window
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Reactive routing engine
pub struct AodvEngine<C, X> {
    config: AodvConfig,
    clock: C,
    transport: X,
    interfaces: Vec<InterfaceInfo>,
    started: bool,
    /// This node's own sequence number
    seq_no: u32,
    /// Last route request id used
    request_id: u32,
    table: RoutingTable,
    queue: PacketQueue,
    neighbors: NeighborTable,
    rreq_ids: BroadcastIdCache,
    data_ids: DuplicateCache,
    timers: TimerSet,
    rreq_count: u16,
    rerr_count: u16,
    rate_window_end: VirtualTime,
    /// Time of the last broadcast, cleared by every hello tick
    last_bcast_time: Option<VirtualTime>,
    listener: Option<Box<dyn RouteListener>>,
}

impl<C, X> AodvEngine<C, X>
where
    C: Clock<Timer>,
    X: Transport,
{
    /// Create an engine over the given collaborators
    ///
    /// Nothing is sent or scheduled until [`start`](Self::start).
    pub fn new(config: AodvConfig, clock: C, transport: X) -> RoutingResult<Self> {
        config.validate()?;
        Ok(Self {
            table: RoutingTable::with_hold_down(config.delete_period()),
            queue: PacketQueue::new(
                config.max_queue_len,
                config.max_queued_per_dst,
                config.max_queue_time,
            ),
            neighbors: NeighborTable::new(),
            rreq_ids: BroadcastIdCache::new(config.path_discovery_time()),
            data_ids: DuplicateCache::new(config.path_discovery_time()),
            timers: TimerSet::new(),
            interfaces: Vec::new(),
            started: false,
            seq_no: 0,
            request_id: 0,
            rreq_count: 0,
            rerr_count: 0,
            rate_window_end: VirtualTime::ZERO,
            last_bcast_time: None,
            listener: None,
            config,
            clock,
            transport,
        })
    }

    /// Bind to the transport's interfaces and arm the periodic timers
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
        self.rate_window_end = now + RATE_WINDOW;
        self.timers.schedule(&self.clock, RATE_WINDOW, Timer::RreqRateReset);
        self.timers.schedule(&self.clock, RATE_WINDOW, Timer::RerrRateReset);
        self.timers
            .schedule(&self.clock, self.config.purge_interval, Timer::TablePurge);
        self.timers.schedule(
            &self.clock,
            self.config.path_discovery_time(),
            Timer::IdCachePurge,
        );
        if self.config.enable_hello {
            let jitter = Duration::from_millis(rand::rng().random_range(0..100));
            self.timers.schedule(&self.clock, jitter, Timer::Hello);
            self.timers
                .schedule(&self.clock, self.config.hello_interval, Timer::NeighborPurge);
        }

        debug!(node = %self.local_address(), interfaces = self.interfaces.len(), "AODV started");
        Ok(())
    }

    /// Cancel every timer and drop all state
    ///
    /// Buffered packets are reported through their error callbacks.
    pub fn stop(&mut self) {
        self.timers.cancel_all(&self.clock);
        for entry in self.queue.drain() {
            (entry.error)(entry.packet, DropReason::EngineStopped);
        }
        self.table.clear();
        self.neighbors.clear();
        self.started = false;
        debug!(node = %self.local_address(), "AODV stopped");
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

    /// The routing table
    pub fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    /// The neighbor table
    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Number of buffered packets
    pub fn queued_packets(&self) -> usize {
        self.queue.len()
    }

    /// This node's sequence number
    pub fn seq_no(&self) -> u32 {
        self.seq_no
    }

    /// The configuration in use
    pub fn config(&self) -> &AodvConfig {
        &self.config
    }

    /// Check if `start` has run
    pub fn is_started(&self) -> bool {
        self.started
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

        if let Some(iface) = self.broadcast_interface(dst) {
            let route = Route {
                destination: dst,
                source: iface.local,
                gateway: NodeAddr::BROADCAST,
                interface: iface.index,
            };
            self.data_ids.check(packet.source(), packet.header.id, now);
            self.last_bcast_time = Some(now);
            forward(route, packet);
            return Ok(OutputDecision::Forwarded(route));
        }

        if let Some(entry) = self.table.lookup_valid_route(dst, now) {
            let route = entry.route();
            let active = self.config.active_route_timeout;
            self.table.update_route_lifetime(dst, active, now);
            self.table.update_route_lifetime(route.gateway, active, now);
            trace!(route = %route, "Route found");
            forward(route, packet);
            return Ok(OutputDecision::Forwarded(route));
        }

        match self.queue.enqueue(QueueEntry::new(packet, forward, error), now) {
            Ok(()) => {
                let searching = self
                    .table
                    .lookup_route(dst)
                    .is_some_and(|e| e.flag == RouteFlag::InSearch);
                if !searching && !self.timers.is_pending(Timer::RreqRetry(dst)) {
                    self.send_request(dst)?;
                }
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
        packet: DataPacket,
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
            trace!("Own packet looped back, dropping");
            return Ok(InputDecision::Dropped(DropReason::Duplicate));
        }
        self.neighbors.update(from, now + self.config.hello_lifetime());

        if iface.is_broadcast_for(dst) {
            return Ok(self.receive_broadcast(packet, iface, forward, deliver));
        }

        if self.is_my_own_address(dst) {
            let active = self.config.active_route_timeout;
            self.table.update_route_lifetime(origin, active, now);
            if let Some(next_hop) = self
                .table
                .lookup_valid_route(origin, now)
                .map(|e| e.next_hop)
            {
                self.table.update_route_lifetime(next_hop, active, now);
                self.neighbors.update(next_hop, now + active);
            }
            deliver(packet, interface);
            return Ok(InputDecision::Delivered { rebroadcast: false });
        }

        self.forwarding(packet, forward, error)
    }

    /// Handle a control frame received from neighbor `src`
    #[instrument(skip_all, fields(node = %self.local_address(), src = %src))]
    pub fn receive(&mut self, interface: u32, src: NodeAddr, payload: &[u8]) -> RoutingResult<()> {
        if !self.started {
            return Err(RoutingError::NotStarted);
        }
        let iface = self.interface(interface)?;
        if self.is_my_own_address(src) {
            trace!("Own control message, ignoring");
            return Ok(());
        }
        let message = match ControlMessage::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "Malformed control message, dropping");
                return Ok(());
            }
        };
        trace!(kind = message.kind(), "Control message received");

        let now = self.clock.now();
        self.neighbors.update(src, now + self.config.hello_lifetime());
        self.update_route_to_neighbor(src, iface);

        match message {
            ControlMessage::Rreq(rreq) => self.recv_request(rreq, iface, src),
            ControlMessage::Rrep(rrep) => self.recv_reply(rrep, iface, src),
            ControlMessage::Rerr(rerr) => self.recv_error(rerr, src),
            ControlMessage::RrepAck => {
                self.recv_reply_ack(src);
                Ok(())
            }
            ControlMessage::Update(_) => {
                debug!("Periodic table update ignored by reactive engine");
                Ok(())
            }
        }
    }

    /// Dispatch a fired timer
    ///
    /// Firings whose handle is no longer the registered one are ignored.
    #[instrument(skip_all, fields(node = %self.local_address(), timer = ?timer))]
    pub fn handle_timer(&mut self, handle: TimerHandle, timer: Timer) -> RoutingResult<()> {
        if !self.timers.fired(timer, handle) {
            trace!("Stale timer, ignoring");
            return Ok(());
        }
        match timer {
            Timer::Hello => self.hello_timer_expire(),
            Timer::NeighborPurge => {
                self.purge_neighbors()?;
                self.timers
                    .schedule(&self.clock, self.config.hello_interval, Timer::NeighborPurge);
                Ok(())
            }
            Timer::TablePurge => {
                self.purge_table();
                self.timers
                    .schedule(&self.clock, self.config.purge_interval, Timer::TablePurge);
                Ok(())
            }
            Timer::IdCachePurge => {
                let now = self.clock.now();
                self.rreq_ids.purge(now);
                self.data_ids.purge(now);
                self.timers.schedule(
                    &self.clock,
                    self.config.path_discovery_time(),
                    Timer::IdCachePurge,
                );
                Ok(())
            }
            Timer::RreqRateReset => {
                self.rreq_count = 0;
                self.rate_window_end = self.clock.now() + RATE_WINDOW;
                self.timers.schedule(&self.clock, RATE_WINDOW, Timer::RreqRateReset);
                Ok(())
            }
            Timer::RerrRateReset => {
                self.rerr_count = 0;
                self.timers.schedule(&self.clock, RATE_WINDOW, Timer::RerrRateReset);
                Ok(())
            }
            Timer::RreqRetry(dst) => self.route_request_timer_expire(dst),
            Timer::DeferredRreq(dst) => {
                if self.table.lookup_valid_route(dst, self.clock.now()).is_some() {
                    return Ok(());
                }
                self.send_request(dst)
            }
            Timer::AckTimeout(neighbor) => {
                self.ack_timer_expire(neighbor);
                Ok(())
            }
            Timer::PeriodicUpdate | Timer::TriggeredUpdate | Timer::SettlingExpired(_) => {
                debug!("Periodic-protocol timer ignored by reactive engine");
                Ok(())
            }
        }
    }

    /// Link-layer report that a unicast to `neighbor` failed
    #[instrument(skip_all, fields(node = %self.local_address(), neighbor = %neighbor))]
    pub fn notify_tx_error(&mut self, neighbor: NodeAddr) -> RoutingResult<()> {
        if !self.started {
            return Err(RoutingError::NotStarted);
        }
        self.neighbors.remove(neighbor);
        self.handle_link_failure(neighbor)
    }

    /// Repair a broken route locally instead of reporting it upstream
    ///
    /// Not supported; breaks are always reported with a route error.
    pub fn local_repair(&mut self, destination: NodeAddr) -> bool {
        trace!(destination = %destination, "Local repair not supported");
        false
    }

    fn forwarding(
        &mut self,
        mut packet: DataPacket,
        forward: ForwardCallback,
        error: ErrorCallback,
    ) -> RoutingResult<InputDecision> {
        let now = self.clock.now();
        let origin = packet.source();
        let dst = packet.destination();

        let Some(entry) = self.table.lookup_valid_route(dst, now) else {
            let dst_seq_no = self
                .table
                .lookup_route(dst)
                .filter(|e| e.valid_seq_no)
                .map(|e| e.seq_no)
                .unwrap_or(0);
            debug!("No route to forward, reporting error");
            self.send_rerr_when_no_route_to_forward(dst, dst_seq_no, origin)?;
            error(packet, DropReason::NoRoute);
            return Ok(InputDecision::Dropped(DropReason::NoRoute));
        };
        let route = entry.route();

        if packet.header.ttl <= 1 {
            debug!("TTL expired");
            error(packet, DropReason::TtlExpired);
            return Ok(InputDecision::Dropped(DropReason::TtlExpired));
        }
        packet.header.ttl -= 1;

        let active = self.config.active_route_timeout;
        self.table.update_route_lifetime(origin, active, now);
        self.table.update_route_lifetime(dst, active, now);
        self.table.update_route_lifetime(route.gateway, active, now);
        if let Some(prev_hop) = self.table.lookup_route(origin).map(|e| e.next_hop) {
            self.table.update_route_lifetime(prev_hop, active, now);
            self.neighbors.update(prev_hop, now + active);
        }
        self.neighbors.update(route.gateway, now + active);

        trace!(route = %route, "Forwarding");
        forward(route, packet);
        Ok(InputDecision::Forwarded(route))
    }

    fn receive_broadcast(
        &mut self,
        mut packet: DataPacket,
        iface: InterfaceInfo,
        forward: ForwardCallback,
        deliver: LocalDeliverCallback,
    ) -> InputDecision {
        let now = self.clock.now();
        let origin = packet.source();
        let id = packet.header.id;
        if self.data_ids.check(origin, id, now) {
            trace!("Duplicate broadcast, dropping");
            return InputDecision::Dropped(DropReason::Duplicate);
        }

        deliver(packet.clone(), iface.index);

        if !self.config.enable_broadcast || packet.header.ttl <= 1 {
            return InputDecision::Delivered { rebroadcast: false };
        }
        packet.header.ttl -= 1;
        let route = Route {
            destination: packet.destination(),
            source: iface.local,
            gateway: NodeAddr::BROADCAST,
            interface: iface.index,
        };
        self.data_ids.mark_forwarded(origin, id, iface.index);
        self.last_bcast_time = Some(now);
        forward(route, packet);
        InputDecision::Delivered { rebroadcast: true }
    }

    /// Release every buffered packet for `dst` over its now-valid route
    fn send_packet_from_queue(&mut self, dst: NodeAddr) {
        let now = self.clock.now();
        let Some(route) = self.table.lookup_valid_route(dst, now).map(|e| e.route()) else {
            return;
        };
        let entries = self.queue.dequeue_all(dst, now);
        if !entries.is_empty() {
            debug!(destination = %dst, count = entries.len(), "Flushing queued packets");
        }
        for entry in entries {
            (entry.forward)(route, entry.packet);
        }
    }

    fn notify_route_available(&mut self, dst: NodeAddr) {
        let now = self.clock.now();
        let Some(route) = self.table.lookup_valid_route(dst, now).map(|e| e.route()) else {
            return;
        };
        if let Some(listener) = self.listener.as_mut() {
            listener.on_route_available(dst, &route);
        }
    }

    fn send_control(
        &mut self,
        iface: InterfaceInfo,
        dest: Option<NodeAddr>,
        message: &ControlMessage,
    ) -> RoutingResult<()> {
        let payload = message.encode()?;
        let result = match dest {
            Some(dest) => {
                trace!(kind = message.kind(), to = %dest, "Sending");
                self.transport.send_unicast(iface.index, dest, payload)
            }
            None => {
                trace!(kind = message.kind(), interface = iface.index, "Broadcasting");
                self.last_bcast_time = Some(self.clock.now());
                self.transport.send_broadcast(iface.index, payload)
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(TransportError::LinkDown(neighbor)) => {
                debug!(neighbor = %neighbor, kind = message.kind(), "Link down, control message lost");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn broadcast_control(&mut self, message: &ControlMessage) -> RoutingResult<()> {
        for iface in self.interfaces.clone() {
            self.send_control(iface, None, message)?;
        }
        Ok(())
    }

    fn interface(&self, index: u32) -> RoutingResult<InterfaceInfo> {
        self.interfaces
            .iter()
            .find(|iface| iface.index == index)
            .copied()
            .ok_or_else(|| TransportError::UnknownInterface(index).into())
    }

    fn default_interface(&self) -> InterfaceInfo {
        self.interfaces
            .first()
            .copied()
            .unwrap_or(InterfaceInfo::new(0, NodeAddr::UNSPECIFIED, NodeAddr::BROADCAST))
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

/// Clamp a table hop count into a message field
fn hop_u8(hops: u16) -> u8 {
    u8::try_from(hops).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meshroute_core::{ManualClock, MockTransport, PacketHeader};
    use parking_lot::Mutex;

    use crate::messages::{RouteReply, RouteRequest};

    pub(super) type TestEngine = AodvEngine<Arc<ManualClock<Timer>>, Arc<MockTransport>>;

    pub(super) fn addr(c: char) -> NodeAddr {
        NodeAddr::new(10, 0, 0, (c as u8 - b'A') + 1)
    }

    pub(super) fn quiet_config() -> AodvConfig {
        AodvConfig::default().with_hello(false)
    }

    pub(super) fn make_engine(
        node: char,
        config: AodvConfig,
    ) -> (TestEngine, Arc<ManualClock<Timer>>, Arc<MockTransport>) {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(MockTransport::single(addr(node)));
        let mut engine = AodvEngine::new(config, clock.clone(), transport.clone()).unwrap();
        engine.start().unwrap();
        (engine, clock, transport)
    }

    pub(super) fn make_packet(id: u64, src: char, dst: char) -> DataPacket {
        DataPacket::new(PacketHeader::new(id, addr(src), addr(dst)), vec![1, 2, 3])
    }

    pub(super) fn decode_sent(transport: &MockTransport) -> Vec<(Option<NodeAddr>, ControlMessage)> {
        transport
            .take_sent()
            .into_iter()
            .map(|frame| (frame.dest, ControlMessage::decode(&frame.payload).unwrap()))
            .collect()
    }

    pub(super) type Forwarded = Arc<Mutex<Vec<(Route, DataPacket)>>>;
    pub(super) type Dropped = Arc<Mutex<Vec<(DataPacket, DropReason)>>>;

    pub(super) fn callbacks() -> (ForwardCallback, ErrorCallback, Forwarded, Dropped) {
        let forwarded: Forwarded = Arc::new(Mutex::new(Vec::new()));
        let dropped: Dropped = Arc::new(Mutex::new(Vec::new()));
        let f = forwarded.clone();
        let d = dropped.clone();
        (
            Box::new(move |route, packet| f.lock().push((route, packet))),
            Box::new(move |packet, reason| d.lock().push((packet, reason))),
            forwarded,
            dropped,
        )
    }

    #[derive(Clone, Default)]
    pub(super) struct RecordingListener {
        pub available: Arc<Mutex<Vec<NodeAddr>>>,
        pub unreachable: Arc<Mutex<Vec<(NodeAddr, DropReason)>>>,
    }

    impl RouteListener for RecordingListener {
        fn on_route_available(&mut self, destination: NodeAddr, _route: &Route) {
            self.available.lock().push(destination);
        }

        fn on_route_unreachable(&mut self, destination: NodeAddr, reason: DropReason) {
            self.unreachable.lock().push((destination, reason));
        }
    }

    pub(super) fn rrep_from(dst: char, origin: char, seq: u32, hops: u8) -> ControlMessage {
        ControlMessage::Rrep(RouteReply {
            prefix_size: 0,
            hop_count: hops,
            destination: addr(dst),
            dest_seq_no: seq,
            origin: addr(origin),
            lifetime_ms: 6000,
            ack_required: false,
            ttl: 10,
        })
    }

    #[test]
    fn test_route_output_before_start_fails() {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(MockTransport::single(addr('A')));
        let mut engine = AodvEngine::new(quiet_config(), clock, transport).unwrap();
        let (forward, error, _, _) = callbacks();

        let result = engine.route_output(make_packet(1, 'A', 'D'), forward, error);
        assert!(matches!(result, Err(RoutingError::NotStarted)));
    }

    #[test]
    fn test_start_requires_interfaces() {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(MockTransport::new(Vec::new()));
        let mut engine = AodvEngine::new(quiet_config(), clock, transport).unwrap();

        assert!(matches!(engine.start(), Err(RoutingError::NoInterfaces)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(MockTransport::single(addr('A')));
        let config = AodvConfig::default().with_net_diameter(0);

        assert!(matches!(
            AodvEngine::new(config, clock, transport),
            Err(RoutingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_round_trip_discovery_and_flush() {
        let (mut engine, _clock, transport) = make_engine('A', quiet_config());
        let (forward, error, forwarded, _) = callbacks();

        // Unknown destination: buffered and a request goes out with id 1
        let decision = engine
            .route_output(make_packet(1, 'A', 'D'), forward, error)
            .unwrap();
        assert_eq!(decision, OutputDecision::Queued);
        assert_eq!(engine.queued_packets(), 1);

        let sent = decode_sent(&transport);
        assert_eq!(sent.len(), 1);
        let (dest, ControlMessage::Rreq(rreq)) = &sent[0] else {
            panic!("expected a broadcast RREQ, got {:?}", sent[0]);
        };
        assert!(dest.is_none());
        assert_eq!(rreq.id, 1);
        assert_eq!(rreq.origin, addr('A'));
        assert_eq!(rreq.destination, addr('D'));
        assert_eq!(rreq.hop_count, 0);
        assert!(rreq.unknown_seq_no);
        assert_eq!(
            engine.routing_table().lookup_route(addr('D')).unwrap().flag,
            RouteFlag::InSearch
        );

        // B relays the reply from D
        let reply = rrep_from('D', 'A', 1, 0).encode().unwrap();
        engine.receive(1, addr('B'), &reply).unwrap();

        let entry = engine.routing_table().lookup_route(addr('D')).unwrap();
        assert_eq!(entry.next_hop, addr('B'));
        assert_eq!(entry.seq_no, 1);
        assert_eq!(entry.hop_count, 1);
        assert_eq!(entry.flag, RouteFlag::Valid);

        let forwarded = forwarded.lock();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].0.gateway, addr('B'));
        assert_eq!(forwarded[0].1.header.id, 1);
        assert_eq!(engine.queued_packets(), 0);
    }

    #[test]
    fn test_route_output_with_valid_route_forwards() {
        let (mut engine, _clock, transport) = make_engine('A', quiet_config());
        let reply = rrep_from('D', 'A', 4, 1).encode().unwrap();
        engine.receive(1, addr('B'), &reply).unwrap();
        transport.take_sent();

        let (forward, error, forwarded, _) = callbacks();
        let decision = engine
            .route_output(make_packet(2, 'A', 'D'), forward, error)
            .unwrap();

        assert!(matches!(decision, OutputDecision::Forwarded(route) if route.gateway == addr('B')));
        assert_eq!(forwarded.lock().len(), 1);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_second_packet_does_not_restart_discovery() {
        let (mut engine, _clock, transport) = make_engine('A', quiet_config());
        for id in 1..=3 {
            let (forward, error, _, _) = callbacks();
            engine
                .route_output(make_packet(id, 'A', 'D'), forward, error)
                .unwrap();
        }

        assert_eq!(transport.sent_count(), 1);
        assert_eq!(engine.queued_packets(), 3);
    }

    #[test]
    fn test_queue_full_reports_drop() {
        let config = quiet_config().with_queue(2, 1, Duration::from_secs(30));
        let (mut engine, _clock, _transport) = make_engine('A', config);

        let (forward, error, _, _) = callbacks();
        engine
            .route_output(make_packet(1, 'A', 'D'), forward, error)
            .unwrap();

        let (forward, error, _, dropped) = callbacks();
        let decision = engine
            .route_output(make_packet(2, 'A', 'D'), forward, error)
            .unwrap();

        assert_eq!(decision, OutputDecision::Dropped(DropReason::QueueFull));
        assert_eq!(dropped.lock()[0].1, DropReason::QueueFull);
    }

    #[test]
    fn test_route_input_forwards_and_decrements_ttl() {
        let (mut engine, _clock, _transport) = make_engine('B', quiet_config());
        let reply = rrep_from('D', 'A', 4, 0).encode().unwrap();
        engine.receive(1, addr('D'), &reply).unwrap();

        let (forward, error, forwarded, _) = callbacks();
        let decision = engine
            .route_input(
                make_packet(9, 'A', 'D'),
                1,
                addr('A'),
                forward,
                Box::new(|_, _| panic!("not for us")),
                error,
            )
            .unwrap();

        assert!(matches!(decision, InputDecision::Forwarded(route) if route.gateway == addr('D')));
        let forwarded = forwarded.lock();
        assert_eq!(forwarded[0].1.header.ttl, meshroute_core::DEFAULT_TTL - 1);
        assert!(engine.neighbors().is_neighbor(addr('A'), VirtualTime::ZERO));
    }

    #[test]
    fn test_route_input_ttl_expired() {
        let (mut engine, _clock, _transport) = make_engine('B', quiet_config());
        let reply = rrep_from('D', 'A', 4, 0).encode().unwrap();
        engine.receive(1, addr('D'), &reply).unwrap();

        let (forward, error, forwarded, dropped) = callbacks();
        let mut packet = make_packet(9, 'A', 'D');
        packet.header.ttl = 1;
        let decision = engine
            .route_input(packet, 1, addr('A'), forward, Box::new(|_, _| {}), error)
            .unwrap();

        assert_eq!(decision, InputDecision::Dropped(DropReason::TtlExpired));
        assert!(forwarded.lock().is_empty());
        assert_eq!(dropped.lock()[0].1, DropReason::TtlExpired);
    }

    #[test]
    fn test_route_input_local_delivery() {
        let (mut engine, _clock, _transport) = make_engine('D', quiet_config());
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let d = delivered.clone();
        let (forward, error, _, _) = callbacks();

        let decision = engine
            .route_input(
                make_packet(3, 'A', 'D'),
                1,
                addr('C'),
                forward,
                Box::new(move |packet, iface| d.lock().push((packet, iface))),
                error,
            )
            .unwrap();

        assert_eq!(decision, InputDecision::Delivered { rebroadcast: false });
        assert_eq!(delivered.lock()[0].1, 1);
    }

    #[test]
    fn test_route_input_without_route_sends_rerr() {
        let (mut engine, _clock, transport) = make_engine('B', quiet_config());
        let (forward, error, _, dropped) = callbacks();

        let decision = engine
            .route_input(
                make_packet(3, 'A', 'D'),
                1,
                addr('A'),
                forward,
                Box::new(|_, _| {}),
                error,
            )
            .unwrap();

        assert_eq!(decision, InputDecision::Dropped(DropReason::NoRoute));
        assert_eq!(dropped.lock()[0].1, DropReason::NoRoute);
        let sent = decode_sent(&transport);
        assert!(matches!(&sent[0].1, ControlMessage::Rerr(rerr) if rerr.unreachable()[0].0 == addr('D')));
    }

    #[test]
    fn test_own_packet_looping_back_is_dropped_silently() {
        let (mut engine, _clock, transport) = make_engine('A', quiet_config());
        let (forward, error, _, dropped) = callbacks();

        let decision = engine
            .route_input(make_packet(3, 'A', 'D'), 1, addr('B'), forward, Box::new(|_, _| {}), error)
            .unwrap();

        assert_eq!(decision, InputDecision::Dropped(DropReason::Duplicate));
        assert!(dropped.lock().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_broadcast_data_delivered_and_rebroadcast_once() {
        let (mut engine, _clock, _transport) = make_engine('B', quiet_config());
        let mut packet = make_packet(5, 'A', 'A');
        packet.header.destination = NodeAddr::BROADCAST;

        let delivered = Arc::new(Mutex::new(0));
        let d = delivered.clone();
        let (forward, error, forwarded, _) = callbacks();
        let decision = engine
            .route_input(
                packet.clone(),
                1,
                addr('A'),
                forward,
                Box::new(move |_, _| *d.lock() += 1),
                error,
            )
            .unwrap();
        assert_eq!(decision, InputDecision::Delivered { rebroadcast: true });
        assert_eq!(forwarded.lock()[0].0.gateway, NodeAddr::BROADCAST);

        let (forward, error, _, _) = callbacks();
        let decision = engine
            .route_input(packet, 1, addr('C'), forward, Box::new(|_, _| {}), error)
            .unwrap();
        assert_eq!(decision, InputDecision::Dropped(DropReason::Duplicate));
        assert_eq!(*delivered.lock(), 1);
    }

    #[test]
    fn test_malformed_control_message_is_ignored() {
        let (mut engine, _clock, transport) = make_engine('A', quiet_config());

        engine.receive(1, addr('B'), &[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert!(engine.routing_table().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_unknown_interface_is_an_error() {
        let (mut engine, _clock, _transport) = make_engine('A', quiet_config());
        let rreq = ControlMessage::Rreq(RouteRequest {
            gratuitous_reply: false,
            destination_only: false,
            unknown_seq_no: true,
            hop_count: 0,
            id: 1,
            destination: addr('D'),
            dest_seq_no: 0,
            origin: addr('C'),
            origin_seq_no: 1,
            ttl: 5,
        })
        .encode()
        .unwrap();

        assert!(matches!(
            engine.receive(7, addr('B'), &rreq),
            Err(RoutingError::Transport(TransportError::UnknownInterface(7)))
        ));
    }

    #[test]
    fn test_stop_cancels_timers_and_reports_queued() {
        let (mut engine, clock, _transport) = make_engine('A', AodvConfig::default());
        let (forward, error, _, dropped) = callbacks();
        engine
            .route_output(make_packet(1, 'A', 'D'), forward, error)
            .unwrap();
        assert!(clock.pending_count() > 0);

        engine.stop();

        assert_eq!(clock.pending_count(), 0);
        assert_eq!(dropped.lock()[0].1, DropReason::EngineStopped);
        assert!(!engine.is_started());
    }

    #[test]
    fn test_local_repair_is_not_supported() {
        let (mut engine, _clock, _transport) = make_engine('A', quiet_config());
        assert!(!engine.local_repair(addr('D')));
    }
}
