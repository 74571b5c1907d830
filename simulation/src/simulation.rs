//! Simulation engine for meshroute
//!
//! Implements discrete-event simulation with:
//! - One routing engine per peer, all driven by a shared [`EventQueue`]
//! - Per-link latency and link up/down changes
//! - Link-layer feedback for unicasts to peers that are no longer adjacent
//! - An event log and delivery statistics

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use meshroute_core::{DEFAULT_TTL, DataPacket, DropReason, NodeAddr, PacketHeader, VirtualTime};
use meshroute_logging::NodeContextGuard;
use meshroute_routing::{
    AodvConfig, ErrorCallback, ForwardCallback, LocalDeliverCallback, Route,
    RouteListener, RoutingEngine, RoutingMode, RoutingResult, RoutingTableEntry,
};

use crate::kernel::{EventQueue, SIM_INTERFACE, SharedQueue, SimClock, SimTransport};
use crate::topology::Mesh;
use crate::types::*;

/// Routing engine as hosted by the simulation
pub type SimEngine = RoutingEngine<SimClock, SimTransport>;

/// Configuration for the simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Routing discipline every node runs
    pub mode: RoutingMode,
    /// Default one-way link latency in microseconds
    pub latency_us: u64,
    /// How long [`Simulation::run`] runs, in seconds
    pub duration_secs: u64,
    /// Report failed unicasts back to the sender's engine
    pub link_feedback: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::default(),
            latency_us: 1_000,
            duration_secs: 30,
            link_feedback: true,
        }
    }
}

impl SimConfig {
    /// Reactive mode without hello beacons; neighbors are learned from traffic
    pub fn quiet_reactive() -> Self {
        Self {
            mode: RoutingMode::Reactive(AodvConfig::default().with_hello(false)),
            ..Default::default()
        }
    }

    /// Periodic mode with default parameters
    pub fn periodic() -> Self {
        Self {
            mode: RoutingMode::periodic(),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Simulation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_dropped: u64,
    pub control_frames: u64,
    pub data_frames: u64,
    /// Frames that found no link to travel on
    pub frames_lost: u64,
    pub tx_errors: u64,
    pub unreachable_reports: u64,
    /// Sum of hop counts over delivered packets
    pub total_hops: u64,
}

impl SimStats {
    /// Delivered packets over sent packets
    pub fn delivery_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.packets_delivered as f64 / self.packets_sent as f64
    }
}

/// Event log and counters, written from engine callbacks
///
/// Drops come from the packets' error callbacks and from dead links.
/// Packets an engine discards from its queue are not reported; a failed
/// discovery shows up as a route-unreachable event instead. A packet id
/// is counted at most once.
#[derive(Debug, Default)]
struct Recorder {
    events: Vec<NetworkEvent>,
    stats: SimStats,
    dropped: HashSet<u64>,
}

impl Recorder {
    fn record_drop(&mut self, node: PeerId, packet: &DataPacket, reason: DropReason, at: VirtualTime) {
        if !self.dropped.insert(packet.header.id) {
            return;
        }
        debug!(node = %node, packet = %packet, reason = %reason, "Packet dropped");
        self.stats.packets_dropped += 1;
        self.events.push(NetworkEvent::Dropped {
            packet_id: packet.header.id,
            at_node: node,
            reason,
            at,
        });
    }

    fn record_delivery(&mut self, node: PeerId, packet: &DataPacket, at: VirtualTime) {
        let hops = DEFAULT_TTL.saturating_sub(packet.header.ttl) + 1;
        let Some(from) = PeerId::from_addr(packet.source()) else {
            return;
        };
        info!(node = %node, from = %from, packet_id = packet.header.id, hops, "Packet delivered");
        self.stats.packets_delivered += 1;
        self.stats.total_hops += u64::from(hops);
        self.events.push(NetworkEvent::Delivered {
            packet_id: packet.header.id,
            from,
            to: node,
            hops,
            at,
        });
    }
}

type SharedRecorder = Arc<Mutex<Recorder>>;

/// Reports route changes of one node into the event log
struct NodeListener {
    node: PeerId,
    queue: SharedQueue,
    recorder: SharedRecorder,
}

impl RouteListener for NodeListener {
    fn on_route_available(&mut self, destination: NodeAddr, _route: &Route) {
        let at = self.queue.lock().now();
        self.recorder.lock().events.push(NetworkEvent::RouteAvailable {
            node: self.node,
            destination,
            at,
        });
    }

    fn on_route_unreachable(&mut self, destination: NodeAddr, reason: DropReason) {
        let at = self.queue.lock().now();
        let mut recorder = self.recorder.lock();
        recorder.stats.unreachable_reports += 1;
        recorder.events.push(NetworkEvent::RouteUnreachable {
            node: self.node,
            destination,
            reason,
            at,
        });
    }
}

/// The simulation state
pub struct Simulation {
    /// The network mesh
    pub mesh: Mesh,
    /// Configuration
    pub config: SimConfig,
    queue: SharedQueue,
    nodes: BTreeMap<PeerId, SimEngine>,
    recorder: SharedRecorder,
    next_packet_id: u64,
}

impl Simulation {
    /// Create a simulation with one engine per peer of `mesh`
    ///
    /// Engines are not started until [`Simulation::start`].
    pub fn new(mesh: Mesh, config: SimConfig) -> SimResult<Self> {
        let queue: SharedQueue = Arc::new(Mutex::new(EventQueue::new()));
        let recorder: SharedRecorder = Arc::new(Mutex::new(Recorder::default()));
        let mut nodes = BTreeMap::new();

        for peer in mesh.peer_ids() {
            let mut engine = RoutingEngine::new(
                config.mode.clone(),
                SimClock::new(peer, queue.clone()),
                SimTransport::new(peer, queue.clone()),
            )
            .map_err(|source| SimError::Routing { node: peer, source })?;
            engine.set_listener(Box::new(NodeListener {
                node: peer,
                queue: queue.clone(),
                recorder: recorder.clone(),
            }));
            nodes.insert(peer, engine);
        }

        Ok(Self {
            mesh,
            config,
            queue,
            nodes,
            recorder,
            next_packet_id: 1,
        })
    }

    /// Start every engine
    pub fn start(&mut self) -> SimResult<()> {
        info!(
            peers = self.nodes.len(),
            protocol = self.config.mode.name(),
            "Simulation starting"
        );
        for (peer, engine) in &mut self.nodes {
            if engine.is_started() {
                continue;
            }
            let _guard = NodeContextGuard::with_label(peer.addr(), peer.to_string());
            engine
                .start()
                .map_err(|source| SimError::Routing { node: *peer, source })?;
        }
        Ok(())
    }

    /// Current virtual time
    pub fn now(&self) -> VirtualTime {
        self.queue.lock().now()
    }

    /// Queue an application packet from `from` to `to`; returns its id
    pub fn send_message(&mut self, from: PeerId, to: PeerId, payload: impl Into<Bytes>) -> SimResult<u64> {
        self.send_after(Duration::ZERO, from, to, payload)
    }

    /// Queue an application packet to be sent after `delay`
    pub fn send_after(
        &mut self,
        delay: Duration,
        from: PeerId,
        to: PeerId,
        payload: impl Into<Bytes>,
    ) -> SimResult<u64> {
        self.check_peer(from)?;
        self.check_peer(to)?;
        let id = self.next_packet_id;
        self.next_packet_id += 1;
        self.queue.lock().schedule(
            delay,
            SimEvent::AppSend {
                id,
                from,
                to,
                payload: payload.into(),
            },
        );
        Ok(id)
    }

    /// Take the link between two peers down after `delay`
    pub fn link_down_after(&mut self, delay: Duration, a: PeerId, b: PeerId) -> SimResult<()> {
        self.check_peer(a)?;
        self.check_peer(b)?;
        self.queue.lock().schedule(delay, SimEvent::LinkDown(a, b));
        Ok(())
    }

    /// Bring the link between two peers up after `delay`
    pub fn link_up_after(&mut self, delay: Duration, a: PeerId, b: PeerId) -> SimResult<()> {
        self.check_peer(a)?;
        self.check_peer(b)?;
        self.queue.lock().schedule(delay, SimEvent::LinkUp(a, b));
        Ok(())
    }

    fn check_peer(&self, peer: PeerId) -> SimResult<()> {
        if self.nodes.contains_key(&peer) {
            Ok(())
        } else {
            Err(SimError::UnknownPeer(peer))
        }
    }

    /// Process the next event; returns false when the queue is empty
    pub fn step(&mut self) -> SimResult<bool> {
        let next = self.queue.lock().pop();
        let Some((handle, event)) = next else {
            return Ok(false);
        };
        trace!(event = ?event, "Dispatching");

        match event {
            SimEvent::Timer { node, timer } => {
                self.with_engine(node, |engine| engine.handle_timer(handle, timer))?;
            }
            SimEvent::Transmit { from, target, frame } => self.transmit(from, target, frame),
            SimEvent::Deliver { from, to, frame } => self.deliver(from, to, frame)?,
            SimEvent::TxError { node, neighbor } => {
                self.recorder.lock().stats.tx_errors += 1;
                self.with_engine(node, |engine| engine.notify_tx_error(neighbor.addr()))?;
            }
            SimEvent::AppSend { id, from, to, payload } => self.app_send(id, from, to, payload)?,
            SimEvent::LinkUp(a, b) => {
                self.mesh.connect(a, b);
                self.record_link(a, b, true);
            }
            SimEvent::LinkDown(a, b) => {
                self.mesh.disconnect(a, b);
                self.record_link(a, b, false);
            }
        }
        Ok(true)
    }

    /// Run until the next event would be after `deadline`, then move the clock there
    pub fn run_until(&mut self, deadline: VirtualTime) -> SimResult<()> {
        loop {
            let next = self.queue.lock().peek_time();
            match next {
                Some(at) if at <= deadline => {
                    self.step()?;
                }
                _ => break,
            }
        }
        self.queue.lock().advance_to(deadline);
        Ok(())
    }

    /// Run for `duration` of virtual time
    pub fn run_for(&mut self, duration: Duration) -> SimResult<()> {
        let deadline = self.now() + duration;
        self.run_until(deadline)
    }

    /// Start (if needed) and run for the configured duration
    pub fn run(&mut self) -> SimResult<()> {
        self.start()?;
        let deadline = VirtualTime::ZERO + self.config.duration();
        self.run_until(deadline)?;
        info!(summary = %self.state_summary(), "Simulation complete");
        Ok(())
    }

    fn with_engine<T>(
        &mut self,
        node: PeerId,
        f: impl FnOnce(&mut SimEngine) -> RoutingResult<T>,
    ) -> SimResult<T> {
        let engine = self.nodes.get_mut(&node).ok_or(SimError::UnknownPeer(node))?;
        let _guard = NodeContextGuard::with_label(node.addr(), node.to_string());
        f(engine).map_err(|source| SimError::Routing { node, source })
    }

    fn callbacks(&self, node: PeerId) -> (ForwardCallback, LocalDeliverCallback, ErrorCallback) {
        let queue = self.queue.clone();
        let recorder = self.recorder.clone();
        let forward: ForwardCallback = Box::new(move |route: Route, packet: DataPacket| {
            let target = if route.gateway.is_broadcast() || route.gateway == SUBNET_BROADCAST {
                Target::Broadcast
            } else if let Some(gateway) = PeerId::from_addr(route.gateway) {
                Target::Unicast(gateway)
            } else {
                let at = queue.lock().now();
                recorder.lock().record_drop(node, &packet, DropReason::NoRoute, at);
                return;
            };
            queue.lock().schedule(
                Duration::ZERO,
                SimEvent::Transmit {
                    from: node,
                    target,
                    frame: Frame::Data(packet),
                },
            );
        });

        let queue = self.queue.clone();
        let recorder = self.recorder.clone();
        let deliver: LocalDeliverCallback = Box::new(move |packet, _interface| {
            let at = queue.lock().now();
            recorder.lock().record_delivery(node, &packet, at);
        });

        let queue = self.queue.clone();
        let recorder = self.recorder.clone();
        let error: ErrorCallback = Box::new(move |packet, reason| {
            let at = queue.lock().now();
            recorder.lock().record_drop(node, &packet, reason, at);
        });

        (forward, deliver, error)
    }

    fn app_send(&mut self, id: u64, from: PeerId, to: PeerId, payload: Bytes) -> SimResult<()> {
        let now = self.now();
        {
            let mut recorder = self.recorder.lock();
            recorder.stats.packets_sent += 1;
            recorder.events.push(NetworkEvent::Sent {
                packet_id: id,
                from,
                to,
                at: now,
            });
        }

        let packet = DataPacket::new(PacketHeader::new(id, from.addr(), to.addr()), payload);
        let (forward, _, error) = self.callbacks(from);
        let decision = self.with_engine(from, |engine| engine.route_output(packet, forward, error))?;
        debug!(from = %from, to = %to, packet_id = id, decision = ?decision, "Application send");
        Ok(())
    }

    fn transmit(&mut self, from: PeerId, target: Target, frame: Frame) {
        {
            let mut recorder = self.recorder.lock();
            match frame {
                Frame::Control(_) => recorder.stats.control_frames += 1,
                Frame::Data(_) => recorder.stats.data_frames += 1,
            }
        }

        match target {
            Target::Broadcast => {
                let neighbors: Vec<PeerId> = self
                    .mesh
                    .neighbors(from)
                    .map(|n| n.iter().copied().collect())
                    .unwrap_or_default();
                for to in neighbors {
                    self.schedule_delivery(from, to, frame.clone());
                }
            }
            Target::Unicast(to) if self.mesh.are_connected(from, to) => {
                self.schedule_delivery(from, to, frame);
            }
            Target::Unicast(to) => {
                debug!(from = %from, to = %to, "No link for unicast");
                let now = self.now();
                let mut recorder = self.recorder.lock();
                recorder.stats.frames_lost += 1;
                if let Frame::Data(packet) = &frame {
                    recorder.record_drop(from, packet, DropReason::LinkFailure, now);
                }
                drop(recorder);
                if self.config.link_feedback {
                    self.queue.lock().schedule(
                        Duration::ZERO,
                        SimEvent::TxError {
                            node: from,
                            neighbor: to,
                        },
                    );
                }
            }
        }
    }

    fn schedule_delivery(&self, from: PeerId, to: PeerId, frame: Frame) {
        let latency = self.mesh.latency(from, to).unwrap_or_else(|| self.config.latency());
        self.queue.lock().schedule(latency, SimEvent::Deliver { from, to, frame });
    }

    fn deliver(&mut self, from: PeerId, to: PeerId, frame: Frame) -> SimResult<()> {
        if !self.mesh.are_connected(from, to) {
            // The link went down while the frame was in flight
            let now = self.now();
            let mut recorder = self.recorder.lock();
            recorder.stats.frames_lost += 1;
            if let Frame::Data(packet) = &frame {
                recorder.record_drop(from, packet, DropReason::LinkFailure, now);
            }
            return Ok(());
        }

        match frame {
            Frame::Control(payload) => {
                self.with_engine(to, |engine| engine.receive(SIM_INTERFACE, from.addr(), &payload))
            }
            Frame::Data(packet) => {
                let (forward, deliver, error) = self.callbacks(to);
                let decision = self.with_engine(to, |engine| {
                    engine.route_input(packet, SIM_INTERFACE, from.addr(), forward, deliver, error)
                })?;
                trace!(node = %to, decision = ?decision, "Data packet handled");
                Ok(())
            }
        }
    }

    fn record_link(&mut self, a: PeerId, b: PeerId, up: bool) {
        info!(a = %a, b = %b, up, "Link changed");
        let at = self.now();
        self.recorder.lock().events.push(NetworkEvent::Link { a, b, up, at });
    }

    /// The engine of a peer
    pub fn engine(&self, peer: PeerId) -> Option<&SimEngine> {
        self.nodes.get(&peer)
    }

    /// The valid route `from` holds toward `to`
    pub fn route(&self, from: PeerId, to: PeerId) -> Option<&RoutingTableEntry> {
        let now = self.now();
        self.engine(from)?
            .routing_table()
            .lookup_valid_route(to.addr(), now)
    }

    /// The next hop `from` would use toward `to`
    pub fn next_hop(&self, from: PeerId, to: PeerId) -> Option<PeerId> {
        self.route(from, to).and_then(|entry| PeerId::from_addr(entry.next_hop))
    }

    /// Number of packets delivered to `peer`
    pub fn delivered_to(&self, peer: PeerId) -> usize {
        self.recorder
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, NetworkEvent::Delivered { to, .. } if *to == peer))
            .count()
    }

    /// Snapshot of the statistics
    pub fn stats(&self) -> SimStats {
        self.recorder.lock().stats.clone()
    }

    /// Snapshot of the event log
    pub fn events(&self) -> Vec<NetworkEvent> {
        self.recorder.lock().events.clone()
    }

    /// Number of events still queued
    pub fn pending_events(&self) -> usize {
        self.queue.lock().len()
    }

    /// Get a summary of the current simulation state
    pub fn state_summary(&self) -> String {
        let stats = self.stats();
        format!(
            "t={} | Sent: {} | Delivered: {} | Dropped: {} | Control frames: {} | Tx errors: {}",
            self.now(),
            stats.packets_sent,
            stats.packets_delivered,
            stats.packets_dropped,
            stats.control_frames,
            stats.tx_errors
        )
    }

    /// Render one peer's routing table
    pub fn routing_table_summary(&self, peer: PeerId) -> String {
        let Some(engine) = self.engine(peer) else {
            return String::new();
        };
        let mut rows: Vec<String> = engine
            .routing_table()
            .iter()
            .filter(|entry| entry.destination != peer.addr())
            .map(|entry| {
                let dest = PeerId::from_addr(entry.destination)
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| entry.destination.to_string());
                let via = PeerId::from_addr(entry.next_hop)
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| entry.next_hop.to_string());
                format!(
                    "    {} via {} hops={} seq={} {}",
                    dest, via, entry.hop_count, entry.seq_no, entry.flag
                )
            })
            .collect();
        rows.sort();
        format!("  {} ({}):\n{}", peer, engine.protocol(), rows.join("\n"))
    }
}
