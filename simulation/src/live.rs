//! Live runtime on tokio
//!
//! Every peer runs as its own task that owns its routing engine outright;
//! nothing else ever touches it. Peers talk through unbounded channels
//! looked up in a shared [`DashMap`] registry, and engine timers are
//! spawned sleeps whose abort handles make them cancellable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use meshroute_core::{
    Clock, DataPacket, DropReason, InterfaceInfo, NodeAddr, PacketHeader, TimerHandle, Transport, TransportError,
    VirtualTime,
};
use meshroute_logging::NodeContextGuard;
use meshroute_routing::{
    ErrorCallback, ForwardCallback, LocalDeliverCallback, Route, RouteListener, RoutingEngine, RoutingMode, Timer,
};

use crate::kernel::SIM_INTERFACE;
use crate::topology::Mesh;
use crate::types::{PeerId, SUBNET_BROADCAST, SimError, SimResult};

/// Routing engine as hosted by a live node task
pub type LiveEngine = RoutingEngine<LiveClock, ChannelTransport>;

type Registry = Arc<DashMap<NodeAddr, UnboundedSender<NodeInput>>>;
type SharedMesh = Arc<RwLock<Mesh>>;

/// Messages a node task handles, one at a time
#[derive(Debug)]
pub enum NodeInput {
    /// Control frame from a neighbor
    Frame { from: NodeAddr, payload: Bytes },
    /// Data packet handed over by a neighbor
    Data { from: NodeAddr, packet: DataPacket },
    /// One of the engine's timers fired
    Timer { handle: TimerHandle, timer: Timer },
    /// A unicast to `neighbor` could not be delivered
    TxError { neighbor: NodeAddr },
    /// The application wants to send a packet
    Send { id: u64, to: NodeAddr, payload: Bytes },
    /// Stop the engine and exit
    Shutdown,
}

/// What node tasks report back to the network owner
///
/// Drops are reported through the engines' error callbacks. Packets
/// still queued when discovery gives up are covered by `Unreachable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Delivered { node: PeerId, packet: DataPacket },
    Dropped { node: PeerId, packet_id: u64, reason: DropReason },
    Unreachable { node: PeerId, destination: NodeAddr, reason: DropReason },
}

/// Wall-clock time since the network started, with tokio timers
#[derive(Clone)]
pub struct LiveClock {
    start: Instant,
    inbox: UnboundedSender<NodeInput>,
    timers: Arc<DashMap<u64, AbortHandle>>,
    next_handle: Arc<AtomicU64>,
}

impl LiveClock {
    fn new(start: Instant, inbox: UnboundedSender<NodeInput>) -> Self {
        Self {
            start,
            inbox,
            timers: Arc::new(DashMap::new()),
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Number of timers not yet fired or cancelled
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}

impl Clock<Timer> for LiveClock {
    fn now(&self) -> VirtualTime {
        let elapsed = self.start.elapsed().as_micros();
        VirtualTime::from_micros(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    fn schedule_after(&self, delay: Duration, timer: Timer) -> TimerHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let handle = TimerHandle(id);
        let inbox = self.inbox.clone();
        let timers = self.timers.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            timers.remove(&id);
            let _ = inbox.send(NodeInput::Timer { handle, timer });
        });
        self.timers.insert(id, task.abort_handle());
        if task.is_finished() {
            self.timers.remove(&id);
        }
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some((_, task)) = self.timers.remove(&handle.0) {
            task.abort();
        }
    }
}

/// Sends frames straight into neighbors' inboxes
#[derive(Clone)]
pub struct ChannelTransport {
    local: PeerId,
    mesh: SharedMesh,
    registry: Registry,
}

impl ChannelTransport {
    fn neighbors(&self) -> Vec<PeerId> {
        self.mesh
            .read()
            .neighbors(self.local)
            .map(|n| n.iter().copied().collect())
            .unwrap_or_default()
    }

    fn deliver(&self, to: PeerId, input: NodeInput) -> Result<(), TransportError> {
        if !self.mesh.read().are_connected(self.local, to) {
            return Err(TransportError::LinkDown(to.addr()));
        }
        let inbox = self
            .registry
            .get(&to.addr())
            .ok_or(TransportError::LinkDown(to.addr()))?;
        inbox.send(input).map_err(|_| TransportError::Closed)
    }
}

impl Transport for ChannelTransport {
    fn send_unicast(&self, interface: u32, dest: NodeAddr, payload: Bytes) -> Result<(), TransportError> {
        if interface != SIM_INTERFACE {
            return Err(TransportError::UnknownInterface(interface));
        }
        let to = PeerId::from_addr(dest).ok_or(TransportError::LinkDown(dest))?;
        self.deliver(
            to,
            NodeInput::Frame {
                from: self.local.addr(),
                payload,
            },
        )
    }

    fn send_broadcast(&self, interface: u32, payload: Bytes) -> Result<(), TransportError> {
        if interface != SIM_INTERFACE {
            return Err(TransportError::UnknownInterface(interface));
        }
        for to in self.neighbors() {
            let frame = NodeInput::Frame {
                from: self.local.addr(),
                payload: payload.clone(),
            };
            if let Err(err) = self.deliver(to, frame) {
                debug!(to = %to, error = %err, "Broadcast copy lost");
            }
        }
        Ok(())
    }

    fn interfaces(&self) -> Vec<InterfaceInfo> {
        vec![InterfaceInfo::new(SIM_INTERFACE, self.local.addr(), SUBNET_BROADCAST)]
    }
}

struct LiveListener {
    node: PeerId,
    events: UnboundedSender<LiveEvent>,
}

impl RouteListener for LiveListener {
    fn on_route_unreachable(&mut self, destination: NodeAddr, reason: DropReason) {
        let _ = self.events.send(LiveEvent::Unreachable {
            node: self.node,
            destination,
            reason,
        });
    }
}

/// Everything a node task needs besides its engine
#[derive(Clone)]
struct NodeLinks {
    transport: ChannelTransport,
    inbox: UnboundedSender<NodeInput>,
    events: UnboundedSender<LiveEvent>,
}

impl NodeLinks {
    fn node(&self) -> PeerId {
        self.transport.local
    }

    fn callbacks(&self) -> (ForwardCallback, LocalDeliverCallback, ErrorCallback) {
        let links = self.clone();
        let forward: ForwardCallback = Box::new(move |route: Route, packet: DataPacket| links.forward(route, packet));

        let events = self.events.clone();
        let node = self.node();
        let deliver: LocalDeliverCallback = Box::new(move |packet, _interface| {
            info!(node = %node, packet = %packet, "Packet delivered");
            let _ = events.send(LiveEvent::Delivered { node, packet });
        });

        let events = self.events.clone();
        let error: ErrorCallback = Box::new(move |packet, reason| {
            let _ = events.send(LiveEvent::Dropped {
                node,
                packet_id: packet.header.id,
                reason,
            });
        });

        (forward, deliver, error)
    }

    fn forward(&self, route: Route, packet: DataPacket) {
        let from = self.node().addr();
        if route.gateway.is_broadcast() || route.gateway == SUBNET_BROADCAST {
            for to in self.transport.neighbors() {
                let copy = NodeInput::Data {
                    from,
                    packet: packet.clone(),
                };
                let _ = self.transport.deliver(to, copy);
            }
            return;
        }

        let packet_id = packet.header.id;
        let sent = PeerId::from_addr(route.gateway)
            .ok_or(TransportError::LinkDown(route.gateway))
            .and_then(|to| self.transport.deliver(to, NodeInput::Data { from, packet }));
        if let Err(err) = sent {
            debug!(gateway = %route.gateway, error = %err, "Data frame lost");
            self.report_drop(packet_id, DropReason::LinkFailure);
            let _ = self.inbox.send(NodeInput::TxError {
                neighbor: route.gateway,
            });
        }
    }

    fn report_drop(&self, packet_id: u64, reason: DropReason) {
        let _ = self.events.send(LiveEvent::Dropped {
            node: self.node(),
            packet_id,
            reason,
        });
    }
}

async fn run_node(mut engine: LiveEngine, mut inbox: UnboundedReceiver<NodeInput>, links: NodeLinks) {
    let node = links.node();
    {
        let _guard = NodeContextGuard::with_label(node.addr(), node.to_string());
        if let Err(err) = engine.start() {
            warn!(error = %err, "Engine failed to start");
            return;
        }
    }

    while let Some(input) = inbox.recv().await {
        let _guard = NodeContextGuard::with_label(node.addr(), node.to_string());
        let result = match input {
            NodeInput::Frame { from, payload } => engine.receive(SIM_INTERFACE, from, &payload),
            NodeInput::Data { from, packet } => {
                let (forward, deliver, error) = links.callbacks();
                engine
                    .route_input(packet, SIM_INTERFACE, from, forward, deliver, error)
                    .map(|decision| trace!(decision = ?decision, "Data packet handled"))
            }
            NodeInput::Timer { handle, timer } => engine.handle_timer(handle, timer),
            NodeInput::TxError { neighbor } => engine.notify_tx_error(neighbor),
            NodeInput::Send { id, to, payload } => {
                let (forward, _, error) = links.callbacks();
                let packet = DataPacket::new(PacketHeader::new(id, node.addr(), to), payload);
                engine
                    .route_output(packet, forward, error)
                    .map(|decision| debug!(packet_id = id, decision = ?decision, "Application send"))
            }
            NodeInput::Shutdown => break,
        };
        if let Err(err) = result {
            warn!(error = %err, "Routing engine error");
        }
    }

    let _guard = NodeContextGuard::with_label(node.addr(), node.to_string());
    engine.stop();
    debug!("Node task exiting");
}

/// A mesh of routing engines running as tokio tasks
pub struct LiveNetwork {
    mesh: SharedMesh,
    registry: Registry,
    tasks: Vec<(PeerId, JoinHandle<()>)>,
    events: UnboundedReceiver<LiveEvent>,
    next_packet_id: u64,
}

impl LiveNetwork {
    /// Spawn one task per peer of `mesh`; must be called inside a tokio runtime
    pub fn spawn(mesh: Mesh, mode: RoutingMode) -> SimResult<Self> {
        let start = Instant::now();
        let peers = mesh.peer_ids();
        let mesh: SharedMesh = Arc::new(RwLock::new(mesh));
        let registry: Registry = Arc::new(DashMap::new());
        let (events_tx, events) = mpsc::unbounded_channel();

        let mut nodes = Vec::new();
        for peer in &peers {
            let (inbox_tx, inbox) = mpsc::unbounded_channel();
            registry.insert(peer.addr(), inbox_tx.clone());

            let transport = ChannelTransport {
                local: *peer,
                mesh: mesh.clone(),
                registry: registry.clone(),
            };
            let clock = LiveClock::new(start, inbox_tx.clone());
            let mut engine = RoutingEngine::new(mode.clone(), clock, transport.clone())
                .map_err(|source| SimError::Routing { node: *peer, source })?;
            engine.set_listener(Box::new(LiveListener {
                node: *peer,
                events: events_tx.clone(),
            }));

            let links = NodeLinks {
                transport,
                inbox: inbox_tx,
                events: events_tx.clone(),
            };
            nodes.push((*peer, engine, inbox, links));
        }

        // Spawn only once every inbox is registered
        let tasks = nodes
            .into_iter()
            .map(|(peer, engine, inbox, links)| {
                let span = info_span!("node", peer = %peer);
                (peer, tokio::spawn(run_node(engine, inbox, links).instrument(span)))
            })
            .collect();

        info!(peers = peers.len(), protocol = mode.name(), "Live network started");
        Ok(Self {
            mesh,
            registry,
            tasks,
            events,
            next_packet_id: 1,
        })
    }

    /// Ask `from` to send a packet to `to`; returns the packet id
    pub fn send(&mut self, from: PeerId, to: PeerId, payload: impl Into<Bytes>) -> SimResult<u64> {
        let id = self.next_packet_id;
        self.next_packet_id += 1;
        let inbox = self.registry.get(&from.addr()).ok_or(SimError::UnknownPeer(from))?;
        inbox
            .send(NodeInput::Send {
                id,
                to: to.addr(),
                payload: payload.into(),
            })
            .map_err(|_| SimError::Shutdown)?;
        Ok(id)
    }

    /// Bring a link up or down
    pub fn set_link(&self, a: PeerId, b: PeerId, up: bool) {
        let mut mesh = self.mesh.write();
        if up {
            mesh.connect(a, b);
        } else {
            mesh.disconnect(a, b);
        }
    }

    /// Next report from any node
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    /// Wait until a packet reaches `to`, or give up after `timeout`
    pub async fn wait_for_delivery(&mut self, to: PeerId, timeout: Duration) -> Option<DataPacket> {
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(LiveEvent::Delivered { node, packet })) if node == to => return Some(packet),
                Ok(Some(other)) => debug!(event = ?other, "Live event"),
                Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Stop every node and wait for the tasks to finish
    pub async fn shutdown(self) {
        for entry in self.registry.iter() {
            let _ = entry.value().send(NodeInput::Shutdown);
        }
        for (peer, task) in self.tasks {
            if let Err(err) = task.await {
                warn!(peer = %peer, error = %err, "Node task failed");
            }
        }
        info!("Live network stopped");
    }
}
