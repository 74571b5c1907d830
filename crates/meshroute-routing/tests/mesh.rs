//! Multi-node tests for meshroute-routing
//!
//! A small lockstep harness wires several engines together over
//! zero-latency links: every frame a node sends is handed to its current
//! neighbors before the next timer fires.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use meshroute_core::{
    Clock, DataPacket, DropReason, ManualClock, MockTransport, NodeAddr, PacketHeader, VirtualTime,
};
use meshroute_routing::{
    AodvConfig, DsdvConfig, ErrorCallback, ForwardCallback, LocalDeliverCallback, OutputDecision,
    Route, RouteListener, RoutingEngine, RoutingMode, Timer,
};

type Engine = RoutingEngine<Arc<ManualClock<Timer>>, Arc<MockTransport>>;
type Outbox = Arc<Mutex<Vec<(NodeAddr, Route, DataPacket)>>>;
type Delivered = Arc<Mutex<Vec<(NodeAddr, DataPacket)>>>;
type Dropped = Arc<Mutex<Vec<(NodeAddr, DropReason)>>>;

fn addr(c: char) -> NodeAddr {
    NodeAddr::new(10, 0, 0, (c as u8 - b'A') + 1)
}

struct Node {
    engine: Engine,
    clock: Arc<ManualClock<Timer>>,
    transport: Arc<MockTransport>,
}

struct Mesh {
    nodes: BTreeMap<NodeAddr, Node>,
    links: BTreeSet<(NodeAddr, NodeAddr)>,
    now: VirtualTime,
    outbox: Outbox,
    delivered: Delivered,
    dropped: Dropped,
}

impl Mesh {
    fn new(peers: &str, edges: &[(char, char)], mode: RoutingMode) -> Self {
        let mut nodes = BTreeMap::new();
        for c in peers.chars() {
            let clock = Arc::new(ManualClock::new());
            let transport = Arc::new(MockTransport::single(addr(c)));
            let mut engine =
                RoutingEngine::new(mode.clone(), clock.clone(), transport.clone()).unwrap();
            engine.start().unwrap();
            nodes.insert(addr(c), Node { engine, clock, transport });
        }
        let mut mesh = Self {
            nodes,
            links: BTreeSet::new(),
            now: VirtualTime::ZERO,
            outbox: Arc::new(Mutex::new(Vec::new())),
            delivered: Arc::new(Mutex::new(Vec::new())),
            dropped: Arc::new(Mutex::new(Vec::new())),
        };
        for (a, b) in edges {
            mesh.connect(*a, *b);
        }
        mesh
    }

    fn connect(&mut self, a: char, b: char) {
        self.links.insert((addr(a), addr(b)));
        self.links.insert((addr(b), addr(a)));
    }

    fn disconnect(&mut self, a: char, b: char) {
        self.links.remove(&(addr(a), addr(b)));
        self.links.remove(&(addr(b), addr(a)));
    }

    fn adjacent(&self, a: NodeAddr, b: NodeAddr) -> bool {
        self.links.contains(&(a, b))
    }

    fn engine(&self, c: char) -> &Engine {
        &self.nodes[&addr(c)].engine
    }

    fn node_mut(&mut self, at: NodeAddr) -> &mut Node {
        let now = self.now;
        let node = self.nodes.get_mut(&at).unwrap();
        let lag = node.clock.now().until(now);
        if !lag.is_zero() {
            node.clock.advance(lag);
        }
        node
    }

    fn callbacks(&self, at: NodeAddr) -> (ForwardCallback, LocalDeliverCallback, ErrorCallback) {
        let outbox = self.outbox.clone();
        let delivered = self.delivered.clone();
        let dropped = self.dropped.clone();
        (
            Box::new(move |route, packet| outbox.lock().push((at, route, packet))),
            Box::new(move |packet, _| delivered.lock().push((at, packet))),
            Box::new(move |_, reason| dropped.lock().push((at, reason))),
        )
    }

    fn send(&mut self, src: char, dst: char, id: u64) -> OutputDecision {
        let at = addr(src);
        let packet = DataPacket::new(PacketHeader::new(id, at, addr(dst)), vec![1, 2, 3]);
        let (forward, _, error) = self.callbacks(at);
        let decision = self
            .node_mut(at)
            .engine
            .route_output(packet, forward, error)
            .unwrap();
        self.settle();
        decision
    }

    /// Deliver every pending frame and data packet until the mesh is quiet
    fn settle(&mut self) {
        loop {
            let mut progressed = false;

            let senders: Vec<NodeAddr> = self.nodes.keys().copied().collect();
            for from in senders {
                let frames = self.nodes[&from].transport.take_sent();
                for frame in frames {
                    progressed = true;
                    let targets: Vec<NodeAddr> = match frame.dest {
                        Some(dest) if self.adjacent(from, dest) => vec![dest],
                        Some(_) => Vec::new(),
                        None => self
                            .nodes
                            .keys()
                            .copied()
                            .filter(|n| self.adjacent(from, *n))
                            .collect(),
                    };
                    for to in targets {
                        self.node_mut(to)
                            .engine
                            .receive(1, from, &frame.payload)
                            .unwrap();
                    }
                }
            }

            let data: Vec<_> = self.outbox.lock().drain(..).collect();
            for (from, route, packet) in data {
                progressed = true;
                if !self.adjacent(from, route.gateway) {
                    self.dropped.lock().push((from, DropReason::LinkFailure));
                    self.node_mut(from).engine.notify_tx_error(route.gateway).unwrap();
                    continue;
                }
                let (forward, deliver, error) = self.callbacks(route.gateway);
                self.node_mut(route.gateway)
                    .engine
                    .route_input(packet, 1, from, forward, deliver, error)
                    .unwrap();
            }

            if !progressed {
                break;
            }
        }
    }

    /// Fire timers in time order across all nodes up to `deadline`
    fn run_until(&mut self, deadline: VirtualTime) {
        loop {
            self.settle();
            let next = self
                .nodes
                .iter()
                .filter_map(|(at, node)| node.clock.next_due().map(|due| (due.max(self.now), *at)))
                .filter(|(due, _)| *due <= deadline)
                .min();
            let Some((due, at)) = next else {
                break;
            };
            self.now = due;
            let node = self.node_mut(at);
            if let Some((handle, timer)) = node.clock.pop_due(due) {
                node.engine.handle_timer(handle, timer).unwrap();
            }
        }
        self.now = deadline;
        for at in self.nodes.keys().copied().collect::<Vec<_>>() {
            self.node_mut(at);
        }
    }

    fn delivered_to(&self, c: char) -> usize {
        self.delivered
            .lock()
            .iter()
            .filter(|(at, _)| *at == addr(c))
            .count()
    }
}

/// Records destinations given up on
struct GiveUps(Arc<Mutex<Vec<(NodeAddr, DropReason)>>>);

impl RouteListener for GiveUps {
    fn on_route_unreachable(&mut self, destination: NodeAddr, reason: DropReason) {
        self.0.lock().push((destination, reason));
    }
}

fn quiet_aodv() -> RoutingMode {
    RoutingMode::Reactive(AodvConfig::default().with_hello(false))
}

#[test]
fn test_aodv_discovers_multi_hop_route() {
    let mut mesh = Mesh::new("ABCD", &[('A', 'B'), ('B', 'C'), ('C', 'D')], quiet_aodv());

    let decision = mesh.send('A', 'D', 1);
    assert_eq!(decision, OutputDecision::Queued);
    assert_eq!(mesh.delivered_to('D'), 1);

    let now = VirtualTime::ZERO;
    let route = mesh.engine('A').routing_table().lookup_valid_route(addr('D'), now).unwrap();
    assert_eq!(route.next_hop, addr('B'));
    assert_eq!(route.hop_count, 3);

    let back = mesh.engine('D').routing_table().lookup_valid_route(addr('A'), now).unwrap();
    assert_eq!(back.next_hop, addr('C'));
    assert_eq!(back.hop_count, 3);

    // Second packet rides the installed route
    let decision = mesh.send('A', 'D', 2);
    assert!(matches!(decision, OutputDecision::Forwarded(r) if r.gateway == addr('B')));
    assert_eq!(mesh.delivered_to('D'), 2);
}

#[test]
fn test_aodv_link_break_propagates_route_error() {
    let mut mesh = Mesh::new("ABCD", &[('A', 'B'), ('B', 'C'), ('C', 'D')], quiet_aodv());
    mesh.send('A', 'D', 1);
    assert_eq!(mesh.delivered_to('D'), 1);

    mesh.disconnect('C', 'D');
    mesh.send('A', 'D', 2);

    assert_eq!(mesh.delivered_to('D'), 1);
    let now = VirtualTime::ZERO;
    assert!(mesh.engine('C').routing_table().lookup_valid_route(addr('D'), now).is_none());
    assert!(mesh.engine('B').routing_table().lookup_valid_route(addr('D'), now).is_none());
    assert!(mesh.engine('A').routing_table().lookup_valid_route(addr('D'), now).is_none());
    // Routes to the upstream nodes survive
    assert!(mesh.engine('A').routing_table().lookup_valid_route(addr('B'), now).is_some());
}

#[test]
fn test_aodv_unreachable_destination_gives_up() {
    let mut mesh = Mesh::new("ABC", &[('A', 'B')], quiet_aodv());
    let give_ups = Arc::new(Mutex::new(Vec::new()));
    mesh.node_mut(addr('A'))
        .engine
        .set_listener(Box::new(GiveUps(give_ups.clone())));

    assert_eq!(mesh.send('A', 'C', 1), OutputDecision::Queued);
    mesh.run_until(VirtualTime::from_secs(30));

    assert_eq!(mesh.delivered_to('C'), 0);
    assert_eq!(mesh.engine('A').queued_packets(), 0);
    assert!(mesh.engine('A').routing_table().lookup_route(addr('C')).is_none());
    assert_eq!(*give_ups.lock(), vec![(addr('C'), DropReason::RetriesExhausted)]);
}

#[test]
fn test_dsdv_ring_converges() {
    let ring = [('A', 'B'), ('B', 'C'), ('C', 'D'), ('D', 'A')];
    let mut mesh = Mesh::new("ABCD", &ring, RoutingMode::Periodic(DsdvConfig::default()));

    mesh.run_until(VirtualTime::from_secs(20));

    let now = VirtualTime::from_secs(20);
    for (node, opposite) in [('A', 'C'), ('B', 'D'), ('C', 'A'), ('D', 'B')] {
        let table = mesh.engine(node).routing_table();
        let far = table.lookup_valid_route(addr(opposite), now).unwrap();
        assert_eq!(far.hop_count, 2, "{node} -> {opposite}");
        for other in ['A', 'B', 'C', 'D'] {
            if other != node {
                assert!(table.lookup_valid_route(addr(other), now).is_some(), "{node} -> {other}");
            }
        }
    }

    mesh.send('A', 'C', 9);
    assert_eq!(mesh.delivered_to('C'), 1);
}

#[test]
fn test_dsdv_withdraws_routes_after_link_loss() {
    let line = [('A', 'B'), ('B', 'C')];
    let mut mesh = Mesh::new("ABC", &line, RoutingMode::Periodic(DsdvConfig::default()));
    mesh.run_until(VirtualTime::from_secs(20));
    assert!(mesh.engine('A').routing_table().lookup_route(addr('C')).is_some());

    mesh.disconnect('B', 'C');
    mesh.send('A', 'C', 3);
    mesh.run_until(VirtualTime::from_secs(20) + Duration::from_millis(50));

    assert_eq!(mesh.delivered_to('C'), 0);
    assert!(mesh.engine('B').routing_table().lookup_route(addr('C')).is_none());
    assert!(mesh.engine('A').routing_table().lookup_route(addr('C')).is_none());
}
