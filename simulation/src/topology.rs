//! Mesh topology definitions
//!
//! Provides functions to create various network topologies:
//! - Ring: Each peer connected to neighbors
//! - Full mesh: Every peer connected to every other
//! - Line and star
//! - Random: Configurable connection probability
//! - Custom: Build from edge list
//!
//! Links are bidirectional. A link can carry its own latency; links
//! without one use the simulation-wide default.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::time::Duration;

use rand::Rng;

use crate::types::{PeerId, SimError, SimResult};

/// A mesh network topology
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Adjacency list; every peer has an entry, possibly empty
    adjacency: BTreeMap<PeerId, BTreeSet<PeerId>>,
    /// Per-link latency overrides, keyed by the normalized pair
    latencies: BTreeMap<(PeerId, PeerId), Duration>,
}

fn key(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
    if a < b { (a, b) } else { (b, a) }
}

impl Mesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer to the mesh
    pub fn add_peer(&mut self, id: PeerId) {
        self.adjacency.entry(id).or_default();
    }

    /// Add a bidirectional connection between two peers
    pub fn connect(&mut self, a: PeerId, b: PeerId) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    /// Add a connection with its own latency
    pub fn connect_with_latency(&mut self, a: PeerId, b: PeerId, latency: Duration) {
        self.connect(a, b);
        if a != b {
            self.latencies.insert(key(a, b), latency);
        }
    }

    /// Remove the connection between two peers; returns whether it existed
    pub fn disconnect(&mut self, a: PeerId, b: PeerId) -> bool {
        let removed = self
            .adjacency
            .get_mut(&a)
            .map(|neighbors| neighbors.remove(&b))
            .unwrap_or(false);
        if let Some(neighbors) = self.adjacency.get_mut(&b) {
            neighbors.remove(&a);
        }
        removed
    }

    /// Get all neighbors of a peer
    pub fn neighbors(&self, peer: PeerId) -> Option<&BTreeSet<PeerId>> {
        self.adjacency.get(&peer)
    }

    /// Check if two peers are directly connected
    pub fn are_connected(&self, a: PeerId, b: PeerId) -> bool {
        self.adjacency
            .get(&a)
            .map(|neighbors| neighbors.contains(&b))
            .unwrap_or(false)
    }

    /// Latency override for the link between two peers
    pub fn latency(&self, a: PeerId, b: PeerId) -> Option<Duration> {
        self.latencies.get(&key(a, b)).copied()
    }

    /// Check if the mesh contains a peer
    pub fn contains(&self, peer: PeerId) -> bool {
        self.adjacency.contains_key(&peer)
    }

    /// Get all peer IDs
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.adjacency.keys().copied().collect()
    }

    /// Get number of peers
    pub fn peer_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Get number of connections (edges)
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Hop distance between two peers over current links (breadth-first)
    pub fn hop_distance(&self, from: PeerId, to: PeerId) -> Option<usize> {
        let mut seen = BTreeSet::from([from]);
        let mut frontier = vec![from];
        let mut hops = 0;
        while !frontier.is_empty() {
            if frontier.contains(&to) {
                return Some(hops);
            }
            hops += 1;
            let mut next = Vec::new();
            for peer in frontier {
                for neighbor in self.neighbors(peer).into_iter().flatten() {
                    if seen.insert(*neighbor) {
                        next.push(*neighbor);
                    }
                }
            }
            frontier = next;
        }
        None
    }

    /// Print a simple ASCII visualization of the mesh
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Mesh Topology:\n");
        let _ = writeln!(output, "  Peers: {}", self.peer_count());
        let _ = writeln!(output, "  Edges: {}\n", self.edge_count());

        for (peer_id, neighbors) in &self.adjacency {
            let neighbor_str: Vec<String> = neighbors.iter().map(|n| n.to_string()).collect();
            let _ = writeln!(
                output,
                "  {} ({}) -> [{}]",
                peer_id,
                peer_id.addr(),
                neighbor_str.join(", ")
            );
        }
        output
    }
}

/// Builder for creating mesh topologies
pub struct MeshBuilder {
    peers: Vec<PeerId>,
}

impl MeshBuilder {
    /// Create a builder with the given number of peers (A, B, C, ...)
    ///
    /// Counts above 26 are capped at 26.
    pub fn new(peer_count: usize) -> Self {
        Self {
            peers: PeerId::first(peer_count.min(26)),
        }
    }

    fn empty(&self) -> Mesh {
        let mut mesh = Mesh::new();
        for peer in &self.peers {
            mesh.add_peer(*peer);
        }
        mesh
    }

    /// Build a ring topology where each peer is connected to its neighbors
    ///
    /// A - B - C - D - ... - A
    pub fn ring(self) -> Mesh {
        let mut mesh = self.empty();
        let peers = &self.peers;
        for i in 0..peers.len() {
            mesh.connect(peers[i], peers[(i + 1) % peers.len()]);
        }
        mesh
    }

    /// Build a full mesh where every peer is connected to every other
    pub fn full_mesh(self) -> Mesh {
        let mut mesh = self.empty();
        let peers = &self.peers;
        for i in 0..peers.len() {
            for j in (i + 1)..peers.len() {
                mesh.connect(peers[i], peers[j]);
            }
        }
        mesh
    }

    /// Build a line topology: A - B - C - D - ...
    pub fn line(self) -> Mesh {
        let mut mesh = self.empty();
        for pair in self.peers.windows(2) {
            mesh.connect(pair[0], pair[1]);
        }
        mesh
    }

    /// Build a star topology: A in center, connected to all others
    pub fn star(self) -> Mesh {
        let mut mesh = self.empty();
        if let Some((center, rest)) = self.peers.split_first() {
            for peer in rest {
                mesh.connect(*center, *peer);
            }
        }
        mesh
    }

    /// Build a random mesh with given connection probability
    ///
    /// Isolated peers get one extra edge so every peer has a neighbor.
    pub fn random(self, connection_probability: f64) -> Mesh {
        let mut mesh = self.empty();
        let mut rng = rand::rng();
        let peers = &self.peers;

        for i in 0..peers.len() {
            for j in (i + 1)..peers.len() {
                if rng.random::<f64>() < connection_probability {
                    mesh.connect(peers[i], peers[j]);
                }
            }
        }

        if peers.len() > 1 {
            for (i, peer) in peers.iter().enumerate() {
                if mesh.neighbors(*peer).is_none_or(BTreeSet::is_empty) {
                    let offset = rng.random_range(1..peers.len());
                    mesh.connect(*peer, peers[(i + offset) % peers.len()]);
                }
            }
        }

        mesh
    }

    /// Build a named topology: ring, full, line, star or random
    pub fn named(self, name: &str, connection_probability: f64) -> Option<Mesh> {
        match name {
            "ring" => Some(self.ring()),
            "full" => Some(self.full_mesh()),
            "line" => Some(self.line()),
            "star" => Some(self.star()),
            "random" => Some(self.random(connection_probability)),
            _ => None,
        }
    }
}

/// Create a custom mesh from an edge list
pub fn from_edges(edges: &[(char, char)]) -> SimResult<Mesh> {
    let mut mesh = Mesh::new();
    for (a, b) in edges {
        let peer_a = PeerId::new(*a).ok_or(SimError::InvalidPeer(*a))?;
        let peer_b = PeerId::new(*b).ok_or(SimError::InvalidPeer(*b))?;
        mesh.connect(peer_a, peer_b);
    }
    Ok(mesh)
}
