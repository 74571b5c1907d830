//! Core types for the meshroute simulation
//!
//! Peers are named by capital letters (A-Z). Each letter maps to a fixed
//! address in 10.0.0.0/24, so logs and routing tables can be read back as
//! letters.

use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshroute_core::{DataPacket, DropReason, NodeAddr, VirtualTime};
use meshroute_routing::{RoutingError, Timer};

/// Subnet-directed broadcast address shared by every simulated interface
pub const SUBNET_BROADCAST: NodeAddr = NodeAddr::new(10, 0, 0, 255);

/// Unique identifier for a peer in the network (A-Z)
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[display("{_0}")]
pub struct PeerId(pub char);

impl PeerId {
    /// Create a new PeerId from a capital letter
    pub fn new(c: char) -> Option<Self> {
        if c.is_ascii_uppercase() {
            Some(Self(c))
        } else {
            None
        }
    }

    /// Generate all peer IDs from A to the given letter (inclusive)
    pub fn range_to(end: char) -> Vec<Self> {
        ('A'..=end).filter_map(Self::new).collect()
    }

    /// The first `count` peers (A, B, C, ...), at most 26
    pub fn first(count: usize) -> Vec<Self> {
        ('A'..='Z').take(count).filter_map(Self::new).collect()
    }

    /// The address this peer uses on its single interface
    pub fn addr(&self) -> NodeAddr {
        NodeAddr::new(10, 0, 0, (self.0 as u8 - b'A') + 1)
    }

    /// The peer owning `addr`, if it is one of the 26 letter addresses
    pub fn from_addr(addr: NodeAddr) -> Option<Self> {
        match addr.octets() {
            [10, 0, 0, last @ 1..=26] => Self::new((b'A' + last - 1) as char),
            _ => None,
        }
    }
}

impl TryFrom<char> for PeerId {
    type Error = SimError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        Self::new(c.to_ascii_uppercase()).ok_or(SimError::InvalidPeer(c))
    }
}

/// Where a frame is headed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every current neighbor of the sender
    Broadcast,
    /// One neighbor
    Unicast(PeerId),
}

/// What travels over a simulated link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Encoded routing control message
    Control(Bytes),
    /// Data packet handed over by a forward callback
    Data(DataPacket),
}

/// Events processed by the discrete-event kernel
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// A routing timer of `node` is due
    Timer { node: PeerId, timer: Timer },
    /// `from` hands a frame to its link layer
    Transmit { from: PeerId, target: Target, frame: Frame },
    /// A frame arrives at `to`
    Deliver { from: PeerId, to: PeerId, frame: Frame },
    /// The link layer of `node` reports that a unicast to `neighbor` failed
    TxError { node: PeerId, neighbor: PeerId },
    /// The application on `from` sends a packet
    AppSend {
        id: u64,
        from: PeerId,
        to: PeerId,
        payload: Bytes,
    },
    /// A link comes up
    LinkUp(PeerId, PeerId),
    /// A link goes down
    LinkDown(PeerId, PeerId),
}

/// Things worth reporting about a simulation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkEvent {
    /// The application handed a packet to the engine
    Sent {
        packet_id: u64,
        from: PeerId,
        to: PeerId,
        at: VirtualTime,
    },
    /// A packet reached its destination
    Delivered {
        packet_id: u64,
        from: PeerId,
        to: PeerId,
        hops: u8,
        at: VirtualTime,
    },
    /// A packet was given up on
    Dropped {
        packet_id: u64,
        at_node: PeerId,
        reason: DropReason,
        at: VirtualTime,
    },
    /// A node learned a usable route
    RouteAvailable {
        node: PeerId,
        destination: NodeAddr,
        at: VirtualTime,
    },
    /// A node gave up on a destination
    RouteUnreachable {
        node: PeerId,
        destination: NodeAddr,
        reason: DropReason,
        at: VirtualTime,
    },
    /// A link changed state
    Link {
        a: PeerId,
        b: PeerId,
        up: bool,
        at: VirtualTime,
    },
}

/// Errors raised by the simulation
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid peer id {0:?}, expected a letter A-Z")]
    InvalidPeer(char),

    #[error("Unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("Routing error at {node}: {source}")]
    Routing {
        node: PeerId,
        #[source]
        source: RoutingError,
    },

    #[error("Invalid simulation config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Live network is shut down")]
    Shutdown,
}

/// Simulation result type
pub type SimResult<T> = Result<T, SimError>;
