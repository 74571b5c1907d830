//! Control messages exchanged between routing engines
//!
//! Every message is a serde type carried inside [`ControlMessage`] and put
//! on the wire with postcard. The layout is not meant to be compatible
//! with any other implementation; only `decode(encode(m)) == m` matters.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use meshroute_core::{CodecError, NodeAddr};

/// Most destinations a single route error may carry
pub const MAX_UNREACHABLE: usize = 255;

/// Route request (RREQ)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Ask the destination to send a gratuitous reply to the origin
    pub gratuitous_reply: bool,
    /// Only the destination itself may answer
    pub destination_only: bool,
    /// The origin knows no sequence number for the destination
    pub unknown_seq_no: bool,
    /// Hops travelled so far
    pub hop_count: u8,
    /// Request id, unique per origin
    pub id: u32,
    /// Sought destination
    pub destination: NodeAddr,
    /// Last known destination sequence number
    pub dest_seq_no: u32,
    /// Originating node
    pub origin: NodeAddr,
    /// Origin's own sequence number
    pub origin_seq_no: u32,
    /// Remaining flood radius
    pub ttl: u8,
}

/// Route reply (RREP); a hello when `destination == origin`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteReply {
    /// Subnet prefix size, zero for host routes
    pub prefix_size: u8,
    /// Hops from the replying node to the destination
    pub hop_count: u8,
    /// The destination the route leads to
    pub destination: NodeAddr,
    /// Destination sequence number
    pub dest_seq_no: u32,
    /// Node that asked for the route
    pub origin: NodeAddr,
    /// Route lifetime in milliseconds
    pub lifetime_ms: u32,
    /// The receiving neighbor must answer with [`ControlMessage::RrepAck`]
    pub ack_required: bool,
    /// Remaining hops the reply may travel
    pub ttl: u8,
}

impl RouteReply {
    /// Check if this reply is a hello beacon
    pub fn is_hello(&self) -> bool {
        self.destination == self.origin
    }
}

/// Route error (RERR)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteError {
    /// Upstream nodes must not delete the route (local repair in progress)
    pub no_delete: bool,
    unreachable: Vec<(NodeAddr, u32)>,
}

impl RouteError {
    /// Create an empty error
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unreachable destination
    ///
    /// Returns `false` when the message is already full. A destination
    /// already present is not added twice.
    pub fn add_unreachable(&mut self, destination: NodeAddr, seq_no: u32) -> bool {
        if self.unreachable.iter().any(|(dst, _)| *dst == destination) {
            return true;
        }
        if self.unreachable.len() >= MAX_UNREACHABLE {
            return false;
        }
        self.unreachable.push((destination, seq_no));
        true
    }

    /// Remove and return the first unreachable destination
    pub fn remove_unreachable(&mut self) -> Option<(NodeAddr, u32)> {
        if self.unreachable.is_empty() {
            None
        } else {
            Some(self.unreachable.remove(0))
        }
    }

    /// Unreachable destinations with their sequence numbers
    pub fn unreachable(&self) -> &[(NodeAddr, u32)] {
        &self.unreachable
    }

    /// Number of destinations carried
    pub fn dest_count(&self) -> usize {
        self.unreachable.len()
    }

    /// Check if no destination is carried
    pub fn is_empty(&self) -> bool {
        self.unreachable.is_empty()
    }

    /// Check if no more destinations fit
    pub fn is_full(&self) -> bool {
        self.unreachable.len() >= MAX_UNREACHABLE
    }
}

/// One advertised route in a periodic table update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsdvEntry {
    /// Advertised destination
    pub destination: NodeAddr,
    /// Destination sequence number; odd means unreachable
    pub seq_no: u32,
    /// Hops from the advertising node
    pub hop_count: u16,
}

/// Full or incremental periodic table update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsdvUpdate {
    /// The advertised routes
    pub entries: Vec<DsdvEntry>,
}

/// Any control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Route request
    Rreq(RouteRequest),
    /// Route reply or hello
    Rrep(RouteReply),
    /// Route error
    Rerr(RouteError),
    /// Acknowledgement of a reply that asked for one
    RrepAck,
    /// Periodic table update
    Update(DsdvUpdate),
}

impl ControlMessage {
    /// Serialize for the transport
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        meshroute_core::encode(self)
    }

    /// Parse a received payload
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        meshroute_core::decode(bytes)
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Rreq(_) => "RREQ",
            ControlMessage::Rrep(r) if r.is_hello() => "HELLO",
            ControlMessage::Rrep(_) => "RREP",
            ControlMessage::Rerr(_) => "RERR",
            ControlMessage::RrepAck => "RREP-ACK",
            ControlMessage::Update(_) => "UPDATE",
        }
    }
}
