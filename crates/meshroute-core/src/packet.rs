//! Data packets
//!
//! A [`DataPacket`] is what the upper layer asks the engine to route. The
//! engine only ever reads the [`PacketHeader`]; the payload is opaque.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::address::NodeAddr;

/// Default hop budget for data packets
pub const DEFAULT_TTL: u8 = 64;

/// Routing header of a data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketHeader {
    /// Identifier unique per source
    pub id: u64,
    /// Originating node
    pub source: NodeAddr,
    /// Final destination
    pub destination: NodeAddr,
    /// Remaining hop budget
    pub ttl: u8,
}

impl PacketHeader {
    /// Create a header with the default TTL
    pub fn new(id: u64, source: NodeAddr, destination: NodeAddr) -> Self {
        Self {
            id,
            source,
            destination,
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A data packet awaiting routing or in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    /// The routing header
    pub header: PacketHeader,
    /// Opaque application payload
    pub payload: Bytes,
}

impl DataPacket {
    /// Create a new packet
    pub fn new(header: PacketHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// The packet's final destination
    pub fn destination(&self) -> NodeAddr {
        self.header.destination
    }

    /// The packet's originating node
    pub fn source(&self) -> NodeAddr {
        self.header.source
    }
}

impl fmt::Display for DataPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} -> {} (ttl {})",
            self.header.source, self.header.id, self.header.destination, self.header.ttl
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_accessors() {
        let src = NodeAddr::new(10, 0, 0, 1);
        let dst = NodeAddr::new(10, 0, 0, 4);
        let packet = DataPacket::new(PacketHeader::new(7, src, dst).with_ttl(3), &b"hi"[..]);

        assert_eq!(packet.source(), src);
        assert_eq!(packet.destination(), dst);
        assert_eq!(packet.header.ttl, 3);
        assert_eq!(packet.to_string(), "10.0.0.1#7 -> 10.0.0.4 (ttl 3)");
    }
}
