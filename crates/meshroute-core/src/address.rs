//! Network addresses
//!
//! Addresses are opaque 32-bit identifiers. They print as dotted quads so
//! log output reads like an IPv4 trace, but nothing in the engine assumes
//! IP semantics beyond the all-ones broadcast address.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A node or interface address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddr(pub u32);

impl NodeAddr {
    /// The limited broadcast address (255.255.255.255)
    pub const BROADCAST: NodeAddr = NodeAddr(u32::MAX);

    /// The unspecified address (0.0.0.0)
    pub const UNSPECIFIED: NodeAddr = NodeAddr(0);

    /// Build an address from four octets
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(u32::from_be_bytes([a, b, c, d]))
    }

    /// The four octets of this address
    pub const fn octets(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Check if this is the limited broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Check if this is the unspecified address
    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets();
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl From<[u8; 4]> for NodeAddr {
    fn from(octets: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(octets))
    }
}

/// A local network interface as seen by the routing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Interface index
    pub index: u32,
    /// Local address bound to the interface
    pub local: NodeAddr,
    /// Subnet-directed broadcast address of the interface
    pub broadcast: NodeAddr,
}

impl InterfaceInfo {
    /// Create an interface descriptor
    pub fn new(index: u32, local: NodeAddr, broadcast: NodeAddr) -> Self {
        Self {
            index,
            local,
            broadcast,
        }
    }

    /// Check if an address is a broadcast destination on this interface
    pub fn is_broadcast_for(&self, addr: NodeAddr) -> bool {
        addr.is_broadcast() || addr == self.broadcast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_dotted_quad() {
        let addr = NodeAddr::new(10, 0, 0, 7);
        assert_eq!(addr.to_string(), "10.0.0.7");
        assert_eq!(NodeAddr::BROADCAST.to_string(), "255.255.255.255");
    }

    #[test]
    fn test_octets_roundtrip() {
        let addr = NodeAddr::from([192, 168, 1, 20]);
        assert_eq!(addr.octets(), [192, 168, 1, 20]);
        assert_eq!(addr, NodeAddr::new(192, 168, 1, 20));
    }

    #[test]
    fn test_broadcast_detection() {
        let iface = InterfaceInfo::new(1, NodeAddr::new(10, 0, 0, 1), NodeAddr::new(10, 0, 0, 255));
        assert!(iface.is_broadcast_for(NodeAddr::BROADCAST));
        assert!(iface.is_broadcast_for(NodeAddr::new(10, 0, 0, 255)));
        assert!(!iface.is_broadcast_for(NodeAddr::new(10, 0, 0, 2)));
        assert!(NodeAddr::UNSPECIFIED.is_unspecified());
    }

    #[test]
    fn test_ordering_follows_numeric_value() {
        assert!(NodeAddr::new(10, 0, 0, 1) < NodeAddr::new(10, 0, 0, 2));
        assert!(NodeAddr::new(10, 0, 1, 0) > NodeAddr::new(10, 0, 0, 255));
    }
}
