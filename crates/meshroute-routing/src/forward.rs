//! The boundary between the engine and the packet-forwarding path
//!
//! The forwarding layer hands packets to the engine together with the
//! callbacks the engine should invoke once it has decided what to do with
//! them. Buffered packets carry their callbacks with them.

use std::fmt;

use meshroute_core::{DataPacket, DropReason, NodeAddr};

/// A resolved forwarding decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Final destination
    pub destination: NodeAddr,
    /// Local address the packet leaves from
    pub source: NodeAddr,
    /// Next hop (equals `destination` for one-hop routes)
    pub gateway: NodeAddr,
    /// Egress interface index
    pub interface: u32,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} (if {}, src {})",
            self.destination, self.gateway, self.interface, self.source
        )
    }
}

/// Invoked with the chosen route when a packet can be sent on
pub type ForwardCallback = Box<dyn FnOnce(Route, DataPacket) + Send>;

/// Invoked with the receiving interface when a packet is for this node
pub type LocalDeliverCallback = Box<dyn FnOnce(DataPacket, u32) + Send>;

/// Invoked when a packet is dropped
pub type ErrorCallback = Box<dyn FnOnce(DataPacket, DropReason) + Send>;

/// Upper-layer observer of route availability
///
/// Both methods default to doing nothing, so a listener only implements
/// what it cares about.
pub trait RouteListener: Send {
    /// A usable route to `destination` was installed
    fn on_route_available(&mut self, destination: NodeAddr, route: &Route) {
        let _ = (destination, route);
    }

    /// Discovery for `destination` was abandoned
    ///
    /// Reported once per destination, not once per buffered packet.
    fn on_route_unreachable(&mut self, destination: NodeAddr, reason: DropReason) {
        let _ = (destination, reason);
    }
}

/// What `route_output` did with a locally originated packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDecision {
    /// A route existed; the forward callback was invoked
    Forwarded(Route),
    /// The packet was buffered while a route is resolved
    Queued,
    /// The packet was refused; the error callback was invoked
    Dropped(DropReason),
}

/// What `route_input` did with a packet received from a neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDecision {
    /// The packet was handed to the local-deliver callback
    Delivered {
        /// A broadcast packet was also sent on through the forward callback
        rebroadcast: bool,
    },
    /// The packet was passed to the forward callback toward the next hop
    Forwarded(Route),
    /// The packet was dropped; the error callback was invoked unless the
    /// drop was a silent duplicate or loop suppression
    Dropped(DropReason),
}
