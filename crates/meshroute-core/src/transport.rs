//! Transport abstraction
//!
//! The routing engine emits control messages through a [`Transport`]. The
//! receive side is the engine's own `receive` entry point: whoever owns the
//! engine (the simulation kernel or a tokio actor) calls it with every
//! control frame that arrives for this node.

use std::sync::Arc;

use bytes::Bytes;

use crate::address::{InterfaceInfo, NodeAddr};
use crate::error::TransportError;

/// Unicast/broadcast datagram transport
pub trait Transport {
    /// Send a payload to a single neighbor through the given interface
    fn send_unicast(&self, interface: u32, dest: NodeAddr, payload: Bytes) -> Result<(), TransportError>;

    /// Broadcast a payload to every neighbor on the given interface
    fn send_broadcast(&self, interface: u32, payload: Bytes) -> Result<(), TransportError>;

    /// Enumerate the interfaces the engine may use
    fn interfaces(&self) -> Vec<InterfaceInfo>;

    /// Find the interface with the given index
    fn interface(&self, index: u32) -> Option<InterfaceInfo> {
        self.interfaces().into_iter().find(|i| i.index == index)
    }
}

impl<X: Transport + ?Sized> Transport for Arc<X> {
    fn send_unicast(&self, interface: u32, dest: NodeAddr, payload: Bytes) -> Result<(), TransportError> {
        (**self).send_unicast(interface, dest, payload)
    }

    fn send_broadcast(&self, interface: u32, payload: Bytes) -> Result<(), TransportError> {
        (**self).send_broadcast(interface, payload)
    }

    fn interfaces(&self) -> Vec<InterfaceInfo> {
        (**self).interfaces()
    }
}
