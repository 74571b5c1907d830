//! Protocol-agnostic engine facade
//!
//! Hosts (the simulator, the live runtime) drive a [`RoutingEngine`]
//! without caring which protocol runs underneath.

use meshroute_core::{Clock, DataPacket, NodeAddr, TimerHandle, Transport};

use crate::aodv::AodvEngine;
use crate::config::RoutingMode;
use crate::dsdv::DsdvEngine;
use crate::error::RoutingResult;
use crate::forward::{
    ErrorCallback, ForwardCallback, InputDecision, LocalDeliverCallback, OutputDecision,
    RouteListener,
};
use crate::table::RoutingTable;
use crate::timer::Timer;

/// A routing engine running either protocol
pub enum RoutingEngine<C, X> {
    /// On-demand discovery
    Reactive(AodvEngine<C, X>),
    /// Periodic table exchange
    Periodic(DsdvEngine<C, X>),
}

impl<C, X> RoutingEngine<C, X>
where
    C: Clock<Timer>,
    X: Transport,
{
    /// Build the engine selected by `mode`
    pub fn new(mode: RoutingMode, clock: C, transport: X) -> RoutingResult<Self> {
        Ok(match mode {
            RoutingMode::Reactive(config) => {
                RoutingEngine::Reactive(AodvEngine::new(config, clock, transport)?)
            }
            RoutingMode::Periodic(config) => {
                RoutingEngine::Periodic(DsdvEngine::new(config, clock, transport)?)
            }
        })
    }

    /// Protocol name for logs and reports
    pub fn protocol(&self) -> &'static str {
        match self {
            RoutingEngine::Reactive(_) => "aodv",
            RoutingEngine::Periodic(_) => "dsdv",
        }
    }

    pub fn start(&mut self) -> RoutingResult<()> {
        match self {
            RoutingEngine::Reactive(engine) => engine.start(),
            RoutingEngine::Periodic(engine) => engine.start(),
        }
    }

    pub fn stop(&mut self) {
        match self {
            RoutingEngine::Reactive(engine) => engine.stop(),
            RoutingEngine::Periodic(engine) => engine.stop(),
        }
    }

    pub fn is_started(&self) -> bool {
        match self {
            RoutingEngine::Reactive(engine) => engine.is_started(),
            RoutingEngine::Periodic(engine) => engine.is_started(),
        }
    }

    pub fn route_output(
        &mut self,
        packet: DataPacket,
        forward: ForwardCallback,
        error: ErrorCallback,
    ) -> RoutingResult<OutputDecision> {
        match self {
            RoutingEngine::Reactive(engine) => engine.route_output(packet, forward, error),
            RoutingEngine::Periodic(engine) => engine.route_output(packet, forward, error),
        }
    }

    pub fn route_input(
        &mut self,
        packet: DataPacket,
        interface: u32,
        from: NodeAddr,
        forward: ForwardCallback,
        deliver: LocalDeliverCallback,
        error: ErrorCallback,
    ) -> RoutingResult<InputDecision> {
        match self {
            RoutingEngine::Reactive(engine) => {
                engine.route_input(packet, interface, from, forward, deliver, error)
            }
            RoutingEngine::Periodic(engine) => {
                engine.route_input(packet, interface, from, forward, deliver, error)
            }
        }
    }

    /// Handle a control frame from neighbor `src`
    pub fn receive(&mut self, interface: u32, src: NodeAddr, payload: &[u8]) -> RoutingResult<()> {
        match self {
            RoutingEngine::Reactive(engine) => engine.receive(interface, src, payload),
            RoutingEngine::Periodic(engine) => engine.receive(interface, src, payload),
        }
    }

    pub fn handle_timer(&mut self, handle: TimerHandle, timer: Timer) -> RoutingResult<()> {
        match self {
            RoutingEngine::Reactive(engine) => engine.handle_timer(handle, timer),
            RoutingEngine::Periodic(engine) => engine.handle_timer(handle, timer),
        }
    }

    /// Link-layer report that a unicast to `neighbor` failed
    pub fn notify_tx_error(&mut self, neighbor: NodeAddr) -> RoutingResult<()> {
        match self {
            RoutingEngine::Reactive(engine) => engine.notify_tx_error(neighbor),
            RoutingEngine::Periodic(engine) => engine.notify_tx_error(neighbor),
        }
    }

    pub fn routing_table(&self) -> &RoutingTable {
        match self {
            RoutingEngine::Reactive(engine) => engine.routing_table(),
            RoutingEngine::Periodic(engine) => engine.routing_table(),
        }
    }

    pub fn set_listener(&mut self, listener: Box<dyn RouteListener>) {
        match self {
            RoutingEngine::Reactive(engine) => engine.set_listener(listener),
            RoutingEngine::Periodic(engine) => engine.set_listener(listener),
        }
    }

    pub fn local_address(&self) -> NodeAddr {
        match self {
            RoutingEngine::Reactive(engine) => engine.local_address(),
            RoutingEngine::Periodic(engine) => engine.local_address(),
        }
    }

    /// Number of packets waiting for a route
    pub fn queued_packets(&self) -> usize {
        match self {
            RoutingEngine::Reactive(engine) => engine.queued_packets(),
            RoutingEngine::Periodic(engine) => engine.queued_packets(),
        }
    }
}
