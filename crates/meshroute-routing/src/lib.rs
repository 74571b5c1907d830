//! # Meshroute Routing
//!
//! Distance-vector routing engines for ad-hoc meshes.
//!
//! Two disciplines share one set of data structures:
//!
//! - [`AodvEngine`]: reactive. Routes are discovered on demand with
//!   flooded route requests and maintained with route errors sent to
//!   precursors.
//! - [`DsdvEngine`]: periodic. Every node advertises its whole table on a
//!   timer and pushes triggered updates for changes, with destination
//!   sequence numbers that are even while reachable and odd when broken.
//!
//! [`RoutingEngine`] wraps either behind one API. The engines never block
//! or own a thread; hosts inject a [`Clock`](meshroute_core::Clock) and a
//! [`Transport`](meshroute_core::Transport) and call back into the engine
//! when a frame arrives or a [`Timer`] fires.
//!
//! ## Core Components
//!
//! - [`RoutingTable`]: one entry per destination, with precursors,
//!   hold-down and blacklisting
//! - [`PacketQueue`]: bounded buffer for packets awaiting a route
//! - [`NeighborTable`]: one-hop neighbors and their expiry
//! - [`DuplicateCache`] / [`BroadcastIdCache`]: flood suppression
//! - [`ControlMessage`]: RREQ, RREP, RERR, RREP-ACK and table updates
//!
//! ## Example
//!
//! ```rust,ignore
//! use meshroute_routing::{RoutingEngine, RoutingMode};
//!
//! let mut engine = RoutingEngine::new(RoutingMode::reactive(), clock, transport)?;
//! engine.start()?;
//!
//! match engine.route_output(packet, forward, error)? {
//!     OutputDecision::Forwarded(route) => { /* sent via route.gateway */ }
//!     OutputDecision::Queued => { /* discovery running */ }
//!     OutputDecision::Dropped(reason) => { /* error callback already ran */ }
//! }
//! ```

pub mod aodv;
pub mod config;
pub mod dsdv;
pub mod dup;
pub mod engine;
pub mod error;
pub mod forward;
pub mod messages;
pub mod neighbor;
pub mod queue;
pub mod seqno;
pub mod table;
pub mod timer;

// Re-export main types
pub use aodv::AodvEngine;
pub use config::{AodvConfig, DsdvConfig, RoutingMode};
pub use dsdv::{DsdvEngine, weighted_settling_time};
pub use dup::{BroadcastIdCache, DuplicateCache};
pub use engine::RoutingEngine;
pub use error::{RoutingError, RoutingResult};
pub use forward::{
    ErrorCallback, ForwardCallback, InputDecision, LocalDeliverCallback, OutputDecision, Route,
    RouteListener,
};
pub use messages::{ControlMessage, DsdvEntry, DsdvUpdate, RouteError, RouteReply, RouteRequest};
pub use neighbor::NeighborTable;
pub use queue::{PacketQueue, QueueEntry};
pub use table::{RouteFlag, RoutingTable, RoutingTableEntry};
pub use timer::{Timer, TimerSet};

// Re-export core types for convenience
pub use meshroute_core::{DataPacket, DropReason, NodeAddr};
