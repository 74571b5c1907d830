//! # Meshroute Simulation
//!
//! Hosts meshroute routing engines on a simulated mesh of named peers.
//!
//! ## Overview
//!
//! The routing engines never schedule or send anything themselves; they
//! are handed a clock and a transport. This crate provides two hosts:
//!
//! - **Discrete-event** ([`Simulation`]): every node shares one virtual-time
//!   event queue. Runs are fast and repeatable apart from protocol jitter.
//! - **Live** ([`LiveNetwork`]): every node is a tokio task with its own
//!   inbox, and timers are real sleeps.
//!
//! ## Architecture
//!
//! - **Types** (`types.rs`): Peer ids (A-Z), kernel events, the event log
//! - **Topology** (`topology.rs`): Mesh construction (ring, full, line, star, random)
//! - **Kernel** (`kernel.rs`): Event queue plus the per-node clock and transport
//! - **Simulation** (`simulation.rs`): Event dispatch, link model, statistics
//! - **Scenarios** (`scenarios.rs`): Pre-built runs
//! - **Live** (`live.rs`): tokio runtime
//!
//! ## Example: Round Trip
//!
//! ```rust,ignore
//! use meshroute_simulation::*;
//!
//! let mesh = from_edges(&[('A', 'B'), ('B', 'D')])?;
//! let mut sim = Simulation::new(mesh, SimConfig::quiet_reactive())?;
//! sim.start()?;
//!
//! sim.send_message(PeerId('A'), PeerId('D'), b"Hello D!".to_vec())?;
//! sim.run_for(Duration::from_secs(1))?;
//!
//! assert_eq!(sim.delivered_to(PeerId('D')), 1);
//! assert_eq!(sim.next_hop(PeerId('A'), PeerId('D')), Some(PeerId('B')));
//! ```

pub mod kernel;
pub mod live;
pub mod scenarios;
pub mod simulation;
pub mod topology;
pub mod types;

// Re-export main types
pub use types::{Frame, NetworkEvent, PeerId, SimError, SimEvent, SimResult, Target};

pub use topology::{Mesh, MeshBuilder, from_edges};

pub use kernel::{EventQueue, SimClock, SimTransport};

pub use simulation::{SimConfig, SimEngine, SimStats, Simulation};

pub use live::{LiveEvent, LiveNetwork};
