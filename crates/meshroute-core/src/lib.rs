//! # Meshroute Core
//!
//! Core traits, types, and errors shared by the meshroute routing engine
//! and the environments that host it.
//!
//! The routing engine never talks to a real scheduler or socket. It is
//! given collaborators through the traits in this crate, so the same
//! engine code runs inside the discrete-event simulator, inside a tokio
//! actor, or under the deterministic test doubles in [`mock`].
//!
//! ## Key Traits
//!
//! - [`Clock`]: Virtual time plus cancellable delayed timers
//! - [`Transport`]: Unicast/broadcast send and interface enumeration
//!
//! ## Key Types
//!
//! - [`NodeAddr`]: Opaque fixed-width network address
//! - [`InterfaceInfo`]: A local interface (index, local and broadcast address)
//! - [`VirtualTime`]: Monotonic virtual instant
//! - [`DataPacket`]: A data packet with its routing header
//! - [`DropReason`]: Why a packet was not delivered

pub mod address;
pub mod clock;
pub mod codec;
pub mod error;
pub mod event;
pub mod mock;
pub mod packet;
pub mod time;
pub mod transport;

// Re-export main types
pub use address::*;
pub use clock::*;
pub use codec::{decode, encode};
pub use error::*;
pub use event::*;
pub use mock::*;
pub use packet::*;
pub use time::*;
pub use transport::*;
