//! Delivery outcomes reported to the upper layer

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Reasons a packet might be dropped
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// TTL (hop budget) expired
    #[display("TTL expired")]
    TtlExpired,
    /// No route available to destination
    #[display("No route available")]
    NoRoute,
    /// Duplicate packet (already processed)
    #[display("Duplicate packet")]
    Duplicate,
    /// Buffer for pending packets is full
    #[display("Queue full")]
    QueueFull,
    /// Packet waited too long for a route
    #[display("Queue timeout")]
    QueueTimeout,
    /// Route discovery gave up after the configured retries
    #[display("Route discovery retries exhausted")]
    RetriesExhausted,
    /// The next hop became unreachable
    #[display("Link failure")]
    LinkFailure,
    /// The engine was stopped with the packet still buffered
    #[display("Routing engine stopped")]
    EngineStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReason::NoRoute.to_string(), "No route available");
        assert_eq!(
            DropReason::RetriesExhausted.to_string(),
            "Route discovery retries exhausted"
        );
        assert_eq!(DropReason::QueueFull.to_string(), "Queue full");
    }
}
