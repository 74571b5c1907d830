//! Protocol configuration
//!
//! Field defaults follow the usual AODV (RFC 3561) and DSDV parameter
//! values. Timers that the protocols define in terms of other timers are
//! exposed as methods rather than stored, so changing e.g. the node
//! traversal time moves every derived timeout with it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use meshroute_core::ConfigError;

/// Reactive (AODV) parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AodvConfig {
    /// Interval between hello beacons
    pub hello_interval: Duration,
    /// Route requests sent for one destination before giving up
    /// Default: 2
    pub rreq_retries: u8,
    /// Route requests originated per second
    pub rreq_rate_limit: u16,
    /// Route errors originated per second
    pub rerr_rate_limit: u16,
    /// Conservative one-hop traversal estimate
    pub node_traversal_time: Duration,
    /// Lifetime of a route after it was last used
    pub active_route_timeout: Duration,
    /// Maximum hops between two nodes in the network
    pub net_diameter: u8,
    /// Hello intervals that may pass unheard before a neighbor is lost
    pub allowed_hello_loss: u16,
    /// Packets buffered across all destinations
    pub max_queue_len: usize,
    /// Packets buffered for a single destination
    pub max_queued_per_dst: usize,
    /// How long a packet may wait for a route
    pub max_queue_time: Duration,
    /// Set the gratuitous flag on originated requests
    pub gratuitous_reply: bool,
    /// Set the destination-only flag on originated requests
    pub destination_only: bool,
    /// Send hello beacons and age neighbors out
    pub enable_hello: bool,
    /// Forward broadcast data packets
    pub enable_broadcast: bool,
    /// Grow the request TTL ring by ring instead of flooding the diameter
    pub expanding_ring_search: bool,
    /// First TTL of an expanding ring search
    pub ttl_start: u8,
    /// TTL growth per ring
    pub ttl_increment: u8,
    /// Beyond this TTL the next ring is the full diameter
    pub ttl_threshold: u8,
    /// Extra hops added to the ring traversal time
    pub timeout_buffer: u8,
    /// Ask for RREP-ACK when replying toward a one-hop destination
    pub enable_rrep_ack: bool,
    /// Interval of the routing-table purge sweep
    pub purge_interval: Duration,
}

impl Default for AodvConfig {
    fn default() -> Self {
        Self {
            hello_interval: Duration::from_secs(1),
            rreq_retries: 2,
            rreq_rate_limit: 10,
            rerr_rate_limit: 10,
            node_traversal_time: Duration::from_millis(40),
            active_route_timeout: Duration::from_secs(3),
            net_diameter: 35,
            allowed_hello_loss: 2,
            max_queue_len: 64,
            max_queued_per_dst: 64,
            max_queue_time: Duration::from_secs(30),
            gratuitous_reply: true,
            destination_only: false,
            enable_hello: true,
            enable_broadcast: true,
            expanding_ring_search: false,
            ttl_start: 1,
            ttl_increment: 2,
            ttl_threshold: 7,
            timeout_buffer: 2,
            enable_rrep_ack: false,
            purge_interval: Duration::from_secs(1),
        }
    }
}

impl AodvConfig {
    /// Lifetime of routes to this node advertised in its own replies
    pub fn my_route_timeout(&self) -> Duration {
        self.active_route_timeout * 2
    }

    /// Time to wait for a neighbor's retransmission
    pub fn next_hop_wait(&self) -> Duration {
        self.node_traversal_time + Duration::from_millis(10)
    }

    /// Time for a message to cross the whole network
    pub fn net_traversal_time(&self) -> Duration {
        self.node_traversal_time * 2 * u32::from(self.net_diameter)
    }

    /// Lifetime of broadcast-id cache records
    pub fn path_discovery_time(&self) -> Duration {
        self.net_traversal_time() * 2
    }

    /// How long a neighbor stays blacklisted after a missing RREP-ACK
    pub fn blacklist_timeout(&self) -> Duration {
        self.net_traversal_time() * u32::from(self.rreq_retries)
    }

    /// Hold-down of an invalidated route before it is deleted
    pub fn delete_period(&self) -> Duration {
        self.active_route_timeout.max(self.hello_interval) * 5
    }

    /// Neighbor lifetime granted by one received hello
    pub fn hello_lifetime(&self) -> Duration {
        self.hello_interval * u32::from(self.allowed_hello_loss)
    }

    /// Wait for a reply to a request sent with the given TTL
    pub fn ring_traversal_time(&self, ttl: u8) -> Duration {
        self.node_traversal_time * 2 * (u32::from(ttl) + u32::from(self.timeout_buffer))
    }

    /// Set the hello interval
    pub fn with_hello_interval(mut self, interval: Duration) -> Self {
        self.hello_interval = interval;
        self
    }

    /// Enable or disable hello beacons
    pub fn with_hello(mut self, enabled: bool) -> Self {
        self.enable_hello = enabled;
        self
    }

    /// Set the request retry budget
    pub fn with_rreq_retries(mut self, retries: u8) -> Self {
        self.rreq_retries = retries;
        self
    }

    /// Set the network diameter
    pub fn with_net_diameter(mut self, diameter: u8) -> Self {
        self.net_diameter = diameter;
        self
    }

    /// Set the active route timeout
    pub fn with_active_route_timeout(mut self, timeout: Duration) -> Self {
        self.active_route_timeout = timeout;
        self
    }

    /// Enable or disable expanding ring search
    pub fn with_expanding_ring_search(mut self, enabled: bool) -> Self {
        self.expanding_ring_search = enabled;
        self
    }

    /// Set the destination-only flag on originated requests
    pub fn with_destination_only(mut self, enabled: bool) -> Self {
        self.destination_only = enabled;
        self
    }

    /// Set the gratuitous flag on originated requests
    pub fn with_gratuitous_reply(mut self, enabled: bool) -> Self {
        self.gratuitous_reply = enabled;
        self
    }

    /// Enable or disable RREP-ACK requests
    pub fn with_rrep_ack(mut self, enabled: bool) -> Self {
        self.enable_rrep_ack = enabled;
        self
    }

    /// Set the queue bounds
    pub fn with_queue(mut self, max_len: usize, max_per_dst: usize, timeout: Duration) -> Self {
        self.max_queue_len = max_len;
        self.max_queued_per_dst = max_per_dst;
        self.max_queue_time = timeout;
        self
    }

    /// Check the values for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_hello && self.hello_interval.is_zero() {
            return Err(ConfigError::Zero { field: "hello_interval" });
        }
        if self.node_traversal_time.is_zero() {
            return Err(ConfigError::Zero { field: "node_traversal_time" });
        }
        if self.active_route_timeout.is_zero() {
            return Err(ConfigError::Zero { field: "active_route_timeout" });
        }
        if self.net_diameter == 0 {
            return Err(ConfigError::Zero { field: "net_diameter" });
        }
        if self.purge_interval.is_zero() {
            return Err(ConfigError::Zero { field: "purge_interval" });
        }
        if self.rreq_rate_limit == 0 {
            return Err(ConfigError::Zero { field: "rreq_rate_limit" });
        }
        if self.rerr_rate_limit == 0 {
            return Err(ConfigError::Zero { field: "rerr_rate_limit" });
        }
        if self.max_queue_len == 0 {
            return Err(ConfigError::Zero { field: "max_queue_len" });
        }
        if self.max_queued_per_dst == 0 {
            return Err(ConfigError::Zero { field: "max_queued_per_dst" });
        }
        if self.expanding_ring_search && self.ttl_start == 0 {
            return Err(ConfigError::Zero { field: "ttl_start" });
        }
        if self.ttl_threshold > self.net_diameter {
            return Err(ConfigError::Invalid(format!(
                "ttl_threshold {} exceeds net_diameter {}",
                self.ttl_threshold, self.net_diameter
            )));
        }
        Ok(())
    }
}

/// Periodic (DSDV) parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DsdvConfig {
    /// Interval between full-table updates
    pub periodic_update_interval: Duration,
    /// Fixed settling time, and the seed of the weighted one
    pub settling_time: Duration,
    /// Packets buffered across all destinations
    pub max_queue_len: usize,
    /// Packets buffered for a single destination
    pub max_queued_per_dst: usize,
    /// How long a packet may wait for a route
    pub max_queue_time: Duration,
    /// Buffer packets with no route instead of dropping them
    pub enable_buffering: bool,
    /// Derive the settling time from route age
    pub enable_wst: bool,
    /// Periodic intervals a route survives without being refreshed
    /// Default: 3
    pub holdtimes: u32,
    /// Weight of the previous settling time in the weighted average
    /// Default: 0.875
    pub weighted_factor: f64,
    /// Merge triggered updates raised within one window
    pub enable_route_aggregation: bool,
    /// Length of the aggregation window
    pub route_aggregation_time: Duration,
}

impl Default for DsdvConfig {
    fn default() -> Self {
        Self {
            periodic_update_interval: Duration::from_secs(15),
            settling_time: Duration::from_secs(5),
            max_queue_len: 500,
            max_queued_per_dst: 5,
            max_queue_time: Duration::from_secs(30),
            enable_buffering: true,
            enable_wst: true,
            holdtimes: 3,
            weighted_factor: 0.875,
            enable_route_aggregation: false,
            route_aggregation_time: Duration::from_secs(1),
        }
    }
}

impl DsdvConfig {
    /// How long a route lives without a refresh
    pub fn holddown_time(&self) -> Duration {
        self.periodic_update_interval * self.holdtimes
    }

    /// Set the periodic update interval
    pub fn with_periodic_update_interval(mut self, interval: Duration) -> Self {
        self.periodic_update_interval = interval;
        self
    }

    /// Set the fixed settling time
    pub fn with_settling_time(mut self, settling: Duration) -> Self {
        self.settling_time = settling;
        self
    }

    /// Enable or disable weighted settling time
    pub fn with_wst(mut self, enabled: bool) -> Self {
        self.enable_wst = enabled;
        self
    }

    /// Enable or disable buffering
    pub fn with_buffering(mut self, enabled: bool) -> Self {
        self.enable_buffering = enabled;
        self
    }

    /// Enable or disable route aggregation
    pub fn with_route_aggregation(mut self, enabled: bool) -> Self {
        self.enable_route_aggregation = enabled;
        self
    }

    /// Check the values for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.periodic_update_interval.is_zero() {
            return Err(ConfigError::Zero { field: "periodic_update_interval" });
        }
        if self.holdtimes == 0 {
            return Err(ConfigError::Zero { field: "holdtimes" });
        }
        if !(0.0..=1.0).contains(&self.weighted_factor) {
            return Err(ConfigError::OutOfRange {
                field: "weighted_factor",
                min: 0.0,
                max: 1.0,
                value: self.weighted_factor,
            });
        }
        if self.enable_buffering && (self.max_queue_len == 0 || self.max_queued_per_dst == 0) {
            return Err(ConfigError::Zero { field: "max_queue_len" });
        }
        if self.enable_route_aggregation && self.route_aggregation_time.is_zero() {
            return Err(ConfigError::Zero { field: "route_aggregation_time" });
        }
        Ok(())
    }
}

/// Which routing discipline an engine runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoutingMode {
    /// On-demand discovery
    Reactive(AodvConfig),
    /// Periodic full-table exchange
    Periodic(DsdvConfig),
}

impl RoutingMode {
    /// Reactive mode with default parameters
    pub fn reactive() -> Self {
        RoutingMode::Reactive(AodvConfig::default())
    }

    /// Periodic mode with default parameters
    pub fn periodic() -> Self {
        RoutingMode::Periodic(DsdvConfig::default())
    }

    /// Protocol name for logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            RoutingMode::Reactive(_) => "aodv",
            RoutingMode::Periodic(_) => "dsdv",
        }
    }

    /// Validate the wrapped configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            RoutingMode::Reactive(config) => config.validate(),
            RoutingMode::Periodic(config) => config.validate(),
        }
    }
}

impl Default for RoutingMode {
    fn default() -> Self {
        Self::reactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aodv_derived_timers() {
        let config = AodvConfig::default();

        assert_eq!(config.net_traversal_time(), Duration::from_millis(2800));
        assert_eq!(config.path_discovery_time(), Duration::from_millis(5600));
        assert_eq!(config.blacklist_timeout(), Duration::from_millis(5600));
        assert_eq!(config.delete_period(), Duration::from_secs(15));
        assert_eq!(config.my_route_timeout(), Duration::from_secs(6));
        assert_eq!(config.next_hop_wait(), Duration::from_millis(50));
        assert_eq!(config.hello_lifetime(), Duration::from_secs(2));
        assert_eq!(config.ring_traversal_time(1), Duration::from_millis(240));
    }

    #[test]
    fn test_derived_timers_follow_base_values() {
        let config = AodvConfig::default().with_net_diameter(10);
        assert_eq!(config.net_traversal_time(), Duration::from_millis(800));
    }

    #[test]
    fn test_aodv_validate() {
        assert!(AodvConfig::default().validate().is_ok());

        let bad = AodvConfig::default().with_hello_interval(Duration::ZERO);
        assert_eq!(
            bad.validate(),
            Err(ConfigError::Zero { field: "hello_interval" })
        );

        // A zero hello interval is fine when hellos are off
        let ok = AodvConfig::default()
            .with_hello_interval(Duration::ZERO)
            .with_hello(false);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_dsdv_defaults_and_validate() {
        let config = DsdvConfig::default();
        assert_eq!(config.holddown_time(), Duration::from_secs(45));
        assert!(config.validate().is_ok());

        let bad = DsdvConfig {
            weighted_factor: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::OutOfRange { field: "weighted_factor", .. })
        ));
    }

    #[test]
    fn test_routing_mode() {
        assert_eq!(RoutingMode::default().name(), "aodv");
        assert_eq!(RoutingMode::periodic().name(), "dsdv");
        assert!(RoutingMode::periodic().validate().is_ok());
    }
}
