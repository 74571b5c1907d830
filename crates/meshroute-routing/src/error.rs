//! Routing error types
//!
//! Network conditions (missing routes, duplicates, full queues) are never
//! errors. These variants cover wiring mistakes and collaborator failures.

use thiserror::Error;

use meshroute_core::{CodecError, ConfigError, TransportError};

/// Errors returned by the routing engines
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A packet was routed before `start` was called
    #[error("Routing engine used before start")]
    NotStarted,

    /// The transport exposes no interfaces
    #[error("Transport exposes no interfaces")]
    NoInterfaces,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Control message could not be encoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            RoutingError::NotStarted.to_string(),
            "Routing engine used before start"
        );
        let err: RoutingError = TransportError::Closed.into();
        assert_eq!(err.to_string(), "Transport error: Transport closed");
        let err: RoutingError = ConfigError::Zero { field: "hello_interval" }.into();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: hello_interval must be greater than zero"
        );
    }
}
