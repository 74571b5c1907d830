//! Error types for meshroute

use thiserror::Error;

use crate::address::NodeAddr;

/// Errors raised by a [`Transport`](crate::Transport) implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport has no interfaces")]
    NoInterfaces,

    #[error("Unknown interface index: {0}")]
    UnknownInterface(u32),

    #[error("Link to {0} is down")]
    LinkDown(NodeAddr),

    #[error("Transport closed")]
    Closed,
}

/// Errors raised while encoding or decoding control messages
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Decoding error: {0}")]
    Decode(String),
}

/// Errors raised when validating configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::LinkDown(NodeAddr::new(10, 0, 0, 2));
        assert_eq!(err.to_string(), "Link to 10.0.0.2 is down");
        assert_eq!(
            TransportError::UnknownInterface(3).to_string(),
            "Unknown interface index: 3"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::OutOfRange {
            field: "weighted_factor",
            min: 0.0,
            max: 1.0,
            value: 1.5,
        };
        assert_eq!(
            err.to_string(),
            "weighted_factor must be within 0..=1, got 1.5"
        );
        assert_eq!(
            ConfigError::Zero { field: "hello_interval" }.to_string(),
            "hello_interval must be greater than zero"
        );
    }
}
