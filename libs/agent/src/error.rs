//! Agent Error Types
//!
//! Error taxonomy for the center agent. Transient network faults and protocol
//! faults are recovered inside the reactor by reconnecting; configuration
//! faults and queue back-pressure are reported to the caller.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Main agent error type
#[derive(Error, Debug)]
pub enum AgentError {
    /// Network I/O failure on an established connection
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection establishment failure
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<SocketAddr>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed or oversized frame, or a processor rejecting a frame
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration or setup call
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Report queue stayed full for the whole timeout
    #[error("Report queue full: no slot freed within {timeout_ms}ms (capacity {capacity})")]
    QueueFull { capacity: usize, timeout_ms: u64 },

    /// Report payload does not fit in one frame
    #[error("Payload too large: {size} bytes exceeds limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    /// The agent is stopping or stopped
    #[error("Agent stopped")]
    Stopped,
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a queue-full error for a push that timed out
    pub fn queue_full(capacity: usize, timeout: Duration) -> Self {
        Self::QueueFull {
            capacity,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Check if retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Network { .. } => true,
            AgentError::Connection { .. } => true,
            AgentError::QueueFull { .. } => true,
            AgentError::Io { .. } => true,
            AgentError::Protocol { .. } => false,
            AgentError::Configuration { .. } => false,
            AgentError::PayloadTooLarge { .. } => false,
            AgentError::Stopped => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Network { .. } => "network",
            AgentError::Connection { .. } => "connection",
            AgentError::Protocol { .. } => "protocol",
            AgentError::Configuration { .. } => "configuration",
            AgentError::QueueFull { .. } => "queue_full",
            AgentError::PayloadTooLarge { .. } => "payload_too_large",
            AgentError::Io { .. } => "io",
            AgentError::Stopped => "stopped",
        }
    }
}

/// Convert standard I/O errors to agent errors
impl From<std::io::Error> for AgentError {
    fn from(error: std::io::Error) -> Self {
        AgentError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Convert framing errors to agent errors
impl From<codec::ProtocolError> for AgentError {
    fn from(error: codec::ProtocolError) -> Self {
        AgentError::Protocol {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }
}
