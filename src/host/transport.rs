//! Transport layer between the core and its host
//!
//! Abstracts the host process for testability. Provides:
//! - HostTransport trait: request/response plus an ordered push stream
//! - MockHost: in-process host with failure injection for tests
//! - FileHost: JSON document on local disk

use std::io;
use std::time::Duration;

use shellconf_protocol::{HostError, HostMessage, HostRequest, HostResponse};

/// Transport trait for host communication
pub trait HostTransport: Send + Sync {
    /// Execute a request and wait for its response (used for load)
    fn request(&self, request: &HostRequest) -> Result<HostResponse, TransportError>;

    /// Hand a request to the host without waiting; its outcome arrives later
    /// on the push stream as a [`HostMessage::PersistResult`]
    fn submit(&self, request: &HostRequest) -> Result<(), TransportError>;

    /// Next pushed message, waiting at most `timeout`
    fn recv(&self, timeout: Duration) -> Result<Option<HostMessage>, TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Host error: {0}")]
    Host(HostError),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<HostError> for TransportError {
    fn from(error: HostError) -> Self {
        Self::Host(error)
    }
}
