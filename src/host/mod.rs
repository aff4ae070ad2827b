//! Host-side collaborators
//!
//! The host process owns the durable copy of the settings document. The core
//! reaches it through [`HostTransport`].

pub mod file;
pub mod mock;
pub mod transport;

pub use file::FileHost;
pub use mock::MockHost;
pub use transport::{HostTransport, TransportError};
