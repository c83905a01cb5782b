//! SageGuard Shared Protocol Types
//!
//! This crate provides the transport-independent pieces of the live incident
//! feed: the incident payload model, the Socket.IO text-frame codec, the
//! connection state machine and the voice command trigger table.

pub mod codec;
pub mod incident;
pub mod intent;
pub mod state_machine;

// Re-export commonly used types at crate root
pub use incident::{IncidentError, IncidentEvent, IncidentStatus, Location, SensorData, Severity};
pub use intent::NavigationIntent;
pub use state_machine::{ConnectionState, ReconnectPolicy};

/// Default parameters for the live incident connection
pub mod defaults {
    /// Endpoint used when nothing is configured
    pub const ENDPOINT_URL: &str = "http://localhost:3001";

    /// Named channel carrying incident frames
    pub const INCIDENT_CHANNEL: &str = "incident";

    /// Maximum automatic reconnect attempts before giving up
    pub const RECONNECT_ATTEMPTS: u32 = 5;

    /// Initial reconnect delay in milliseconds
    pub const RECONNECT_DELAY_MS: u64 = 1000;

    /// Reconnect delay ceiling in milliseconds
    pub const RECONNECT_DELAY_MAX_MS: u64 = 5000;

    /// Overall connect timeout in milliseconds
    pub const CONNECT_TIMEOUT_MS: u64 = 20000;

    /// Engine.IO heartbeat interval assumed until the server handshake says otherwise
    pub const PING_INTERVAL_MS: u64 = 25000;

    /// Engine.IO heartbeat grace period assumed until the server handshake says otherwise
    pub const PING_TIMEOUT_MS: u64 = 20000;
}
