//! Connection management for the live incident feed
//!
//! This module handles:
//! - The persistent Socket.IO connection to the incident server
//! - Automatic reconnection with exponential backoff
//! - Engine.IO heartbeats and liveness detection
//! - Fan-out of incidents and state changes to subscribers

mod manager;

pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionStatus};
