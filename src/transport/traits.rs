//! Transport trait abstraction for pluggable incident feed backends

use anyhow::Result;
use async_trait::async_trait;

/// An open duplex link carrying text frames
#[async_trait]
pub trait TransportLink: Send + 'static {
    /// Wait for the next text frame.
    ///
    /// `Ok(None)` means the peer closed the link cleanly.
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Send one text frame
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Close the link gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Factory for opening links to an endpoint
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// The link type this connector produces
    type Link: TransportLink;

    /// Attempt to connect, returning a link on success
    async fn connect(&self, endpoint: &str) -> Result<Self::Link>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
