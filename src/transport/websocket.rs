//! WebSocket transport for Socket.IO endpoints

use crate::transport::traits::{TransportConnector, TransportLink};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

/// Rewrite a configured endpoint into the Engine.IO WebSocket URL.
///
/// `http://host:3001` becomes `ws://host:3001/socket.io/?EIO=4&transport=websocket`.
/// An explicit path or an existing `EIO` query is kept as given.
pub fn socket_io_url(endpoint: &str) -> Result<Url> {
    let mut url =
        Url::parse(endpoint).with_context(|| format!("invalid endpoint URL: {}", endpoint))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("unsupported endpoint scheme: {}", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {} to {}", endpoint, scheme))?;

    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/socket.io/");
    }

    if !url.query_pairs().any(|(key, _)| key == "EIO") {
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
    }

    Ok(url)
}

/// WebSocket stream wrapper implementing TransportLink
pub struct WebSocketLink {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketLink {
    pub fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self { inner: stream }
    }
}

#[async_trait]
impl TransportLink for WebSocketLink {
    async fn recv(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.inner.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(frame) => {
                    debug!("WebSocket closed by peer: {:?}", frame);
                    return Ok(None);
                }
                Message::Binary(data) => {
                    debug!("Ignoring {} byte binary frame", data.len());
                }
                // Control frames are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn send(&mut self, frame: String) -> Result<()> {
        self.inner.send(Message::Text(frame)).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.inner.close(None).await?;
        Ok(())
    }
}

/// Connector for Socket.IO servers reachable over WebSocket
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    type Link = WebSocketLink;

    async fn connect(&self, endpoint: &str) -> Result<Self::Link> {
        let url = socket_io_url(endpoint)?;
        debug!("Opening WebSocket to {}", url);
        let (stream, _response) = connect_async(url.as_str()).await?;
        Ok(WebSocketLink::new(stream))
    }

    fn name(&self) -> &'static str {
        "WebSocket"
    }
}
