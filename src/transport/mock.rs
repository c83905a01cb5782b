//! In-memory transport used by the connection manager tests

use crate::transport::traits::{TransportConnector, TransportLink};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What the test server pushes into a link
pub enum MockFrame {
    Text(String),
    Close,
    Error(String),
}

/// Client side of an in-memory link
pub struct MockLink {
    frames: mpsc::UnboundedReceiver<MockFrame>,
    sent: Arc<Mutex<Vec<String>>>,
    fail_send: bool,
    stuck_shutdown: bool,
}

impl MockLink {
    /// Every send fails as if the socket broke
    pub fn with_failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Graceful shutdown never completes, like a peer that stopped reading
    pub fn with_stuck_shutdown(mut self) -> Self {
        self.stuck_shutdown = true;
        self
    }
}

/// Test side of an in-memory link
#[derive(Clone)]
pub struct MockServer {
    tx: mpsc::UnboundedSender<MockFrame>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub fn push(&self, frame: &str) {
        let _ = self.tx.send(MockFrame::Text(frame.to_owned()));
    }

    pub fn close(&self) {
        let _ = self.tx.send(MockFrame::Close);
    }

    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(MockFrame::Error(message.to_owned()));
    }

    /// Frames the client has sent so far
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

pub fn mock_link() -> (MockLink, MockServer) {
    let (tx, frames) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    (
        MockLink {
            frames,
            sent: sent.clone(),
            fail_send: false,
            stuck_shutdown: false,
        },
        MockServer { tx, sent },
    )
}

/// Link that completes the Socket.IO handshake as soon as it is read
pub fn handshaken_link() -> (MockLink, MockServer) {
    let (link, server) = mock_link();
    server.push(r#"0{"sid":"mock-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#);
    server.push(r#"40{"sid":"mock-socket"}"#);
    (link, server)
}

#[async_trait]
impl TransportLink for MockLink {
    async fn recv(&mut self) -> Result<Option<String>> {
        match self.frames.recv().await {
            Some(MockFrame::Text(text)) => Ok(Some(text)),
            Some(MockFrame::Error(message)) => Err(anyhow!(message)),
            Some(MockFrame::Close) | None => Ok(None),
        }
    }

    async fn send(&mut self, frame: String) -> Result<()> {
        if self.fail_send {
            return Err(anyhow!("broken pipe"));
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.stuck_shutdown {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Scripted outcome of one connect call
pub enum Outcome {
    Refuse(String),
    Accept(MockLink),
    /// Never resolves, so the connect timeout fires
    Hang,
}

/// Connector replaying a script of outcomes, refusing once it runs out
#[derive(Clone, Default)]
pub struct MockConnector {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    attempts: Arc<AtomicUsize>,
    endpoints: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new(script: Vec<Outcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    type Link = MockLink;

    async fn connect(&self, endpoint: &str) -> Result<Self::Link> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.to_owned());

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            Some(Outcome::Accept(link)) => Ok(link),
            Some(Outcome::Refuse(reason)) => Err(anyhow!(reason)),
            Some(Outcome::Hang) => std::future::pending().await,
            None => Err(anyhow!("connection refused")),
        }
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}
