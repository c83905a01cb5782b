//! Connection manager with a persistent incident feed and automatic reconnection

use crate::events::{EventBus, Subscription, SubscriptionId};
use crate::transport::{TransportConnector, TransportLink};
use anyhow::Result;
use sageguard_shared::{
    codec::{self, Packet, SocketPacket},
    defaults,
    state_machine::{Effect, LinkEvent, LinkMachine},
    ConnectionState, IncidentEvent, ReconnectPolicy,
};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{error::Elapsed, sleep, sleep_until, timeout, Instant, Sleep};
use tracing::{debug, error, info, warn};

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint URL of the incident server
    pub endpoint: String,
    /// Event name carrying incidents
    pub channel: String,
    /// Automatic reconnect attempts before giving up
    pub reconnect_attempts: u32,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Time allowed for transport connect plus handshake
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::ENDPOINT_URL.into(),
            channel: defaults::INCIDENT_CHANNEL.into(),
            reconnect_attempts: defaults::RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(defaults::RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(defaults::RECONNECT_DELAY_MAX_MS),
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
        }
    }
}

impl ConnectionConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect_delay,
            self.max_reconnect_delay,
            self.reconnect_attempts,
        )
    }
}

/// Snapshot of the connection as seen by readers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful connection
    pub attempts: u32,
}

impl ConnectionStatus {
    pub fn connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Message for the status banner, if the connection is down
    pub fn error(&self) -> Option<String> {
        match &self.state {
            ConnectionState::Disconnected { reason } => Some(format!("Disconnected: {}", reason)),
            ConnectionState::Errored { message } => Some(format!("Connection error: {}", message)),
            ConnectionState::Connecting | ConnectionState::Connected => None,
        }
    }
}

/// Events published to subscribers
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The connection state changed
    StateChanged(ConnectionStatus),
    /// An incident was accepted
    Incident(Arc<IncidentEvent>),
}

enum Command {
    Start { endpoint: String },
    Stop,
}

/// Owns the live incident connection
pub struct ConnectionManager {
    command_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    incident_rx: watch::Receiver<Option<Arc<IncidentEvent>>>,
    events: Arc<EventBus<ConnectionEvent>>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Create a connection manager and spawn its driver task.
    /// Nothing connects until [`start`](Self::start) is called.
    pub fn new<C: TransportConnector>(config: ConnectionConfig, connector: C) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let machine = LinkMachine::new(config.policy());
        let (status_tx, status_rx) = watch::channel(ConnectionStatus {
            state: machine.state().clone(),
            attempts: machine.attempts(),
        });
        let (incident_tx, incident_rx) = watch::channel(None);
        let events = Arc::new(EventBus::new());

        let driver = Driver {
            endpoint: config.endpoint.clone(),
            config,
            connector: Arc::new(connector),
            machine,
            events: events.clone(),
            status_tx,
            incident_tx,
            connecting: None,
            handshake_deadline: Instant::now(),
            link: None,
            retry: None,
            liveness: None,
            liveness_window: Duration::from_millis(
                defaults::PING_INTERVAL_MS + defaults::PING_TIMEOUT_MS,
            ),
        };
        let task = tokio::spawn(driver.run(command_rx));

        Self {
            command_tx,
            status_rx,
            incident_rx,
            events,
            task,
        }
    }

    /// Connect to an endpoint. Ignored while a connection is already active.
    pub fn start(&self, endpoint: impl Into<String>) {
        self.command(Command::Start {
            endpoint: endpoint.into(),
        });
    }

    /// Close the connection and disable automatic reconnection
    pub fn stop(&self) {
        self.command(Command::Stop);
    }

    fn command(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            error!("Connection manager task is gone");
        }
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch handle for the connection status
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Most recently accepted incident
    pub fn last_incident(&self) -> Option<Arc<IncidentEvent>> {
        self.incident_rx.borrow().clone()
    }

    /// Subscribe to state changes and incidents
    pub fn subscribe(&self) -> Subscription<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Stop the connection and wait for the driver task to finish
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(Command::Stop);
        drop(self.command_tx);
        if let Err(e) = self.task.await {
            error!("Connection manager task failed: {}", e);
        }
    }
}

type ConnectFuture<L> = Pin<Box<dyn Future<Output = Result<Result<L>, Elapsed>> + Send>>;

/// Driver task state. Everything the connection owns lives here and is only
/// touched from the driver loop.
struct Driver<C: TransportConnector> {
    config: ConnectionConfig,
    connector: Arc<C>,
    machine: LinkMachine,
    endpoint: String,
    events: Arc<EventBus<ConnectionEvent>>,
    status_tx: watch::Sender<ConnectionStatus>,
    incident_tx: watch::Sender<Option<Arc<IncidentEvent>>>,
    /// Transport connect in flight
    connecting: Option<ConnectFuture<C::Link>>,
    /// Connect plus handshake must finish by this instant
    handshake_deadline: Instant,
    /// Open transport link
    link: Option<C::Link>,
    /// Armed reconnect timer
    retry: Option<Pin<Box<Sleep>>>,
    /// Fires when the server has been silent for too long
    liveness: Option<Pin<Box<Sleep>>>,
    liveness_window: Duration,
}

impl<C: TransportConnector> Driver<C> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start { endpoint }) => self.start(endpoint).await,
                    Some(Command::Stop) => self.dispatch(LinkEvent::Stop).await,
                    None => break,
                },

                outcome = wait_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_outcome(outcome).await;
                }

                frame = recv_frame(&mut self.link) => self.on_frame(frame).await,

                _ = wait_timer(&mut self.retry) => {
                    self.retry = None;
                    self.dispatch(LinkEvent::RetryDue).await;
                }

                _ = wait_timer(&mut self.liveness) => {
                    self.liveness = None;
                    let message = if self.machine.state().is_connected() {
                        "ping timeout".to_string()
                    } else {
                        format!("handshake timed out after {}ms", self.config.connect_timeout.as_millis())
                    };
                    self.dispatch(LinkEvent::TransportError { message }).await;
                }
            }
        }

        self.close_link(true).await;
        info!("Connection manager stopped");
    }

    async fn start(&mut self, endpoint: String) {
        if matches!(
            self.machine.state(),
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            warn!("Start ignored: connection to {} already active", self.endpoint);
            return;
        }
        self.endpoint = endpoint;
        self.dispatch(LinkEvent::Start).await;
    }

    /// Run one event through the state machine and carry out its effect
    async fn dispatch(&mut self, event: LinkEvent) {
        let before = self.machine.state().clone();
        let effect = self.machine.process_event(event);
        self.apply(effect).await;

        let status = ConnectionStatus {
            state: self.machine.state().clone(),
            attempts: self.machine.attempts(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status.clone();
            true
        });

        if status.state != before {
            info!("Connection state: {} -> {}", before, status.state);
            self.events.publish(ConnectionEvent::StateChanged(status));
        }
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Connect => {
                self.retry = None;
                self.close_link(false).await;
                self.begin_connect();
            }
            Effect::ScheduleReconnect { attempt, delay } => {
                self.close_link(false).await;
                warn!(
                    "Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    self.machine.policy().max_attempts
                );
                self.retry = Some(Box::pin(sleep(delay)));
            }
            Effect::GiveUp => {
                self.retry = None;
                self.close_link(false).await;
                error!(
                    "Giving up on {} after {} reconnect attempts",
                    self.endpoint,
                    self.machine.attempts()
                );
            }
            Effect::Close => {
                self.retry = None;
                self.close_link(true).await;
                info!("Connection to {} stopped", self.endpoint);
            }
        }
    }

    fn begin_connect(&mut self) {
        let connector = self.connector.clone();
        let endpoint = self.endpoint.clone();
        let limit = self.config.connect_timeout;

        info!("Connecting to {} via {}", endpoint, connector.name());
        self.handshake_deadline = Instant::now() + limit;
        self.connecting = Some(Box::pin(async move {
            timeout(limit, connector.connect(&endpoint)).await
        }));
    }

    /// Drop everything tied to the current attempt
    async fn close_link(&mut self, graceful: bool) {
        self.connecting = None;
        self.liveness = None;
        if let Some(mut link) = self.link.take() {
            if graceful {
                match timeout(self.config.connect_timeout, link.shutdown()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("Link shutdown failed: {}", e),
                    Err(_) => debug!(
                        "Link shutdown timed out after {}ms",
                        self.config.connect_timeout.as_millis()
                    ),
                }
            }
        }
    }

    async fn on_connect_outcome(&mut self, outcome: Result<Result<C::Link>, Elapsed>) {
        match outcome {
            Ok(Ok(link)) => {
                debug!("Transport open, waiting for handshake");
                self.link = Some(link);
                self.liveness = Some(Box::pin(sleep_until(self.handshake_deadline)));
            }
            Ok(Err(e)) => {
                self.dispatch(LinkEvent::Disconnected {
                    reason: format!("connect failed: {}", e),
                })
                .await;
            }
            Err(_) => {
                self.dispatch(LinkEvent::TransportError {
                    message: format!(
                        "connect timed out after {}ms",
                        self.config.connect_timeout.as_millis()
                    ),
                })
                .await;
            }
        }
    }

    async fn on_frame(&mut self, frame: Result<Option<String>>) {
        match frame {
            Ok(Some(text)) => self.handle_frame(&text).await,
            Ok(None) => {
                self.dispatch(LinkEvent::Disconnected {
                    reason: "transport close".into(),
                })
                .await;
            }
            Err(e) => {
                self.dispatch(LinkEvent::TransportError {
                    message: format!("transport error: {}", e),
                })
                .await;
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        if self.machine.state().is_connected() {
            self.arm_liveness();
        }

        let packet = match codec::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        match packet {
            Packet::Open(handshake) => {
                debug!(
                    "Handshake sid={} ping_interval={}ms ping_timeout={}ms",
                    handshake.sid, handshake.ping_interval, handshake.ping_timeout
                );
                self.liveness_window = Duration::from_millis(handshake.liveness_window_ms());
                self.send_frame(codec::connect_request()).await;
            }
            Packet::Ping => self.send_frame(codec::encode(&Packet::Pong)).await,
            Packet::Pong | Packet::Upgrade | Packet::Noop => {}
            Packet::Close => {
                self.dispatch(LinkEvent::Disconnected {
                    reason: "transport close".into(),
                })
                .await;
            }
            Packet::Message(SocketPacket::Connect { sid }) => {
                debug!("Socket connected sid={:?}", sid);
                self.dispatch(LinkEvent::Connected).await;
                self.arm_liveness();
            }
            Packet::Message(SocketPacket::Disconnect) => {
                self.dispatch(LinkEvent::Disconnected {
                    reason: "io server disconnect".into(),
                })
                .await;
            }
            Packet::Message(SocketPacket::ConnectError { message }) => {
                self.dispatch(LinkEvent::TransportError { message }).await;
            }
            Packet::Message(SocketPacket::Event { name, args }) => self.handle_event(name, args),
        }
    }

    fn handle_event(&mut self, name: String, args: Vec<Value>) {
        if name != self.config.channel {
            debug!("Ignoring '{}' event", name);
            return;
        }

        let Some(payload) = args.into_iter().next() else {
            warn!("Dropping '{}' event without payload", name);
            return;
        };

        match IncidentEvent::from_value(payload) {
            Ok(incident) => {
                let incident = Arc::new(incident);
                if !incident.location.in_range() {
                    warn!(
                        "Incident from vehicle {} has out-of-range coordinates ({}, {})",
                        incident.vehicle_id, incident.location.lat, incident.location.lng
                    );
                }
                info!(
                    "Incident from vehicle {} severity={} at {}",
                    incident.vehicle_id, incident.severity, incident.location.address
                );
                self.incident_tx.send_replace(Some(incident.clone()));
                self.events.publish(ConnectionEvent::Incident(incident));
            }
            Err(e) => warn!("Dropping malformed incident: {}", e),
        }
    }

    async fn send_frame(&mut self, frame: String) {
        let result = match self.link.as_mut() {
            Some(link) => link.send(frame).await,
            None => return,
        };
        if let Err(e) = result {
            self.dispatch(LinkEvent::TransportError {
                message: format!("send failed: {}", e),
            })
            .await;
        }
    }

    fn arm_liveness(&mut self) {
        if self.link.is_some() {
            self.liveness = Some(Box::pin(sleep(self.liveness_window)));
        }
    }
}

async fn wait_connect<L>(pending: &mut Option<ConnectFuture<L>>) -> Result<Result<L>, Elapsed> {
    match pending {
        Some(connect) => connect.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn recv_frame<L: TransportLink>(link: &mut Option<L>) -> Result<Option<String>> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}
