mod cli;
mod connection;
mod events;
mod notify;
mod transport;
mod voice;

use clap::Parser;
use cli::Cli;
use connection::{ConnectionEvent, ConnectionManager};
use notify::{ConsoleSink, EventNotifier};
use transport::{socket_io_url, WebSocketConnector};
use voice::VoiceCommandEngine;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = cli.connection_config();
    let endpoint = config.endpoint.clone();

    info!("SageGuard console starting");
    info!("  Endpoint: {}", endpoint);
    info!("  Socket URL: {}", socket_io_url(&endpoint)?);
    info!("  Notifications: {:?}", cli.notifications);

    let conn = ConnectionManager::new(config, WebSocketConnector);
    let mut events = conn.subscribe();
    let notifier = EventNotifier::new(ConsoleSink::new(cli.notifications)).spawn(conn.subscribe());

    let mut voice = VoiceCommandEngine::new(cli.voice.recognizer(), cli.recognition_config());
    let mut intents = voice.subscribe();
    voice.start_listening();
    if voice.session().is_listening {
        info!("Say (type) \"show dashboard\", \"show map\" or \"show analytics\"");
    }

    conn.start(endpoint);

    // Main event loop
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ConnectionEvent::StateChanged(status)) => match status.error() {
                    Some(message) => warn!("{} (reconnect attempts: {})", message, status.attempts),
                    None => info!("Connection {}", status.state),
                },
                Some(ConnectionEvent::Incident(incident)) => {
                    info!(
                        "[INCIDENT] {} severity={} at {} ({:.4}, {:.4}) impact={}",
                        incident.vehicle_id,
                        incident.severity,
                        incident.location.address,
                        incident.location.lat,
                        incident.location.lng,
                        incident.sensor_data.impact_level
                    );
                }
                None => {
                    error!("Connection manager closed");
                    break;
                }
            },

            event = voice.next_event() => {
                voice.handle_event(event);
            }

            Some(intent) = intents.recv() => {
                info!("Navigating to {} ({})", intent.route(), intent);
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    voice.stop_listening();
    if let Some(incident) = conn.last_incident() {
        info!("Last incident: vehicle {} at {}", incident.vehicle_id, incident.timestamp);
    }
    info!("Final connection state: {}", conn.status().state);

    conn.unsubscribe(events.id());
    conn.shutdown().await;
    if let Err(e) = notifier.await {
        error!("Event notifier failed: {}", e);
    }

    Ok(())
}
