//! Command-line configuration for the console

use crate::connection::ConnectionConfig;
use crate::notify::NotificationPermission;
use crate::voice::{RecognitionConfig, VoiceMode};
use clap::Parser;
use sageguard_shared::defaults;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "sageguard", about = "Live incident feed and voice navigation console")]
pub struct Cli {
    /// Incident server endpoint
    #[arg(long, env = "SAGEGUARD_WEBSOCKET_URL", default_value = defaults::ENDPOINT_URL)]
    pub endpoint: String,

    /// Automatic reconnect attempts before giving up
    #[arg(long = "reconnect-attempts", default_value_t = defaults::RECONNECT_ATTEMPTS)]
    pub reconnect_attempts: u32,

    /// Initial reconnect delay (ms)
    #[arg(long = "reconnect-delay-ms", default_value_t = defaults::RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,

    /// Reconnect delay ceiling (ms)
    #[arg(long = "reconnect-delay-max-ms", default_value_t = defaults::RECONNECT_DELAY_MAX_MS)]
    pub reconnect_delay_max_ms: u64,

    /// Connect plus handshake timeout (ms)
    #[arg(long = "connect-timeout-ms", default_value_t = defaults::CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,

    /// Event name carrying incidents
    #[arg(long, default_value = defaults::INCIDENT_CHANNEL)]
    pub channel: String,

    /// Notification permission: granted, denied or default
    #[arg(long, default_value = "default")]
    pub notifications: NotificationPermission,

    /// Voice input: console (stdin lines) or off
    #[arg(long, default_value = "console")]
    pub voice: VoiceMode,

    /// Recognition language
    #[arg(long, default_value = "en-US")]
    pub lang: String,
}

impl Cli {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: self.endpoint.clone(),
            channel: self.channel.clone(),
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(self.reconnect_delay_max_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            language: self.lang.clone(),
            ..Default::default()
        }
    }
}
