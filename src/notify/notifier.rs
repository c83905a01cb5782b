//! Event notifier turning accepted incidents into notifications

use crate::connection::ConnectionEvent;
use crate::events::Subscription;
use anyhow::Result;
use async_trait::async_trait;
use sageguard_shared::IncidentEvent;
use std::io::Write;
use std::str::FromStr;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const NOTIFICATION_TITLE: &str = "New Incident Detected";
pub const NOTIFICATION_ICON: &str = "/notification-icon.png";

/// Whether the user allowed notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Not yet requested
    #[default]
    Default,
}

impl FromStr for NotificationPermission {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            "default" => Ok(Self::Default),
            other => anyhow::bail!("unknown notification permission: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
}

impl Notification {
    pub fn for_incident(incident: &IncidentEvent) -> Self {
        Self {
            title: NOTIFICATION_TITLE.into(),
            body: format!("Vehicle {} reported an incident", incident.vehicle_id),
            icon: NOTIFICATION_ICON.into(),
        }
    }
}

/// Where notifications are shown
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    fn permission(&self) -> NotificationPermission;

    async fn show(&self, notification: Notification) -> Result<()>;
}

/// Prints notifications to the terminal and rings the bell
pub struct ConsoleSink {
    permission: NotificationPermission,
}

impl ConsoleSink {
    pub fn new(permission: NotificationPermission) -> Self {
        Self { permission }
    }
}

#[async_trait]
impl NotificationSink for ConsoleSink {
    fn permission(&self) -> NotificationPermission {
        self.permission
    }

    async fn show(&self, notification: Notification) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "\x07[{}] {}", notification.title, notification.body)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Notifies the user about every accepted incident
pub struct EventNotifier<S: NotificationSink> {
    sink: S,
}

impl<S: NotificationSink> EventNotifier<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Show a notification for an incident if permitted.
    /// Returns true if the sink accepted it.
    pub async fn on_incident(&self, incident: &IncidentEvent) -> bool {
        match self.sink.permission() {
            NotificationPermission::Granted => {}
            permission => {
                debug!(
                    "Notification for vehicle {} skipped, permission {:?}",
                    incident.vehicle_id, permission
                );
                return false;
            }
        }

        match self.sink.show(Notification::for_incident(incident)).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to show notification: {}", e);
                false
            }
        }
    }

    /// Run the notifier on its own task, fed by a connection subscription
    pub fn spawn(self, mut subscription: Subscription<ConnectionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Event notifier started ({})", subscription.id());
            while let Some(event) = subscription.recv().await {
                if let ConnectionEvent::Incident(incident) = event {
                    self.on_incident(&incident).await;
                }
            }
            info!("Event notifier stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct RecordingSink {
        permission: NotificationPermission,
        fail: bool,
        shown: Arc<Mutex<Vec<Notification>>>,
    }

    impl RecordingSink {
        fn new(permission: NotificationPermission) -> Self {
            Self {
                permission,
                fail: false,
                shown: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn shown(&self) -> Vec<Notification> {
            self.shown.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn permission(&self) -> NotificationPermission {
            self.permission
        }

        async fn show(&self, notification: Notification) -> Result<()> {
            if self.fail {
                anyhow::bail!("display unavailable");
            }
            self.shown.lock().unwrap().push(notification);
            Ok(())
        }
    }

    fn incident(vehicle: &str) -> IncidentEvent {
        IncidentEvent::from_json(&format!(
            r#"{{"vehicleId":"{}","timestamp":"2024-03-15T10:30:00Z","location":{{"lat":12.9716,"lng":77.5946,"address":"MG Road"}},"severity":"High","sensorData":{{"acceleration":9.8,"speed":65,"impactLevel":8.5}}}}"#,
            vehicle
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_granted_shows_notification() {
        let sink = RecordingSink::new(NotificationPermission::Granted);
        let notifier = EventNotifier::new(sink.clone());

        assert!(notifier.on_incident(&incident("KA-01-AB-1234")).await);

        assert_eq!(
            sink.shown(),
            vec![Notification {
                title: "New Incident Detected".into(),
                body: "Vehicle KA-01-AB-1234 reported an incident".into(),
                icon: "/notification-icon.png".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_skipped_without_permission() {
        for permission in [NotificationPermission::Denied, NotificationPermission::Default] {
            let sink = RecordingSink::new(permission);
            let notifier = EventNotifier::new(sink.clone());
            assert!(!notifier.on_incident(&incident("V-1")).await);
            assert!(sink.shown().is_empty());
        }
    }

    #[tokio::test]
    async fn test_same_incident_twice_notifies_twice() {
        let sink = RecordingSink::new(NotificationPermission::Granted);
        let notifier = EventNotifier::new(sink.clone());
        let event = incident("V-7");

        notifier.on_incident(&event).await;
        notifier.on_incident(&event).await;

        assert_eq!(sink.shown().len(), 2);
    }

    #[tokio::test]
    async fn test_sink_failure_is_contained() {
        let mut sink = RecordingSink::new(NotificationPermission::Granted);
        sink.fail = true;
        let notifier = EventNotifier::new(sink);

        assert!(!notifier.on_incident(&incident("V-1")).await);
    }

    #[tokio::test]
    async fn test_spawned_notifier_follows_subscription() {
        let bus = EventBus::new();
        let sink = RecordingSink::new(NotificationPermission::Granted);
        let task = EventNotifier::new(sink.clone()).spawn(bus.subscribe());

        bus.publish(ConnectionEvent::Incident(Arc::new(incident("V-1"))));
        bus.publish(ConnectionEvent::Incident(Arc::new(incident("V-2"))));
        drop(bus);
        task.await.unwrap();

        let bodies: Vec<_> = sink.shown().into_iter().map(|n| n.body).collect();
        assert_eq!(
            bodies,
            vec![
                "Vehicle V-1 reported an incident",
                "Vehicle V-2 reported an incident"
            ]
        );
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!(
            "granted".parse::<NotificationPermission>().unwrap(),
            NotificationPermission::Granted
        );
        assert_eq!(
            "Denied".parse::<NotificationPermission>().unwrap(),
            NotificationPermission::Denied
        );
        assert!("maybe".parse::<NotificationPermission>().is_err());
    }
}
