//! User-visible incident notifications

mod notifier;

pub use notifier::{
    ConsoleSink, EventNotifier, Notification, NotificationPermission, NotificationSink,
    NOTIFICATION_ICON, NOTIFICATION_TITLE,
};
