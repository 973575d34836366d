//! Bounded channel pair and the registries that hand out its ends.
//!
//! Two fixed-capacity channels exist for the lifetime of the process: one
//! for audit-log entries, one for outbound notifications. Writers never
//! block; a write against a full channel is dropped.

use super::producer::ChannelProducer;
use super::types::{LogMessage, NotificationMessage};
use serde::Deserialize;
use tokio::sync::mpsc;

/// Default capacity of the audit-log channel.
pub const DEFAULT_LOGGING_CAPACITY: usize = 1000;
/// Default capacity of the notification channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 500;

/// Receiver end of the audit-log channel.
pub type LogMessageReceiver = mpsc::Receiver<LogMessage>;
/// Receiver end of the notification channel.
pub type NotificationReceiver = mpsc::Receiver<NotificationMessage>;

/// Channel capacities, as read from the `[channels]` config section.
///
/// Zero means "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub logging_capacity: usize,
    pub notification_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            logging_capacity: DEFAULT_LOGGING_CAPACITY,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl ChannelSettings {
    pub fn effective_logging_capacity(&self) -> usize {
        non_zero_or(self.logging_capacity, DEFAULT_LOGGING_CAPACITY)
    }

    pub fn effective_notification_capacity(&self) -> usize {
        non_zero_or(self.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY)
    }
}

fn non_zero_or(value: usize, default: usize) -> usize {
    if value == 0 { default } else { value }
}

/// Factory for the channel pair.
pub struct EventChannels;

impl EventChannels {
    /// Build both channels.
    ///
    /// The producers are cloneable and handed to every writer; each receiver
    /// must be moved into exactly one consumer.
    pub fn new(settings: &ChannelSettings) -> (EventProducers, EventReceivers) {
        let (log_tx, log_rx) = mpsc::channel(settings.effective_logging_capacity());
        let (notification_tx, notification_rx) =
            mpsc::channel(settings.effective_notification_capacity());

        let producers = EventProducers {
            logs: ChannelProducer::new("logging", log_tx),
            notifications: ChannelProducer::new("notifications", notification_tx),
        };
        let receivers = EventReceivers {
            logs: log_rx,
            notifications: notification_rx,
        };
        (producers, receivers)
    }
}

/// Container for the write ends of both channels.
///
/// Passed by value (it is cheap to clone) to every component that emits
/// log entries or notifications.
#[derive(Clone, Debug)]
pub struct EventProducers {
    pub logs: ChannelProducer<LogMessage>,
    pub notifications: ChannelProducer<NotificationMessage>,
}

/// Read ends of both channels. Not cloneable.
#[derive(Debug)]
pub struct EventReceivers {
    pub logs: LogMessageReceiver,
    pub notifications: NotificationReceiver,
}
