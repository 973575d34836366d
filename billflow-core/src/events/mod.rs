//! In-memory event pipeline.
//!
//! # Event Flow
//!
//! 1. Request handlers and background jobs write through [`ChannelProducer`]
//! 2. Each message sits in one of two bounded channels
//! 3. `LogConsumer` persists [`LogMessage`]s to `AuditLogs`
//! 4. `NotificationConsumer` hands [`NotificationMessage`]s to a delivery handler
//!
//! Messages are ephemeral: under overload the newest writes are dropped.
//! Anything that must survive goes through the outbox instead.

pub mod channels;
pub mod producer;
pub mod types;

pub use channels::{
    ChannelSettings, EventChannels, EventProducers, EventReceivers, LogMessageReceiver,
    NotificationReceiver, DEFAULT_LOGGING_CAPACITY, DEFAULT_NOTIFICATION_CAPACITY,
};
pub use producer::{wait_for_shutdown, ChannelProducer, EnqueueError};
pub use types::{LogMessage, NotificationMessage, NOTIFICATION_KIND_EMAIL};
