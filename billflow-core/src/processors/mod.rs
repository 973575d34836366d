//! Background processors and the services they are built on.
//!
//! - `LogConsumer`: drains the logging channel into `AuditLogs`
//! - `NotificationConsumer`: drains the notification channel into a `NotificationHandler`
//! - `OutboxDispatcher`: polls `OutboxMessages`, emits onto both channels
//! - `ExpiryChecker`: expires due subscriptions, emits onto both channels
//! - `payment_webhooks`: verifies and records inbound payment events, feeding the outbox

pub mod consumer;
pub mod expiry_checker;
pub mod log_consumer;
pub mod notification_consumer;
pub mod outbox_dispatcher;
pub mod payment_webhooks;

pub use consumer::{ChannelConsumer, MessageSink};
pub use expiry_checker::{ExpiryChecker, PgSubscriptionService, SubscriptionService};
pub use log_consumer::{AuditLogWriter, LogConsumer, PgAuditLogWriter};
pub use notification_consumer::{
    HttpRelayNotifier, LoggingNotifier, NotificationConsumer, NotificationError,
    NotificationHandler,
};
pub use outbox_dispatcher::{
    BatchReport, DispatchError, HandlerError, OutboxBatch, OutboxDispatcher, OutboxStore,
    PgOutboxStore,
};
pub use payment_webhooks::{
    IngestError, InsertOutcome, PaymentWebhookStore, PgPaymentWebhookStore, VerifiedPaymentEvent,
};
