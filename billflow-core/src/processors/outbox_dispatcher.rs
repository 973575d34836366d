//! OutboxDispatcher processor.
//!
//! The OutboxDispatcher is responsible for:
//! - Polling `OutboxMessages` for unprocessed rows, oldest first, in batches
//! - Turning each row into channel messages according to its type
//! - Marking rows processed, or counting a failed attempt with its reason
//!
//! Rows that reached [`MAX_ATTEMPTS`] are never fetched again. They stay in
//! the table with their last error for an operator to inspect.

use crate::entities::outbox_messages::{
    OUTBOX_PAYMENT_PROCESSED, OUTBOX_PAYMENT_REFUNDED, OutboxMessage, PaymentOutboxPayload,
};
use crate::events::{EventProducers, LogMessage, NotificationMessage, wait_for_shutdown};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Maximum number of rows handled per batch.
pub const BATCH_SIZE: i64 = 50;

/// Rows with this many failed attempts are no longer fetched.
pub const MAX_ATTEMPTS: i32 = 5;

const IDLE_DELAY: Duration = Duration::from_secs(2);
const BUSY_DELAY: Duration = Duration::from_millis(200);
const ERROR_DELAY: Duration = Duration::from_secs(2);

/// Errors that abort a whole batch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors that fail a single outbox row.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Source of outbox batches.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Open a batch. Everything done through it is committed together.
    async fn begin(&self) -> Result<Box<dyn OutboxBatch>, sqlx::Error>;
}

/// One transactional unit of outbox work.
///
/// Dropping a batch without committing discards every mark made through it.
#[async_trait]
pub trait OutboxBatch: Send {
    async fn fetch_pending(&mut self, limit: i64) -> Result<Vec<OutboxMessage>, sqlx::Error>;
    async fn mark_processed(&mut self, outbox_id: i64) -> Result<(), sqlx::Error>;
    async fn mark_failed(&mut self, outbox_id: i64, error: &str) -> Result<(), sqlx::Error>;
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;
}

/// Outbox store backed by the `OutboxMessages` table.
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn begin(&self) -> Result<Box<dyn OutboxBatch>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgOutboxBatch { tx }))
    }
}

struct PgOutboxBatch {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

#[async_trait]
impl OutboxBatch for PgOutboxBatch {
    async fn fetch_pending(&mut self, limit: i64) -> Result<Vec<OutboxMessage>, sqlx::Error> {
        OutboxMessage::fetch_pending_tx(&mut self.tx, limit, MAX_ATTEMPTS).await
    }

    async fn mark_processed(&mut self, outbox_id: i64) -> Result<(), sqlx::Error> {
        OutboxMessage::mark_processed_tx(&mut self.tx, outbox_id).await
    }

    async fn mark_failed(&mut self, outbox_id: i64, error: &str) -> Result<(), sqlx::Error> {
        OutboxMessage::mark_failed_tx(&mut self.tx, outbox_id, error).await
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}

/// Summary of one dispatch batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
}

/// OutboxDispatcher bridges durable outbox rows onto the in-memory channels.
pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    producers: EventProducers,
    shutdown_rx: watch::Receiver<bool>,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        producers: EventProducers,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            producers,
            shutdown_rx,
        }
    }

    /// Run the OutboxDispatcher until shutdown.
    pub async fn run(self) {
        info!("OutboxDispatcher started");
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            let delay = tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("OutboxDispatcher received shutdown signal");
                    break;
                }

                result = self.dispatch_batch() => match result {
                    Ok(report) if report.processed == 0 => IDLE_DELAY,
                    Ok(report) => {
                        debug!(
                            fetched = report.fetched,
                            processed = report.processed,
                            failed = report.failed,
                            "Outbox batch dispatched"
                        );
                        BUSY_DELAY
                    }
                    Err(e) => {
                        error!(error = %e, "Outbox dispatch failed");
                        ERROR_DELAY
                    }
                },
            };

            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("OutboxDispatcher received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("OutboxDispatcher shutdown complete");
    }

    /// Fetch, route and mark one batch of outbox rows.
    ///
    /// A routing failure only fails its own row; a database failure aborts
    /// the batch and leaves every row of it untouched. Channel messages are
    /// only emitted once the batch has committed, so a rolled back batch
    /// emits nothing.
    pub async fn dispatch_batch(&self) -> Result<BatchReport, DispatchError> {
        let mut batch = self.store.begin().await?;
        let messages = batch.fetch_pending(BATCH_SIZE).await?;

        let mut report = BatchReport {
            fetched: messages.len(),
            ..Default::default()
        };
        let mut outgoing = Vec::new();

        for message in &messages {
            match route(message) {
                Ok(events) => {
                    batch.mark_processed(message.outbox_id).await?;
                    outgoing.extend(events);
                    report.processed += 1;
                }
                Err(e) => {
                    warn!(
                        outbox_id = message.outbox_id,
                        message_type = %message.message_type,
                        attempts = message.attempts + 1,
                        error = %e,
                        "Outbox message handling failed"
                    );
                    batch.mark_failed(message.outbox_id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        batch.commit().await?;

        for event in outgoing {
            match event {
                OutgoingEvent::Log(log) => {
                    self.producers.logs.try_enqueue(log);
                }
                OutgoingEvent::Notification(notification) => {
                    self.producers.notifications.try_enqueue(notification);
                }
            }
        }
        Ok(report)
    }
}

/// Channel message produced by routing one outbox row.
#[derive(Debug, Clone, PartialEq)]
enum OutgoingEvent {
    Log(LogMessage),
    Notification(NotificationMessage),
}

/// Turn one outbox row into channel messages.
///
/// Unknown types are acknowledged without side effects.
fn route(message: &OutboxMessage) -> Result<Vec<OutgoingEvent>, HandlerError> {
    match message.message_type.as_str() {
        OUTBOX_PAYMENT_PROCESSED => {
            let payload: PaymentOutboxPayload = serde_json::from_str(&message.payload)?;
            let payment_id = payload.payment_id.unwrap_or_default();
            let subscription_id = payload.subscription_id.unwrap_or_default();
            let amount = payload.amount.unwrap_or_default();

            Ok(vec![
                OutgoingEvent::Notification(NotificationMessage::email(
                    payload.user_id,
                    "Payment received",
                    format!(
                        "Payment {payment_id} for subscription {subscription_id} amount {amount} processed."
                    ),
                )),
                OutgoingEvent::Log(LogMessage::new(
                    payload.user_id,
                    "Outbox.PaymentProcessed",
                    format!("Outbox delivered payment {payment_id}"),
                )),
            ])
        }
        OUTBOX_PAYMENT_REFUNDED => {
            let payload: PaymentOutboxPayload = serde_json::from_str(&message.payload)?;
            let payment_id = payload.payment_id.unwrap_or_default();
            let subscription_id = payload.subscription_id.unwrap_or_default();

            Ok(vec![OutgoingEvent::Notification(NotificationMessage::email(
                payload.user_id,
                "Payment refunded",
                format!("Payment {payment_id} for subscription {subscription_id} has been refunded."),
            ))])
        }
        other => {
            debug!(
                outbox_id = message.outbox_id,
                message_type = other,
                "Acknowledging outbox message of unknown type"
            );
            Ok(Vec::new())
        }
    }
}
