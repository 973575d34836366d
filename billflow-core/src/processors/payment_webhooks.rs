//! Payment webhook ingestion.
//!
//! Turning a raw provider request into durable state happens in two steps:
//! - [`VerifiedPaymentEvent::verify`] checks the body and signature and
//!   parses the envelope, touching nothing
//! - [`PaymentWebhookStore::ingest`] records the event id, updates the
//!   payment and writes the outbox row, all in one transaction
//!
//! A replayed event id is reported as [`InsertOutcome::AlreadyExists`] and
//! changes nothing.

use crate::entities::outbox_messages::{
    OUTBOX_PAYMENT_PROCESSED, OUTBOX_PAYMENT_REFUNDED, OutboxInsert, OutboxMessage,
    PaymentOutboxPayload,
};
use crate::entities::payments::PaymentRecord;
use crate::entities::webhook_events::{WebhookEventInsert, WebhookEventRecord};
use async_trait::async_trait;
use billflow_sdk::objects::PaymentWebhookEnvelope;
use billflow_sdk::signature::{self, SignatureError};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

pub use crate::entities::webhook_events::InsertOutcome;

/// Errors that can occur while ingesting a payment webhook.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No shared secret is configured
    #[error("webhook secret not configured")]
    SecretMissing,

    /// The `X-Event-Id` header is missing or blank
    #[error("missing X-Event-Id header")]
    MissingEventId,

    /// The body could not be read, or a signed body is not UTF-8 text
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Signature missing or not matching the body
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The body is not a valid payment envelope
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A webhook whose signature checked out, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPaymentEvent {
    pub event_id: String,
    pub signature: String,
    pub raw_payload: String,
    pub envelope: PaymentWebhookEnvelope,
    pub outbox: OutboxInsert,
}

impl VerifiedPaymentEvent {
    /// Verify `body` against `signature` and parse it.
    ///
    /// The signature is checked over the exact bytes received, before the
    /// body is decoded or parsed. An unsigned body that is not UTF-8 is
    /// therefore a signature failure, not a bad request.
    pub fn verify(
        event_id: &str,
        signature: Option<&str>,
        body: Vec<u8>,
        secret: &[u8],
    ) -> Result<Self, IngestError> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(IngestError::MissingEventId);
        }

        let signature = signature.unwrap_or_default();
        signature::verify_body(&body, signature, secret)?;

        let raw_payload =
            String::from_utf8(body).map_err(|e| IngestError::InvalidBody(e.to_string()))?;

        let envelope: PaymentWebhookEnvelope = serde_json::from_str(&raw_payload)?;
        let outbox = outbox_insert_for(&envelope)?;

        Ok(Self {
            event_id: event_id.to_string(),
            signature: signature.trim().to_string(),
            raw_payload,
            envelope,
            outbox,
        })
    }
}

/// Build the outbox row announcing `envelope`.
pub fn outbox_insert_for(
    envelope: &PaymentWebhookEnvelope,
) -> Result<OutboxInsert, serde_json::Error> {
    let message_type = if envelope.is_refund() {
        OUTBOX_PAYMENT_REFUNDED
    } else {
        OUTBOX_PAYMENT_PROCESSED
    };
    let payload = PaymentOutboxPayload {
        event_type: envelope.event_type.clone(),
        user_id: envelope.user_id,
        subscription_id: envelope.subscription_id,
        payment_id: envelope.payment_id,
        amount: envelope.amount,
        transaction_id: envelope.transaction_id().map(str::to_string),
    };
    Ok(OutboxInsert {
        message_type: message_type.to_string(),
        payload: serde_json::to_string(&payload)?,
    })
}

/// Durable side of webhook ingestion.
#[async_trait]
pub trait PaymentWebhookStore: Send + Sync {
    /// Record the event and apply its effects atomically.
    ///
    /// On [`InsertOutcome::AlreadyExists`] nothing was changed. On error
    /// nothing was changed either, so the sender may retry.
    async fn ingest(&self, event: &VerifiedPaymentEvent) -> Result<InsertOutcome, sqlx::Error>;
}

pub struct PgPaymentWebhookStore {
    pool: PgPool,
}

impl PgPaymentWebhookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentWebhookStore for PgPaymentWebhookStore {
    #[tracing::instrument(skip_all, err, fields(event_id = %event.event_id))]
    async fn ingest(&self, event: &VerifiedPaymentEvent) -> Result<InsertOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let ledger = WebhookEventInsert {
            event_id: event.event_id.clone(),
            signature: event.signature.clone(),
            raw_payload: event.raw_payload.clone(),
        };
        if WebhookEventRecord::insert_if_absent_tx(&mut tx, &ledger).await?
            == InsertOutcome::AlreadyExists
        {
            tx.rollback().await?;
            debug!("Duplicate payment webhook ignored");
            return Ok(InsertOutcome::AlreadyExists);
        }

        let status = event.envelope.status_or_default();
        let updated = match (event.envelope.transaction_id(), event.envelope.payment_id) {
            (Some(transaction_id), _) => {
                PaymentRecord::update_status_by_transaction_id_tx(&mut tx, transaction_id, status)
                    .await?
            }
            (None, Some(payment_id)) => {
                PaymentRecord::update_status_by_id_tx(&mut tx, payment_id, status).await?
            }
            (None, None) => 0,
        };

        let outbox_id = OutboxMessage::insert_tx(&mut tx, &event.outbox).await?;
        WebhookEventRecord::mark_processed_tx(&mut tx, &event.event_id).await?;
        tx.commit().await?;

        info!(
            outbox_id,
            payments_updated = updated,
            status,
            "Payment webhook recorded"
        );
        Ok(InsertOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";
    const BODY: &str = r#"{"type":"payment.succeeded","transactionId":"txn_123","status":"Completed","amount":19.99,"userId":7,"subscriptionId":9,"paymentId":3}"#;

    fn sign(body: &str) -> String {
        signature::sign_body(body.as_bytes(), SECRET)
    }

    #[test]
    fn test_verify_accepts_signed_body() {
        let sig = sign(BODY);
        let event =
            VerifiedPaymentEvent::verify(" evt_1 ", Some(&sig), BODY.as_bytes().to_vec(), SECRET)
                .unwrap();

        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.signature, sig);
        assert_eq!(event.raw_payload, BODY);
        assert_eq!(event.outbox.message_type, OUTBOX_PAYMENT_PROCESSED);

        let payload: PaymentOutboxPayload = serde_json::from_str(&event.outbox.payload).unwrap();
        assert_eq!(payload.event_type, "payment.succeeded");
        assert_eq!(payload.user_id, Some(7));
        assert_eq!(payload.subscription_id, Some(9));
        assert_eq!(payload.payment_id, Some(3));
        assert_eq!(payload.transaction_id.as_deref(), Some("txn_123"));
        assert_eq!(payload.amount.map(|a| a.to_string()).as_deref(), Some("19.99"));
    }

    #[test]
    fn test_refund_maps_to_refunded_outbox_type() {
        let body = r#"{"type":"payment.refunded","paymentId":4}"#;
        let event =
            VerifiedPaymentEvent::verify("evt_2", Some(&sign(body)), body.as_bytes().to_vec(), SECRET)
                .unwrap();
        assert_eq!(event.outbox.message_type, OUTBOX_PAYMENT_REFUNDED);
    }

    #[test]
    fn test_any_other_type_maps_to_processed() {
        let body = r#"{"type":"payment.failed","status":"Failed"}"#;
        let event =
            VerifiedPaymentEvent::verify("evt_3", Some(&sign(body)), body.as_bytes().to_vec(), SECRET)
                .unwrap();
        assert_eq!(event.outbox.message_type, OUTBOX_PAYMENT_PROCESSED);
        assert_eq!(event.envelope.status_or_default(), "Failed");
    }

    #[test]
    fn test_blank_event_id_rejected_first() {
        let result = VerifiedPaymentEvent::verify("   ", None, b"garbage".to_vec(), SECRET);
        assert!(matches!(result, Err(IngestError::MissingEventId)));
    }

    #[test]
    fn test_non_utf8_body_checked_after_signature() {
        let body = vec![0xff, 0xfe];
        let result = VerifiedPaymentEvent::verify("evt", Some("bm9wZQ=="), body.clone(), SECRET);
        assert!(matches!(
            result,
            Err(IngestError::Signature(SignatureError::SignatureMismatch))
        ));

        let sig = signature::sign_body(&body, SECRET);
        let result = VerifiedPaymentEvent::verify("evt", Some(&sig), body, SECRET);
        assert!(matches!(result, Err(IngestError::InvalidBody(_))));
    }

    #[test]
    fn test_signature_checked_before_parsing() {
        let result =
            VerifiedPaymentEvent::verify("evt", Some("bm9wZQ=="), b"not json".to_vec(), SECRET);
        assert!(matches!(
            result,
            Err(IngestError::Signature(SignatureError::SignatureMismatch))
        ));

        let result = VerifiedPaymentEvent::verify("evt", None, BODY.as_bytes().to_vec(), SECRET);
        assert!(matches!(
            result,
            Err(IngestError::Signature(SignatureError::Missing))
        ));
    }

    #[test]
    fn test_signed_garbage_is_malformed() {
        for body in ["not json", r#"{"status":"Completed"}"#, "[]"] {
            let result = VerifiedPaymentEvent::verify(
                "evt",
                Some(&sign(body)),
                body.as_bytes().to_vec(),
                SECRET,
            );
            assert!(
                matches!(result, Err(IngestError::MalformedPayload(_))),
                "{body}"
            );
        }
    }
}
