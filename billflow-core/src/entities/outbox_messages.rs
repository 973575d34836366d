//! Durable outbox rows.
//!
//! Rows are created by webhook ingestion in the same transaction as the
//! ledger insert and are only ever mutated by the outbox dispatcher:
//! `ProcessedAt` is set once on success, `Attempts` grows by one per failure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outbox type for a completed (or otherwise updated) payment.
pub const OUTBOX_PAYMENT_PROCESSED: &str = "PaymentProcessed";
/// Outbox type for a refunded payment.
pub const OUTBOX_PAYMENT_REFUNDED: &str = "PaymentRefunded";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OutboxMessage {
    pub outbox_id: i64,
    pub message_type: String,
    pub payload: String,
    pub created_at: time::OffsetDateTime,
    pub processed_at: Option<time::OffsetDateTime>,
    pub attempts: i32,
    pub error: Option<String>,
}

/// Data for inserting a new outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxInsert {
    pub message_type: String,
    pub payload: String,
}

/// JSON payload of `PaymentProcessed` and `PaymentRefunded` rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutboxPayload {
    /// Provider event type the row was created from.
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub user_id: Option<i32>,
    #[serde(default)]
    pub subscription_id: Option<i32>,
    #[serde(default)]
    pub payment_id: Option<i32>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl OutboxMessage {
    /// Insert a new row within a transaction, returning its id.
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        insert: &OutboxInsert,
    ) -> Result<i64, sqlx::Error> {
        let (outbox_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO OutboxMessages (Type, Payload)
            VALUES ($1, $2)
            RETURNING OutboxId
            "#,
        )
        .bind(&insert.message_type)
        .bind(&insert.payload)
        .fetch_one(&mut **tx)
        .await?;
        Ok(outbox_id)
    }

    /// Lock and fetch the oldest unprocessed rows that are still below the
    /// attempt limit.
    ///
    /// Rows locked by another dispatcher are skipped rather than waited on.
    pub async fn fetch_pending_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<OutboxMessage>, sqlx::Error> {
        sqlx::query_as::<_, OutboxMessage>(
            r#"
            SELECT
                OutboxId AS outbox_id,
                Type AS message_type,
                Payload AS payload,
                CreatedAt AS created_at,
                ProcessedAt AS processed_at,
                Attempts AS attempts,
                Error AS error
            FROM OutboxMessages
            WHERE ProcessedAt IS NULL AND Attempts < $2
            ORDER BY CreatedAt, OutboxId
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(&mut **tx)
        .await
    }

    /// Mark a row as delivered and clear any previous error.
    pub async fn mark_processed_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        outbox_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE OutboxMessages
            SET ProcessedAt = now(), Error = NULL
            WHERE OutboxId = $1
            "#,
        )
        .bind(outbox_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Record a failed delivery attempt.
    pub async fn mark_failed_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        outbox_id: i64,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE OutboxMessages
            SET Attempts = Attempts + 1, Error = $2
            WHERE OutboxId = $1
            "#,
        )
        .bind(outbox_id)
        .bind(error)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
