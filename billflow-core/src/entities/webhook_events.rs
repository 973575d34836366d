/// Result of inserting into the webhook idempotency ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First time this event id was seen.
    Inserted,
    /// A row with this event id already exists.
    AlreadyExists,
}

/// Data for inserting a new ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEventInsert {
    pub event_id: String,
    pub signature: String,
    pub raw_payload: String,
}

pub struct WebhookEventRecord;

impl WebhookEventRecord {
    /// Insert a ledger row unless the event id is already present.
    pub async fn insert_if_absent_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        insert: &WebhookEventInsert,
    ) -> Result<InsertOutcome, sqlx::Error> {
        let inserted: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO WebhookEvents (EventId, Signature, RawPayload, Processed)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (EventId) DO NOTHING
            RETURNING EventId
            "#,
        )
        .bind(&insert.event_id)
        .bind(&insert.signature)
        .bind(&insert.raw_payload)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(match inserted {
            Some(_) => InsertOutcome::Inserted,
            None => InsertOutcome::AlreadyExists,
        })
    }

    pub async fn mark_processed_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE WebhookEvents
            SET Processed = TRUE
            WHERE EventId = $1
            "#,
        )
        .bind(event_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
