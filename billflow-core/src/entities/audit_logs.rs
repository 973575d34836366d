use crate::events::LogMessage;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone)]
/// Append one row to `AuditLogs`.
pub struct InsertAuditLog {
    pub user_id: Option<i32>,
    pub action: String,
    pub message: Option<String>,
    pub created_at: time::OffsetDateTime,
}

impl From<&LogMessage> for InsertAuditLog {
    fn from(entry: &LogMessage) -> Self {
        Self {
            user_id: entry.user_id,
            action: entry.action.clone(),
            message: entry.message.clone(),
            created_at: entry.timestamp_utc,
        }
    }
}

impl Processor<InsertAuditLog> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertAuditLog")]
    async fn process(&self, insert: InsertAuditLog) -> Result<i64, sqlx::Error> {
        let (log_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO AuditLogs (UserId, Action, Message, CreatedAt)
            VALUES ($1, $2, $3, $4)
            RETURNING LogId
            "#,
        )
        .bind(insert.user_id)
        .bind(insert.action)
        .bind(insert.message)
        .bind(insert.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(log_id)
    }
}
