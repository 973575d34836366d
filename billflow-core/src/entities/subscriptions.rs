use crate::entities::subscription_status;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// A subscription that was just moved to `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct ExpiredSubscription {
    pub subscription_id: i32,
    pub user_id: i32,
}

#[derive(Debug, Clone, Copy, Default)]
/// Expire every active subscription whose end date has passed.
///
/// Runs as a single `UPDATE`, so a subscription is reported by at most one
/// caller even when several run concurrently.
pub struct ExpireDueSubscriptions;

impl Processor<ExpireDueSubscriptions> for DatabaseProcessor {
    type Output = Vec<ExpiredSubscription>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ExpireDueSubscriptions")]
    async fn process(
        &self,
        _query: ExpireDueSubscriptions,
    ) -> Result<Vec<ExpiredSubscription>, sqlx::Error> {
        sqlx::query_as::<_, ExpiredSubscription>(
            r#"
            UPDATE Subscriptions
            SET Status = $2
            WHERE Status = $1 AND EndDate <= now()
            RETURNING SubscriptionId AS subscription_id, UserId AS user_id
            "#,
        )
        .bind(subscription_status::ACTIVE)
        .bind(subscription_status::EXPIRED)
        .fetch_all(&self.pool)
        .await
    }
}
