pub struct PaymentRecord;

impl PaymentRecord {
    /// Set the status of every payment carrying the provider transaction id.
    ///
    /// Returns the number of rows updated; zero is not an error.
    pub async fn update_status_by_transaction_id_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        transaction_id: &str,
        status: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE Payments
            SET Status = $2
            WHERE TransactionId = $1
            "#,
        )
        .bind(transaction_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Set the status of a payment by its primary key.
    pub async fn update_status_by_id_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment_id: i32,
        status: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE Payments
            SET Status = $2
            WHERE PaymentId = $1
            "#,
        )
        .bind(payment_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
