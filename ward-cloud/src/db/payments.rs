//! Processed payment notifications (idempotency)

use sqlx::PgPool;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Record an event id; `false` if it was already processed
pub async fn mark_processed(
    pool: &PgPool,
    event_id: &str,
    event_type: &str,
    now: i64,
) -> Result<bool, BoxError> {
    let result = sqlx::query(
        "INSERT INTO processed_payment_events (event_id, event_type, processed_at)
         VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
    )
    .bind(event_id)
    .bind(event_type)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Forget an event so the provider's retry is processed again
pub async fn unmark(pool: &PgPool, event_id: &str) -> Result<(), BoxError> {
    sqlx::query("DELETE FROM processed_payment_events WHERE event_id = $1")
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}
