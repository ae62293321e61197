//! Usage counters
//!
//! Every mutation is a single conditional statement (or one transaction for
//! rollover) so concurrent requests on other instances cannot overshoot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use ward_core::BoxError;
use ward_core::ledger::{IncrementOutcome, UsageCounter, UsageStore};

#[derive(sqlx::FromRow)]
struct CounterRow {
    subject_id: String,
    resource_key: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    consumed: i64,
}

impl From<CounterRow> for UsageCounter {
    fn from(row: CounterRow) -> Self {
        UsageCounter {
            subject_id: row.subject_id,
            resource_key: row.resource_key,
            window_start: row.window_start,
            window_end: row.window_end,
            consumed: to_units(row.consumed),
        }
    }
}

fn to_units(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn load(&self, subject: &str, resource: &str) -> Result<Option<UsageCounter>, BoxError> {
        let row = sqlx::query_as::<_, CounterRow>(
            "SELECT subject_id, resource_key, window_start, window_end, consumed
             FROM usage_counters WHERE subject_id = $1 AND resource_key = $2",
        )
        .bind(subject)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UsageCounter::from))
    }

    async fn rollover(
        &self,
        expected_window_end: Option<DateTime<Utc>>,
        fresh: UsageCounter,
    ) -> Result<bool, BoxError> {
        let Some(expected_end) = expected_window_end else {
            let result = sqlx::query(
                "INSERT INTO usage_counters (subject_id, resource_key, window_start, window_end, consumed)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (subject_id, resource_key) DO NOTHING",
            )
            .bind(&fresh.subject_id)
            .bind(&fresh.resource_key)
            .bind(fresh.window_start)
            .bind(fresh.window_end)
            .bind(to_column(fresh.consumed))
            .execute(&self.pool)
            .await?;
            return Ok(result.rows_affected() == 1);
        };

        let mut tx = self.pool.begin().await?;
        let previous = sqlx::query_as::<_, CounterRow>(
            "SELECT subject_id, resource_key, window_start, window_end, consumed
             FROM usage_counters
             WHERE subject_id = $1 AND resource_key = $2 AND window_end = $3
             FOR UPDATE",
        )
        .bind(&fresh.subject_id)
        .bind(&fresh.resource_key)
        .bind(expected_end)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(previous) = previous else {
            return Ok(false);
        };

        sqlx::query(
            "INSERT INTO usage_history (subject_id, resource_key, window_start, window_end, consumed, archived_at)
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(&previous.subject_id)
        .bind(&previous.resource_key)
        .bind(previous.window_start)
        .bind(previous.window_end)
        .bind(previous.consumed)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE usage_counters SET window_start = $3, window_end = $4, consumed = $5
             WHERE subject_id = $1 AND resource_key = $2",
        )
        .bind(&fresh.subject_id)
        .bind(&fresh.resource_key)
        .bind(fresh.window_start)
        .bind(fresh.window_end)
        .bind(to_column(fresh.consumed))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn try_increment(
        &self,
        subject: &str,
        resource: &str,
        window_end: DateTime<Utc>,
        units: u64,
        limit: Option<u64>,
    ) -> Result<IncrementOutcome, BoxError> {
        let applied: Option<i64> = sqlx::query_scalar(
            "UPDATE usage_counters SET consumed = consumed + $4
             WHERE subject_id = $1 AND resource_key = $2 AND window_end = $3
               AND ($5::BIGINT IS NULL OR consumed + $4 <= $5)
             RETURNING consumed",
        )
        .bind(subject)
        .bind(resource)
        .bind(window_end)
        .bind(to_column(units))
        .bind(limit.map(to_column))
        .fetch_optional(&self.pool)
        .await?;
        if let Some(total) = applied {
            return Ok(IncrementOutcome::Applied(to_units(total)));
        }

        let current: Option<i64> = sqlx::query_scalar(
            "SELECT consumed FROM usage_counters
             WHERE subject_id = $1 AND resource_key = $2 AND window_end = $3",
        )
        .bind(subject)
        .bind(resource)
        .bind(window_end)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match current {
            Some(total) => IncrementOutcome::Rejected(to_units(total)),
            None => IncrementOutcome::Stale,
        })
    }

    async fn archive_stale(&self, now: DateTime<Utc>) -> Result<u64, BoxError> {
        let result = sqlx::query(
            "WITH moved AS (
                 DELETE FROM usage_counters WHERE window_end <= $1
                 RETURNING subject_id, resource_key, window_start, window_end, consumed
             )
             INSERT INTO usage_history (subject_id, resource_key, window_start, window_end, consumed, archived_at)
             SELECT subject_id, resource_key, window_start, window_end, consumed, $1 FROM moved",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
