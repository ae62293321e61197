//! Runtime settings (operator-editable flags)

use sqlx::PgPool;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const MAINTENANCE_MODE: &str = "maintenance_mode";

/// Current maintenance flag; a missing row means off
pub async fn maintenance_mode(pool: &PgPool) -> Result<bool, BoxError> {
    let value: Option<serde_json::Value> =
        sqlx::query_scalar("SELECT value FROM runtime_settings WHERE key = $1")
            .bind(MAINTENANCE_MODE)
            .fetch_optional(pool)
            .await?;
    Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
}

pub async fn set_maintenance_mode(pool: &PgPool, enabled: bool, now: i64) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO runtime_settings (key, value, updated_at) VALUES ($1, $2, $3)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
    )
    .bind(MAINTENANCE_MODE)
    .bind(serde_json::Value::Bool(enabled))
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
