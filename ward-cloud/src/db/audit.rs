//! Audit log operations

use sqlx::PgPool;
use ward_core::audit::{AuditEvent, AuditSink};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Write an audit log entry
pub async fn log(
    pool: &PgPool,
    subject_id: &str,
    action: &str,
    detail: Option<&serde_json::Value>,
    now: i64,
) -> Result<(), BoxError> {
    sqlx::query(
        "INSERT INTO audit_logs (subject_id, action, detail, created_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(subject_id)
    .bind(action)
    .bind(detail)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Query audit log entries for a subject (paginated)
#[derive(sqlx::FromRow, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: i64,
}

pub async fn query(
    pool: &PgPool,
    subject_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditEntry>, BoxError> {
    let rows: Vec<AuditEntry> = sqlx::query_as(
        "SELECT id, action, detail, created_at FROM audit_logs WHERE subject_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(subject_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Engine audit sink backed by `audit_logs`
///
/// Each event is written on its own task; a failed write is logged and
/// never reaches the operation that produced the event.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: AuditEvent) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let detail = event.detail();
            if let Err(e) = log(
                &pool,
                event.subject_id(),
                event.action(),
                Some(&detail),
                shared::util::now_millis(),
            )
            .await
            {
                tracing::error!(error = %e, action = event.action(), "Failed to write audit log");
            }
        });
    }
}
