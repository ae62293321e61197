//! MFA records with optimistic versioning

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use ward_core::BoxError;
use ward_core::mfa::{Challenge, MfaRecord, MfaState, MfaStore};

#[derive(sqlx::FromRow)]
struct MfaRow {
    subject_id: String,
    phase: String,
    method: Option<String>,
    secret: Option<String>,
    backup_codes: Option<serde_json::Value>,
    challenge: Option<serde_json::Value>,
    last_totp_step: Option<i64>,
    enabled_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<MfaRow> for MfaRecord {
    type Error = BoxError;

    fn try_from(row: MfaRow) -> Result<Self, Self::Error> {
        let state = MfaState::from_parts(&row.phase, row.method.as_deref()).ok_or_else(|| {
            format!(
                "MFA record {}: invalid phase '{}' / method {:?}",
                row.subject_id, row.phase, row.method
            )
        })?;
        let backup_codes: Option<Vec<String>> =
            row.backup_codes.map(serde_json::from_value).transpose()?;
        let challenge: Option<Challenge> = row.challenge.map(serde_json::from_value).transpose()?;
        Ok(MfaRecord {
            subject_id: row.subject_id,
            state,
            secret: row.secret,
            backup_codes,
            challenge,
            last_totp_step: row.last_totp_step,
            enabled_at: row.enabled_at,
            version: row.version,
        })
    }
}

#[derive(Clone)]
pub struct PgMfaStore {
    pool: PgPool,
}

impl PgMfaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MfaStore for PgMfaStore {
    async fn load(&self, subject_id: &str) -> Result<Option<MfaRecord>, BoxError> {
        let row = sqlx::query_as::<_, MfaRow>(
            "SELECT subject_id, phase, method, secret, backup_codes, challenge,
                    last_totp_step, enabled_at, version
             FROM mfa_records WHERE subject_id = $1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MfaRecord::try_from).transpose()
    }

    async fn save(&self, record: &MfaRecord, expected_version: i64) -> Result<bool, BoxError> {
        let backup_codes = record
            .backup_codes
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let challenge = record.challenge.as_ref().map(serde_json::to_value).transpose()?;
        let method = record.state.method().map(|m| m.as_str());

        let sql = if expected_version == 0 {
            "INSERT INTO mfa_records (subject_id, phase, method, secret, backup_codes, challenge,
                                      last_totp_step, enabled_at, version)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (subject_id) DO NOTHING"
        } else {
            "UPDATE mfa_records
             SET phase = $2, method = $3, secret = $4, backup_codes = $5, challenge = $6,
                 last_totp_step = $7, enabled_at = $8, version = $9
             WHERE subject_id = $1 AND version = $10"
        };

        let query = sqlx::query(sql)
            .bind(&record.subject_id)
            .bind(record.state.phase())
            .bind(method)
            .bind(&record.secret)
            .bind(backup_codes)
            .bind(challenge)
            .bind(record.last_totp_step)
            .bind(record.enabled_at)
            .bind(record.version);
        let query = if expected_version == 0 {
            query
        } else {
            query.bind(expected_version)
        };

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}
