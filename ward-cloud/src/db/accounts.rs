//! Account rows

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use ward_core::BoxError;
use ward_core::account::{Account, AccountStore, Role};
use ward_core::plan::PlanTier;

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    email: String,
    phone: Option<String>,
    role: String,
    plan: String,
    plan_anchor: DateTime<Utc>,
    security_stamp: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = BoxError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role =
            Role::parse(&row.role).ok_or_else(|| format!("unknown role '{}'", row.role))?;
        let plan: PlanTier = row.plan.parse()?;
        Ok(Account {
            id: row.id,
            email: row.email,
            phone: row.phone,
            role,
            plan,
            plan_anchor: row.plan_anchor,
            security_stamp: row.security_stamp,
        })
    }
}

/// Login lookup
#[derive(sqlx::FromRow)]
pub struct Credentials {
    pub id: String,
    pub password_hash: String,
    pub role: String,
}

pub async fn find_credentials(pool: &PgPool, email: &str) -> Result<Option<Credentials>, BoxError> {
    let row = sqlx::query_as::<_, Credentials>(
        "SELECT id, password_hash, role FROM accounts WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Create the administrator account if the e-mail is not taken yet
pub async fn ensure_admin(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    now: i64,
) -> Result<bool, BoxError> {
    let result = sqlx::query(
        "INSERT INTO accounts (id, email, password_hash, role, plan, plan_anchor, created_at)
         VALUES ($1, $2, $3, 'admin', 'enterprise', now(), $4)
         ON CONFLICT (email) DO NOTHING",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(email)
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn load(&self, subject_id: &str) -> Result<Option<Account>, BoxError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, phone, role, plan, plan_anchor, security_stamp FROM accounts WHERE id = $1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Account::try_from).transpose()
    }

    async fn set_plan(
        &self,
        subject_id: &str,
        expected: PlanTier,
        plan: PlanTier,
        anchor: DateTime<Utc>,
    ) -> Result<bool, BoxError> {
        let result = sqlx::query(
            "UPDATE accounts SET plan = $3, plan_anchor = $4 WHERE id = $1 AND plan = $2",
        )
        .bind(subject_id)
        .bind(expected.as_str())
        .bind(plan.as_str())
        .bind(anchor)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_phone(&self, subject_id: &str, phone: Option<&str>) -> Result<bool, BoxError> {
        let result = sqlx::query("UPDATE accounts SET phone = $2 WHERE id = $1")
            .bind(subject_id)
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn security_stamp(&self, subject_id: &str) -> Result<Option<i64>, BoxError> {
        let stamp: Option<i64> =
            sqlx::query_scalar("SELECT security_stamp FROM accounts WHERE id = $1")
                .bind(subject_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(stamp)
    }

    async fn bump_security_stamp(&self, subject_id: &str) -> Result<Option<i64>, BoxError> {
        let stamp: Option<i64> = sqlx::query_scalar(
            "UPDATE accounts SET security_stamp = security_stamp + 1 WHERE id = $1 RETURNING security_stamp",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stamp)
    }
}
