//! Plan definition rows

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::plan::{BillingPeriod, PlanDefinition, WirePlanLimits};
use sqlx::PgPool;
use ward_core::BoxError;
use ward_core::plan::{PlanStore, PlanTier};

#[derive(sqlx::FromRow)]
struct PlanRow {
    plan_id: String,
    price: Decimal,
    period: String,
    limits: serde_json::Value,
}

impl TryFrom<PlanRow> for PlanDefinition {
    type Error = BoxError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let period = match row.period.as_str() {
            "monthly" => BillingPeriod::Monthly,
            "yearly" => BillingPeriod::Yearly,
            other => return Err(format!("plan {}: unknown period '{other}'", row.plan_id).into()),
        };
        let limits: WirePlanLimits = serde_json::from_value(row.limits)
            .map_err(|e| format!("plan {}: malformed limits: {e}", row.plan_id))?;
        Ok(PlanDefinition {
            plan_id: row.plan_id,
            price: row.price,
            period,
            limits,
        })
    }
}

#[derive(Clone)]
pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn load(&self, tier: PlanTier) -> Result<Option<PlanDefinition>, BoxError> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT plan_id, price, period, limits FROM plans WHERE plan_id = $1",
        )
        .bind(tier.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(PlanDefinition::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<PlanDefinition>, BoxError> {
        let rows = sqlx::query_as::<_, PlanRow>(
            "SELECT plan_id, price, period, limits FROM plans ORDER BY plan_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match PlanDefinition::try_from(row) {
                Ok(def) => Some(def),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable plan row");
                    None
                }
            })
            .collect())
    }

    async fn save(&self, definition: &PlanDefinition) -> Result<(), BoxError> {
        let limits = serde_json::to_value(&definition.limits)?;
        sqlx::query(
            "INSERT INTO plans (plan_id, price, period, limits, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (plan_id) DO UPDATE
             SET price = EXCLUDED.price, period = EXCLUDED.period,
                 limits = EXCLUDED.limits, updated_at = EXCLUDED.updated_at",
        )
        .bind(&definition.plan_id)
        .bind(definition.price)
        .bind(definition.period.as_str())
        .bind(limits)
        .bind(shared::util::now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
