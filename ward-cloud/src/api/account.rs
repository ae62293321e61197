//! Account endpoints: profile and self-service upgrade

use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ward_core::EngineError;
use ward_core::account::{AccountStore, Role};
use ward_core::entitlement::PlanChangeActor;
use ward_core::mfa::MfaStatus;
use ward_core::plan::PlanTier;
use ward_core::session::Claims;

use crate::state::AppState;

use super::ApiResult;

#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub plan: PlanTier,
    pub plan_anchor: DateTime<Utc>,
    pub mfa: MfaStatus,
}

/// GET /api/account
pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<ProfileResponse> {
    let account = state
        .accounts
        .load(&claims.sub)
        .await
        .map_err(EngineError::Storage)?
        .ok_or_else(|| EngineError::SubjectNotFound(claims.sub.clone()))?;
    let mfa = state.mfa.status(&claims.sub).await?;
    Ok(Json(ProfileResponse {
        id: account.id,
        email: account.email,
        phone: account.phone,
        role: account.role,
        plan: account.plan,
        plan_anchor: account.plan_anchor,
        mfa,
    }))
}

/// POST /api/account/plan
#[derive(Deserialize)]
pub struct UpgradeRequest {
    pub plan: String,
}

#[derive(Serialize)]
pub struct PlanChangeResponse {
    pub from: PlanTier,
    pub to: PlanTier,
    pub anchor: DateTime<Utc>,
}

pub async fn upgrade_plan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpgradeRequest>,
) -> ApiResult<PlanChangeResponse> {
    let requested: PlanTier = req.plan.parse()?;
    let change = state
        .checker
        .change_plan(&claims.sub, requested, PlanChangeActor::Subject)
        .await?;
    Ok(Json(PlanChangeResponse {
        from: change.from,
        to: change.to,
        anchor: change.anchor,
    }))
}
