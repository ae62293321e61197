//! Administration: plan catalog, subject plans, audit trail, maintenance

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use shared::error::AppError;
use shared::plan::{PlanDefinition, PlanPatchRequest};
use ward_core::entitlement::PlanChangeActor;
use ward_core::plan::{PlanPatch, PlanTier};
use ward_core::session::Claims;

use crate::db;
use crate::db::audit::AuditEntry;
use crate::state::AppState;

use super::ApiResult;
use super::account::PlanChangeResponse;

/// GET /api/admin/plans
pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Vec<PlanDefinition>> {
    let plans = state.catalog.list().await?;
    Ok(Json(plans.iter().map(|p| p.to_definition()).collect()))
}

/// PUT /api/admin/plans/{id}
pub async fn put_plan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(definition): Json<PlanDefinition>,
) -> ApiResult<PlanDefinition> {
    if !definition.plan_id.eq_ignore_ascii_case(&id) {
        return Err(AppError::validation("planId does not match the path").into());
    }
    let plan = state.catalog.upsert(&definition).await?;
    tracing::info!(admin = %claims.sub, plan = %plan.tier, "Plan replaced");
    Ok(Json(plan.to_definition()))
}

/// PATCH /api/admin/plans/{id}
pub async fn patch_plan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<PlanPatchRequest>,
) -> ApiResult<PlanDefinition> {
    let tier: PlanTier = id.parse()?;
    let patch = PlanPatch::from_request(&req)?;
    if patch.is_empty() {
        return Err(AppError::validation("Patch contains no changes").into());
    }
    let plan = state.catalog.patch(tier, &patch).await?;
    tracing::info!(admin = %claims.sub, plan = %tier, "Plan patched");
    Ok(Json(plan.to_definition()))
}

/// PUT /api/admin/subjects/{id}/plan
#[derive(Deserialize)]
pub struct SubjectPlanRequest {
    pub plan: String,
    /// Allow downgrades and same-rank changes
    #[serde(default)]
    pub override_rank: bool,
}

pub async fn set_subject_plan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<SubjectPlanRequest>,
) -> ApiResult<PlanChangeResponse> {
    let requested: PlanTier = req.plan.parse()?;
    let change = state
        .checker
        .change_plan(
            &id,
            requested,
            PlanChangeActor::Administrator {
                override_rank: req.override_rank,
            },
        )
        .await?;
    tracing::info!(
        admin = %claims.sub,
        subject = %id,
        from = %change.from,
        to = %change.to,
        "Subject plan set by administrator"
    );
    Ok(Json(PlanChangeResponse {
        from: change.from,
        to: change.to,
        anchor: change.anchor,
    }))
}

/// GET /api/admin/subjects/{id}/audit
#[derive(Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn subject_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEntry>> {
    let limit = query.limit.clamp(1, 200);
    let offset = query.offset.max(0);
    let entries = db::audit::query(&state.pool, &id, limit, offset).await?;
    Ok(Json(entries))
}

/// PUT /api/admin/maintenance
#[derive(Deserialize, Serialize)]
pub struct MaintenanceRequest {
    pub enabled: bool,
}

pub async fn set_maintenance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MaintenanceRequest>,
) -> ApiResult<MaintenanceRequest> {
    db::settings::set_maintenance_mode(&state.pool, req.enabled, shared::util::now_millis()).await?;
    state.engine.update(|c| c.maintenance_mode = req.enabled);
    tracing::warn!(admin = %claims.sub, enabled = req.enabled, "Maintenance mode changed");
    Ok(Json(req))
}
