//! Metered actions: check-and-consume, usage, model access
//!
//! Authenticated callers are metered on their plan; everyone else on the
//! fixed guest limits keyed by fingerprint.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use shared::entitlement::{Decision, UsageView};
use shared::error::AppError;
use ward_core::entitlement::Subject;
use ward_core::plan::ModelCategory;
use ward_core::resource::Resource;
use ward_core::session::Claims;

use crate::auth::GuestKey;
use crate::error::ServiceResult;
use crate::state::AppState;

use super::ApiResult;

async fn resolve_subject(
    state: &AppState,
    claims: Option<Extension<Claims>>,
    guest: Option<Extension<GuestKey>>,
) -> ServiceResult<Subject> {
    match (claims, guest) {
        (Some(Extension(claims)), _) => Ok(state.checker.identify(&claims.sub).await?),
        (None, Some(Extension(GuestKey(fingerprint)))) => Ok(Subject::Guest(fingerprint)),
        (None, None) => Err(AppError::not_authenticated().into()),
    }
}

/// POST /api/entitlements/check
#[derive(Deserialize)]
pub struct CheckRequest {
    pub resource: String,
    #[serde(default = "one")]
    pub units: u64,
}

fn one() -> u64 {
    1
}

pub async fn check(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    guest: Option<Extension<GuestKey>>,
    Json(req): Json<CheckRequest>,
) -> ApiResult<Decision> {
    let resource: Resource = req.resource.parse()?;
    let subject = resolve_subject(&state, claims, guest).await?;
    let decision = state
        .checker
        .check_and_consume(&subject, &resource, req.units)
        .await?;
    Ok(Json(decision))
}

/// GET /api/entitlements/usage/{resource}
pub async fn usage(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    guest: Option<Extension<GuestKey>>,
    Path(resource): Path<String>,
) -> ApiResult<UsageView> {
    let resource: Resource = resource.parse()?;
    let subject = resolve_subject(&state, claims, guest).await?;
    Ok(Json(state.checker.usage(&subject, &resource).await?))
}

#[derive(Deserialize)]
pub struct ModelAccessQuery {
    pub provider: Option<String>,
}

#[derive(Serialize)]
pub struct ModelAccess {
    pub category: ModelCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub allowed: bool,
}

/// GET /api/models/{category}?provider=
pub async fn model_access(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    guest: Option<Extension<GuestKey>>,
    Path(category): Path<ModelCategory>,
    Query(query): Query<ModelAccessQuery>,
) -> ApiResult<ModelAccess> {
    let subject = resolve_subject(&state, claims, guest).await?;
    let allowed = match query.provider.as_deref() {
        Some(provider) => state.checker.can_use_model_from(&subject, category, provider),
        None => state.checker.can_use_model(&subject, category),
    };
    Ok(Json(ModelAccess {
        category,
        provider: query.provider,
        allowed,
    }))
}
