//! MFA endpoints
//!
//! Every successful verification returns a fresh token pair carrying the
//! proof time, so the client can present it for step-up protected calls.
//! Enabling and disabling bump the security stamp, which invalidates the
//! token used for the request itself.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use ward_core::clock::Clock;
use ward_core::mfa::{
    ChallengeSent, MfaMethod, MfaStatus, SetupOptions, SetupStarted, VerifyOutcome,
};
use ward_core::session::{Claims, SessionClaims, TokenPair};

use crate::error::ServiceResult;
use crate::state::AppState;

use super::ApiResult;

/// GET /api/mfa
pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<MfaStatus> {
    Ok(Json(state.mfa.status(&claims.sub).await?))
}

/// POST /api/mfa/setup
#[derive(Deserialize)]
pub struct SetupRequest {
    pub method: MfaMethod,
    #[serde(default)]
    pub phone: Option<String>,
}

pub async fn setup(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetupRequest>,
) -> ApiResult<SetupStarted> {
    let started = state
        .mfa
        .begin_setup(&claims.sub, req.method, SetupOptions { phone: req.phone })
        .await?;
    Ok(Json(started))
}

/// POST /api/mfa/challenge
pub async fn challenge(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<ChallengeSent> {
    Ok(Json(state.mfa.send_challenge(&claims.sub).await?))
}

#[derive(Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    /// `enabled` or `step_up`
    pub outcome: &'static str,
    pub method: MfaMethod,
    pub tokens: TokenPair,
}

async fn reissue(
    state: &AppState,
    claims: &Claims,
    outcome: VerifyOutcome,
) -> ServiceResult<VerifyResponse> {
    let (label, method) = match &outcome {
        VerifyOutcome::Enabled { method, .. } => ("enabled", *method),
        VerifyOutcome::StepUp { method, .. } => ("step_up", *method),
    };
    let tokens = state
        .sessions
        .issue(
            &claims.sub,
            &SessionClaims {
                role: claims.role,
                mfa_at: Some(outcome.verified_at()),
            },
        )
        .await?;
    Ok(VerifyResponse {
        outcome: label,
        method,
        tokens,
    })
}

/// POST /api/mfa/verify
pub async fn verify(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CodeRequest>,
) -> ApiResult<VerifyResponse> {
    let outcome = state.mfa.verify(&claims.sub, &req.code).await?;
    Ok(Json(reissue(&state, &claims, outcome).await?))
}

/// POST /api/mfa/backup-code
pub async fn backup_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CodeRequest>,
) -> ApiResult<VerifyResponse> {
    let outcome = state.mfa.redeem_backup_code(&claims.sub, &req.code).await?;
    Ok(Json(reissue(&state, &claims, outcome).await?))
}

#[derive(Serialize)]
pub struct DisableResponse {
    pub security_stamp: i64,
    pub tokens: TokenPair,
}

/// POST /api/mfa/disable
///
/// Turning off an enabled factor needs a recent proof of that factor.
pub async fn disable(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<DisableResponse> {
    if state.mfa.is_enabled(&claims.sub).await? {
        let max_age = state.engine.snapshot().step_up_max_age();
        claims.ensure_step_up(state.clock.now(), max_age)?;
    }
    let security_stamp = state.mfa.disable(&claims.sub).await?;
    let tokens = state
        .sessions
        .issue(
            &claims.sub,
            &SessionClaims {
                role: claims.role,
                mfa_at: None,
            },
        )
        .await?;
    Ok(Json(DisableResponse {
        security_stamp,
        tokens,
    }))
}
