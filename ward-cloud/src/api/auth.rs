//! Authentication endpoints: login and token refresh

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use ward_core::account::Role;
use ward_core::mfa::MfaMethod;
use ward_core::session::{SessionClaims, TokenPair};

use crate::db;
use crate::state::AppState;
use crate::util::verify_password;

use super::ApiResult;

/// POST /api/auth/login
///
/// With MFA enabled the password alone is not enough: the first call returns
/// `mfa_required` (and sends a code for e-mail/SMS), the second call repeats
/// the credentials with `mfa_code` or `backup_code`.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub mfa_code: Option<String>,
    #[serde(default)]
    pub backup_code: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Authenticated {
        subject_id: String,
        tokens: TokenPair,
    },
    MfaRequired {
        method: Option<MfaMethod>,
        challenge_expires_at: Option<DateTime<Utc>>,
    },
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let email = req.email.trim().to_lowercase();
    let creds = db::accounts::find_credentials(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::InvalidCredentials))?;

    if !verify_password(&req.password, &creds.password_hash) {
        return Err(AppError::new(ErrorCode::InvalidCredentials).into());
    }

    let role = Role::parse(&creds.role)
        .ok_or_else(|| AppError::internal(format!("account {} has unknown role", creds.id)))?;

    let mut mfa_at = None;
    let status = state.mfa.status(&creds.id).await?;
    if status.enabled {
        let mfa_code = req.mfa_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let backup_code = req.backup_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let outcome = match (mfa_code, backup_code) {
            (Some(code), _) => state.mfa.verify(&creds.id, code).await?,
            (None, Some(code)) => state.mfa.redeem_backup_code(&creds.id, code).await?,
            (None, None) => {
                let challenge_expires_at = match status.method {
                    Some(method) if method.is_delivered() => {
                        Some(state.mfa.send_challenge(&creds.id).await?.expires_at)
                    }
                    _ => None,
                };
                return Ok(Json(LoginResponse::MfaRequired {
                    method: status.method,
                    challenge_expires_at,
                }));
            }
        };
        mfa_at = Some(outcome.verified_at());
    }

    let tokens = state
        .sessions
        .issue(&creds.id, &SessionClaims { role, mfa_at })
        .await?;

    let detail = serde_json::json!({ "mfa": mfa_at.is_some() });
    let _ = db::audit::log(
        &state.pool,
        &creds.id,
        "login",
        Some(&detail),
        shared::util::now_millis(),
    )
    .await;

    Ok(Json(LoginResponse::Authenticated {
        subject_id: creds.id,
        tokens,
    }))
}

/// POST /api/auth/refresh
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<TokenPair> {
    let tokens = state.sessions.refresh(&req.refresh_token).await?;
    Ok(Json(tokens))
}
