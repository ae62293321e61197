//! Session authentication middleware
//!
//! Verified [`Claims`] are stored in request extensions. Guests (no
//! `Authorization` header on optional routes) get a [`GuestKey`] built from
//! the client address and user agent instead.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use shared::error::{AppError, ErrorCode};
use ward_core::entitlement::Fingerprint;
use ward_core::session::Claims;

use crate::state::AppState;
use crate::util::{client_ip, user_agent};

/// Fingerprint of an unauthenticated caller
#[derive(Debug, Clone)]
pub struct GuestKey(pub Fingerprint);

fn bearer_token(request: &Request) -> Result<Option<String>, AppError> {
    let Some(header) = request.headers().get(http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| AppError::with_message(ErrorCode::TokenInvalid, "Invalid Authorization header"))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::with_message(ErrorCode::TokenInvalid, "Invalid Authorization format"))?;
    Ok(Some(token.trim().to_string()))
}

async fn verify(state: &AppState, token: &str) -> Result<Claims, AppError> {
    state.sessions.verify(token).await.map_err(|e| {
        tracing::debug!(error = %e, "Session token rejected");
        AppError::from(e)
    })
}

/// Require a valid access token
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?.ok_or_else(AppError::not_authenticated)?;
    let claims = verify(&state, &token).await?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Accept a valid access token or fall back to a guest fingerprint
///
/// A present but invalid token is rejected rather than downgraded to guest.
pub async fn optional_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match bearer_token(&request)? {
        Some(token) => {
            let claims = verify(&state, &token).await?;
            request.extensions_mut().insert(claims);
        }
        None => {
            let fingerprint = Fingerprint::derive(
                &client_ip(&request, state.trusted_proxy_hops),
                &user_agent(&request),
            );
            request.extensions_mut().insert(GuestKey(fingerprint));
        }
    }
    Ok(next.run(request).await)
}

/// Require an administrator; layered inside `require_session`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<Claims>()
        .is_some_and(Claims::is_admin);
    if !is_admin {
        return Err(AppError::new(ErrorCode::AdminRequired));
    }
    Ok(next.run(request).await)
}
