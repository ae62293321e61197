//! API routes for ward-cloud

mod account;
mod admin;
mod auth;
mod entitlements;
mod health;
mod mfa;
mod payments;

use axum::routing::{get, post, put};
use axum::{Json, Router, middleware};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{optional_session, require_admin, require_session};
use crate::error::ServiceError;
use crate::state::AppState;

pub type ApiResult<T> = Result<Json<T>, ServiceError>;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // No session
    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/payments/notify", post(payments::notify));

    // Session optional: guests are metered by fingerprint
    let metered = Router::new()
        .route("/api/entitlements/check", post(entitlements::check))
        .route(
            "/api/entitlements/usage/{resource}",
            get(entitlements::usage),
        )
        .route("/api/models/{category}", get(entitlements::model_access))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_session,
        ));

    let session = Router::new()
        .route("/api/account", get(account::profile))
        .route("/api/account/plan", post(account::upgrade_plan))
        .route("/api/mfa", get(mfa::status))
        .route("/api/mfa/setup", post(mfa::setup))
        .route("/api/mfa/challenge", post(mfa::challenge))
        .route("/api/mfa/verify", post(mfa::verify))
        .route("/api/mfa/backup-code", post(mfa::backup_code))
        .route("/api/mfa/disable", post(mfa::disable))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let admin = Router::new()
        .route("/api/admin/plans", get(admin::list_plans))
        .route(
            "/api/admin/plans/{id}",
            put(admin::put_plan).patch(admin::patch_plan),
        )
        .route("/api/admin/subjects/{id}/plan", put(admin::set_subject_plan))
        .route("/api/admin/subjects/{id}/audit", get(admin::subject_audit))
        .route("/api/admin/maintenance", put(admin::set_maintenance))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public)
        .merge(metered)
        .merge(session)
        .merge(admin)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
