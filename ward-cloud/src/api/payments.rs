//! Payment notification handler
//!
//! POST /api/payments/notify: raw body for signature verification. Plan
//! changes that can never succeed are acknowledged so the provider stops
//! retrying; transient failures return 500 and are retried.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use ward_core::EngineError;
use ward_core::clock::Clock;
use ward_core::entitlement::PlanChangeActor;
use ward_core::plan::PlanTier;

use crate::db;
use crate::payments::{PaymentEvent, verify_signature};
use crate::state::AppState;

pub async fn notify(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let Some(sig_header) = headers
        .get("x-payment-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing X-Payment-Signature header");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(e) = verify_signature(
        &body,
        sig_header,
        &state.payment_webhook_secret,
        state.clock.now().timestamp(),
    ) {
        tracing::warn!(error = e, "Payment notification signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    let event: PaymentEvent = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse payment notification");
            return StatusCode::BAD_REQUEST;
        }
    };
    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Received payment notification");

    // Idempotency: insert first, the loser of a concurrent delivery skips
    match db::payments::mark_processed(
        &state.pool,
        &event.id,
        &event.event_type,
        shared::util::now_millis(),
    )
    .await
    {
        Ok(false) => {
            tracing::info!(event_id = %event.id, "Duplicate payment notification, skipping");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(%e, "DB error recording payment notification");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        Ok(true) => {}
    }

    match event.event_type.as_str() {
        "subscription.activated" | "subscription.upgraded" => {
            handle_plan_purchase(&state, &event).await
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled payment notification type");
            StatusCode::OK
        }
    }
}

async fn handle_plan_purchase(state: &AppState, event: &PaymentEvent) -> StatusCode {
    let Some(plan) = event.plan.as_deref() else {
        tracing::warn!(event_id = %event.id, "Plan purchase without plan");
        return StatusCode::OK;
    };
    let requested: PlanTier = match plan.parse() {
        Ok(tier) => tier,
        Err(e) => {
            tracing::warn!(event_id = %event.id, error = %e, "Plan purchase for unknown plan");
            return StatusCode::OK;
        }
    };

    match state
        .checker
        .change_plan(&event.subject_id, requested, PlanChangeActor::PaymentGateway)
        .await
    {
        Ok(change) => {
            tracing::info!(
                subject = %event.subject_id,
                from = %change.from,
                to = %change.to,
                "Plan upgraded by payment"
            );
            StatusCode::OK
        }
        Err(
            e @ (EngineError::PlanDowngradeNotAllowed { .. }
            | EngineError::PlanNotFound(_)
            | EngineError::SubjectNotFound(_)),
        ) => {
            tracing::warn!(event_id = %event.id, error = %e, "Payment notification not applicable");
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "Plan change from payment failed");
            if let Err(e) = db::payments::unmark(&state.pool, &event.id).await {
                tracing::error!(%e, "Failed to release payment notification for retry");
            }
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
