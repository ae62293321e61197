//! Engine error type
//!
//! Validation-class variants carry what the caller needs to act on them
//! (limit, reset time, attempts left). `Storage` covers every infrastructure
//! failure and is fatal to the single request: callers must fail closed.

use chrono::{DateTime, Utc};
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::mfa::MfaMethod;
use crate::plan::PlanTier;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("quota exceeded for {resource}: limit {limit}, resets at {reset_at}")]
    QuotaExceeded {
        resource: String,
        limit: u64,
        reset_at: DateTime<Utc>,
    },

    #[error("{resource} is not enabled on the current plan")]
    ProviderDisabled { resource: String },

    #[error("plan '{0}' not found")]
    PlanNotFound(String),

    #[error("plan change from {current} to {requested} is not an upgrade")]
    PlanDowngradeNotAllowed {
        current: PlanTier,
        requested: PlanTier,
    },

    #[error("invalid plan definition: {0}")]
    InvalidPlanDefinition(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("subject '{0}' not found")]
    SubjectNotFound(String),

    #[error("units must be greater than zero")]
    InvalidUnits,

    #[error("metered actions are paused for maintenance")]
    MaintenanceMode,

    #[error("{0} verification requires a prerequisite that is missing")]
    MfaPrerequisiteMissing(MfaMethod),

    #[error("MFA is already enabled")]
    MfaAlreadyEnabled,

    #[error("MFA is not enabled")]
    MfaNotEnabled,

    #[error("verification challenge expired")]
    MfaChallengeExpired,

    #[error("verification code invalid ({attempts_remaining} attempts remaining)")]
    MfaCodeInvalid { attempts_remaining: u32 },

    #[error("another MFA setup is in progress")]
    MfaConflict,

    #[error("{0}")]
    MfaInvalidState(&'static str),

    #[error("failed to deliver verification code: {0}")]
    DeliveryFailed(String),

    #[error("session expired")]
    SessionExpired,

    #[error("session revoked")]
    SessionRevoked,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("a recent second-factor verification is required")]
    StepUpRequired,

    #[error("storage error: {0}")]
    Storage(#[source] BoxError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            Self::ProviderDisabled { .. } => ErrorCode::ProviderDisabled,
            Self::PlanNotFound(_) => ErrorCode::PlanNotFound,
            Self::PlanDowngradeNotAllowed { .. } => ErrorCode::PlanDowngradeNotAllowed,
            Self::InvalidPlanDefinition(_) => ErrorCode::InvalidPlanDefinition,
            Self::UnknownResource(_) => ErrorCode::UnknownResource,
            Self::SubjectNotFound(_) => ErrorCode::SubjectNotFound,
            Self::InvalidUnits => ErrorCode::InvalidUnits,
            Self::MaintenanceMode => ErrorCode::MaintenanceMode,
            Self::MfaPrerequisiteMissing(_) => ErrorCode::MfaPrerequisiteMissing,
            Self::MfaAlreadyEnabled => ErrorCode::MfaAlreadyEnabled,
            Self::MfaNotEnabled => ErrorCode::MfaNotEnabled,
            Self::MfaChallengeExpired => ErrorCode::MfaChallengeExpired,
            Self::MfaCodeInvalid { .. } => ErrorCode::MfaCodeInvalid,
            Self::MfaConflict => ErrorCode::MfaConflict,
            Self::MfaInvalidState(_) => ErrorCode::MfaInvalidState,
            Self::DeliveryFailed(_) => ErrorCode::DeliveryFailed,
            Self::SessionExpired => ErrorCode::SessionExpired,
            Self::SessionRevoked => ErrorCode::SessionRevoked,
            Self::TokenInvalid(_) => ErrorCode::TokenInvalid,
            Self::StepUpRequired => ErrorCode::StepUpRequired,
            Self::Storage(_) => ErrorCode::DatabaseError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Recoverable errors the caller can act on; everything else fails the request
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Internal(_))
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let code = err.code();
        match err {
            EngineError::QuotaExceeded {
                resource,
                limit,
                reset_at,
            } => AppError::new(code)
                .with_detail("resource", resource)
                .with_detail("limit", limit)
                .with_detail("reset_at", reset_at.to_rfc3339()),
            EngineError::ProviderDisabled { resource } => {
                AppError::new(code).with_detail("resource", resource)
            }
            EngineError::PlanDowngradeNotAllowed { current, requested } => AppError::new(code)
                .with_detail("current", current.as_str())
                .with_detail("requested", requested.as_str()),
            EngineError::MfaCodeInvalid { attempts_remaining } => {
                AppError::new(code).with_detail("attempts_remaining", attempts_remaining)
            }
            EngineError::MfaPrerequisiteMissing(method) => {
                AppError::new(code).with_detail("method", method.as_str())
            }
            EngineError::DeliveryFailed(_) => AppError::new(code).with_detail("retryable", true),
            EngineError::Storage(source) => {
                tracing::error!(error = %source, "Engine storage error");
                AppError::new(ErrorCode::InternalError)
            }
            EngineError::Internal(msg) => {
                tracing::error!(error = %msg, "Engine internal error");
                AppError::new(ErrorCode::InternalError)
            }
            other => AppError::with_message(code, other.to_string()),
        }
    }
}
