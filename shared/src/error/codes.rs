//! Unified error codes for Ward
//!
//! This module defines all error codes shared by the engine, the cloud
//! service and API clients. Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication / session errors
//! - 2xxx: Permission errors
//! - 3xxx: Plan errors
//! - 4xxx: Quota / entitlement errors
//! - 5xxx: Multi-factor authentication errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 1xxx: Auth ====================
    /// Subject is not authenticated
    NotAuthenticated = 1001,
    /// Invalid credentials (email/password)
    InvalidCredentials = 1002,
    /// Token is invalid (bad signature, wrong type, malformed)
    TokenInvalid = 1004,
    /// Session has expired
    SessionExpired = 1005,
    /// Session was revoked by a security stamp change
    SessionRevoked = 1006,

    // ==================== 2xxx: Permission ====================
    /// Admin role required
    AdminRequired = 2003,
    /// A recent second-factor proof is required
    StepUpRequired = 2004,

    // ==================== 3xxx: Plan ====================
    /// Plan not found
    PlanNotFound = 3001,
    /// Plan change would not be an upgrade
    PlanDowngradeNotAllowed = 3002,
    /// Plan definition is malformed
    InvalidPlanDefinition = 3003,
    /// Subject account not found
    SubjectNotFound = 3004,

    // ==================== 4xxx: Quota ====================
    /// Quota for the resource is exhausted in the current window
    QuotaExceeded = 4001,
    /// Threat-intelligence provider is not enabled for the plan
    ProviderDisabled = 4002,
    /// Resource key is not recognised
    UnknownResource = 4003,
    /// Requested unit count is invalid
    InvalidUnits = 4004,
    /// Metered actions are paused for maintenance
    MaintenanceMode = 4005,

    // ==================== 5xxx: MFA ====================
    /// Prerequisite for the MFA method is missing (e.g. phone number)
    MfaPrerequisiteMissing = 5001,
    /// MFA is already enabled
    MfaAlreadyEnabled = 5002,
    /// Challenge expired or was invalidated
    MfaChallengeExpired = 5003,
    /// Code did not match
    MfaCodeInvalid = 5004,
    /// Concurrent MFA setup in progress
    MfaConflict = 5005,
    /// MFA is not enabled or set up
    MfaNotEnabled = 5006,
    /// Operation not valid in the current MFA state
    MfaInvalidState = 5007,
    /// OTP delivery failed (retryable)
    DeliveryFailed = 5008,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidRequest => "Invalid request",

            // Auth
            ErrorCode::NotAuthenticated => "Authentication required",
            ErrorCode::InvalidCredentials => "Invalid email or password",
            ErrorCode::TokenInvalid => "Invalid token",
            ErrorCode::SessionExpired => "Session has expired",
            ErrorCode::SessionRevoked => "Session has been revoked",

            // Permission
            ErrorCode::AdminRequired => "Administrator role required",
            ErrorCode::StepUpRequired => "Second-factor verification required",

            // Plan
            ErrorCode::PlanNotFound => "Plan not found",
            ErrorCode::PlanDowngradeNotAllowed => "Plan change must be an upgrade",
            ErrorCode::InvalidPlanDefinition => "Invalid plan definition",
            ErrorCode::SubjectNotFound => "Account not found",

            // Quota
            ErrorCode::QuotaExceeded => "Quota exceeded",
            ErrorCode::ProviderDisabled => "Provider not available on current plan",
            ErrorCode::UnknownResource => "Unknown resource",
            ErrorCode::InvalidUnits => "Unit count must be positive",
            ErrorCode::MaintenanceMode => "Service is in maintenance mode",

            // MFA
            ErrorCode::MfaPrerequisiteMissing => "MFA prerequisite missing",
            ErrorCode::MfaAlreadyEnabled => "MFA is already enabled",
            ErrorCode::MfaChallengeExpired => "Verification challenge expired",
            ErrorCode::MfaCodeInvalid => "Verification code invalid",
            ErrorCode::MfaConflict => "MFA setup already in progress",
            ErrorCode::MfaNotEnabled => "MFA is not enabled",
            ErrorCode::MfaInvalidState => "Operation not allowed in current MFA state",
            ErrorCode::DeliveryFailed => "Failed to deliver verification code",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            5 => Ok(ErrorCode::InvalidRequest),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidCredentials),
            1004 => Ok(ErrorCode::TokenInvalid),
            1005 => Ok(ErrorCode::SessionExpired),
            1006 => Ok(ErrorCode::SessionRevoked),

            // Permission
            2003 => Ok(ErrorCode::AdminRequired),
            2004 => Ok(ErrorCode::StepUpRequired),

            // Plan
            3001 => Ok(ErrorCode::PlanNotFound),
            3002 => Ok(ErrorCode::PlanDowngradeNotAllowed),
            3003 => Ok(ErrorCode::InvalidPlanDefinition),
            3004 => Ok(ErrorCode::SubjectNotFound),

            // Quota
            4001 => Ok(ErrorCode::QuotaExceeded),
            4002 => Ok(ErrorCode::ProviderDisabled),
            4003 => Ok(ErrorCode::UnknownResource),
            4004 => Ok(ErrorCode::InvalidUnits),
            4005 => Ok(ErrorCode::MaintenanceMode),

            // MFA
            5001 => Ok(ErrorCode::MfaPrerequisiteMissing),
            5002 => Ok(ErrorCode::MfaAlreadyEnabled),
            5003 => Ok(ErrorCode::MfaChallengeExpired),
            5004 => Ok(ErrorCode::MfaCodeInvalid),
            5005 => Ok(ErrorCode::MfaConflict),
            5006 => Ok(ErrorCode::MfaNotEnabled),
            5007 => Ok(ErrorCode::MfaInvalidState),
            5008 => Ok(ErrorCode::DeliveryFailed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::SessionRevoked.code(), 1006);
        assert_eq!(ErrorCode::StepUpRequired.code(), 2004);
        assert_eq!(ErrorCode::PlanDowngradeNotAllowed.code(), 3002);
        assert_eq!(ErrorCode::QuotaExceeded.code(), 4001);
        assert_eq!(ErrorCode::ProviderDisabled.code(), 4002);
        assert_eq!(ErrorCode::MfaCodeInvalid.code(), 5004);
        assert_eq!(ErrorCode::DeliveryFailed.code(), 5008);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::QuotaExceeded.is_success());
        assert!(!ErrorCode::InternalError.is_success());
    }

    #[test]
    fn test_try_from_roundtrips_every_code() {
        let all = [
            ErrorCode::Success,
            ErrorCode::ValidationFailed,
            ErrorCode::InvalidRequest,
            ErrorCode::NotAuthenticated,
            ErrorCode::InvalidCredentials,
            ErrorCode::TokenInvalid,
            ErrorCode::SessionExpired,
            ErrorCode::SessionRevoked,
            ErrorCode::AdminRequired,
            ErrorCode::StepUpRequired,
            ErrorCode::PlanNotFound,
            ErrorCode::PlanDowngradeNotAllowed,
            ErrorCode::InvalidPlanDefinition,
            ErrorCode::SubjectNotFound,
            ErrorCode::QuotaExceeded,
            ErrorCode::ProviderDisabled,
            ErrorCode::UnknownResource,
            ErrorCode::InvalidUnits,
            ErrorCode::MaintenanceMode,
            ErrorCode::MfaPrerequisiteMissing,
            ErrorCode::MfaAlreadyEnabled,
            ErrorCode::MfaChallengeExpired,
            ErrorCode::MfaCodeInvalid,
            ErrorCode::MfaConflict,
            ErrorCode::MfaNotEnabled,
            ErrorCode::MfaInvalidState,
            ErrorCode::DeliveryFailed,
            ErrorCode::InternalError,
            ErrorCode::DatabaseError,
        ];
        for code in all {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(999), Err(InvalidErrorCode(999)));
        assert_eq!(ErrorCode::try_from(4999), Err(InvalidErrorCode(4999)));
    }

    #[test]
    fn test_retired_codes_are_not_accepted() {
        for retired in [1u16, 3, 4, 1007, 2001, 9003] {
            assert_eq!(ErrorCode::try_from(retired), Err(InvalidErrorCode(retired)));
        }
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::QuotaExceeded).unwrap();
        assert_eq!(json, "4001");
        let code: ErrorCode = serde_json::from_str("5005").unwrap();
        assert_eq!(code, ErrorCode::MfaConflict);
        assert!(serde_json::from_str::<ErrorCode>("1234").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorCode::PlanNotFound.to_string(), "3001");
        assert_eq!(
            InvalidErrorCode(42).to_string(),
            "invalid error code: 42"
        );
    }
}
