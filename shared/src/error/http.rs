//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::PlanNotFound | Self::SubjectNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::PlanDowngradeNotAllowed
            | Self::MfaAlreadyEnabled
            | Self::MfaConflict
            | Self::MfaInvalidState => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated
            | Self::InvalidCredentials
            | Self::TokenInvalid
            | Self::SessionExpired
            | Self::SessionRevoked => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            Self::AdminRequired
            | Self::StepUpRequired
            | Self::ProviderDisabled => StatusCode::FORBIDDEN,

            // 429 Too Many Requests
            Self::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::DeliveryFailed | Self::MaintenanceMode => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::InternalError | Self::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_status() {
        assert_eq!(ErrorCode::Success.http_status(), StatusCode::OK);
    }

    #[test]
    fn test_quota_status() {
        assert_eq!(
            ErrorCode::QuotaExceeded.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::ProviderDisabled.http_status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_session_status() {
        assert_eq!(
            ErrorCode::SessionExpired.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::SessionRevoked.http_status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_mfa_status() {
        assert_eq!(ErrorCode::MfaConflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::MfaCodeInvalid.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::DeliveryFailed.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_internal_status() {
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::DatabaseError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
