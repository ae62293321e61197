//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code:
/// - 0xxx: General errors
/// - 1xxx: Authentication errors
/// - 2xxx: Permission errors
/// - 3xxx: Plan errors
/// - 4xxx: Quota errors
/// - 5xxx: MFA errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Authentication errors (1xxx)
    Auth,
    /// Permission errors (2xxx)
    Permission,
    /// Plan errors (3xxx)
    Plan,
    /// Quota errors (4xxx)
    Quota,
    /// MFA errors (5xxx)
    Mfa,
    /// System errors (9xxx and anything unassigned)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Auth,
            2000..3000 => Self::Permission,
            3000..4000 => Self::Plan,
            4000..5000 => Self::Quota,
            5000..6000 => Self::Mfa,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Plan => "plan",
            Self::Quota => "quota",
            Self::Mfa => "mfa",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(1005), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_code(2004), ErrorCategory::Permission);
        assert_eq!(ErrorCategory::from_code(3002), ErrorCategory::Plan);
        assert_eq!(ErrorCategory::from_code(4001), ErrorCategory::Quota);
        assert_eq!(ErrorCategory::from_code(5008), ErrorCategory::Mfa);
        assert_eq!(ErrorCategory::from_code(7000), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::QuotaExceeded.category(), ErrorCategory::Quota);
        assert_eq!(ErrorCode::MfaConflict.category(), ErrorCategory::Mfa);
        assert_eq!(ErrorCode::PlanNotFound.category(), ErrorCategory::Plan);
        assert_eq!(ErrorCode::InternalError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Quota).unwrap();
        assert_eq!(json, "\"quota\"");
        let category: ErrorCategory = serde_json::from_str("\"mfa\"").unwrap();
        assert_eq!(category, ErrorCategory::Mfa);
        assert_eq!(ErrorCategory::Plan.name(), "plan");
    }
}
