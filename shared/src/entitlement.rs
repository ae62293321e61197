//! Entitlement decision DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a metered action was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    QuotaExceeded,
    ProviderDisabled,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota_exceeded",
            Self::ProviderDisabled => "provider_disabled",
        }
    }
}

/// Result of `checkAndConsume`
///
/// `remaining` is `None` for unlimited resources and for hard-disabled
/// providers; `reset_at` is the end of the current quota window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
    pub reason: Option<DenyReason>,
}

impl Decision {
    pub fn allow(remaining: Option<u64>, reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason, reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            allowed: false,
            remaining: match reason {
                DenyReason::QuotaExceeded => Some(0),
                DenyReason::ProviderDisabled => None,
            },
            reset_at,
            reason: Some(reason),
        }
    }
}

/// Current usage snapshot for one resource (`peek`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageView {
    pub resource: String,
    pub consumed: u64,
    /// `None` when the resource is unlimited
    pub limit: Option<u64>,
    pub window_end: DateTime<Utc>,
}
