//! MFA record and state

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MfaMethod {
    Email,
    Sms,
    Totp,
}

impl MfaMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Totp => "totp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            "totp" => Some(Self::Totp),
            _ => None,
        }
    }

    /// Email and SMS receive a delivered code; TOTP is computed locally
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Email | Self::Sms)
    }
}

impl fmt::Display for MfaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "method", rename_all = "snake_case")]
pub enum MfaState {
    Disabled,
    PendingSetup(MfaMethod),
    AwaitingVerification(MfaMethod),
    Enabled(MfaMethod),
}

impl MfaState {
    pub fn method(&self) -> Option<MfaMethod> {
        match self {
            Self::Disabled => None,
            Self::PendingSetup(m) | Self::AwaitingVerification(m) | Self::Enabled(m) => Some(*m),
        }
    }

    pub fn phase(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::PendingSetup(_) => "pending_setup",
            Self::AwaitingVerification(_) => "awaiting_verification",
            Self::Enabled(_) => "enabled",
        }
    }

    pub fn is_setting_up(&self) -> bool {
        matches!(self, Self::PendingSetup(_) | Self::AwaitingVerification(_))
    }

    /// Rebuild from stored `(phase, method)` columns
    pub fn from_parts(phase: &str, method: Option<&str>) -> Option<Self> {
        let method = method.and_then(MfaMethod::parse);
        match (phase, method) {
            ("disabled", _) => Some(Self::Disabled),
            ("pending_setup", Some(m)) => Some(Self::PendingSetup(m)),
            ("awaiting_verification", Some(m)) => Some(Self::AwaitingVerification(m)),
            ("enabled", Some(m)) => Some(Self::Enabled(m)),
            _ => None,
        }
    }
}

/// Outstanding code or attempt budget
///
/// For delivered codes `code_hash` holds the code digest. TOTP has no stored
/// code: the entry only bounds attempts until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub code_hash: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub attempts_remaining: u32,
}

impl Challenge {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.attempts_remaining > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaRecord {
    pub subject_id: String,
    pub state: MfaState,
    /// Encrypted TOTP secret
    pub secret: Option<String>,
    /// Digests of unused backup codes
    pub backup_codes: Option<Vec<String>>,
    pub challenge: Option<Challenge>,
    /// Last accepted TOTP time step, rejects replays
    pub last_totp_step: Option<i64>,
    pub enabled_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version; 0 means never stored
    pub version: i64,
}

impl MfaRecord {
    pub fn new(subject_id: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            state: MfaState::Disabled,
            secret: None,
            backup_codes: None,
            challenge: None,
            last_totp_step: None,
            enabled_at: None,
            version: 0,
        }
    }

    /// Same subject and version, everything else reset
    pub fn cleared(&self) -> Self {
        Self {
            version: self.version,
            ..Self::new(&self.subject_id)
        }
    }
}

/// Public view of a subject's MFA configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaStatus {
    pub phase: String,
    pub method: Option<MfaMethod>,
    pub enabled: bool,
    pub backup_codes_remaining: usize,
    pub challenge_pending: bool,
    pub challenge_expires_at: Option<DateTime<Utc>>,
}

impl MfaStatus {
    pub fn from_record(record: &MfaRecord, now: DateTime<Utc>) -> Self {
        let live = record
            .challenge
            .as_ref()
            .filter(|c| c.code_hash.is_some() || record.state.is_setting_up())
            .filter(|c| c.is_live(now));
        Self {
            phase: record.state.phase().to_string(),
            method: record.state.method(),
            enabled: matches!(record.state, MfaState::Enabled(_)),
            backup_codes_remaining: record.backup_codes.as_ref().map_or(0, Vec::len),
            challenge_pending: live.is_some(),
            challenge_expires_at: live.map(|c| c.expires_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parts_roundtrip() {
        for state in [
            MfaState::Disabled,
            MfaState::PendingSetup(MfaMethod::Sms),
            MfaState::AwaitingVerification(MfaMethod::Email),
            MfaState::Enabled(MfaMethod::Totp),
        ] {
            let method = state.method().map(|m| m.as_str());
            assert_eq!(MfaState::from_parts(state.phase(), method), Some(state));
        }
        assert_eq!(MfaState::from_parts("enabled", None), None);
    }

    #[test]
    fn test_state_serializes_with_phase_tag() {
        let json = serde_json::to_value(MfaState::PendingSetup(MfaMethod::Totp)).unwrap();
        assert_eq!(json, serde_json::json!({ "phase": "pending_setup", "method": "totp" }));
    }
}
