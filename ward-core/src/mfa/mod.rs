//! Multi-factor step-up gate
//!
//! State machine per subject:
//!
//! ```text
//! Disabled -> PendingSetup(m) -> AwaitingVerification(m) -> Enabled(m)
//!     ^                                                        |
//!     +----------------------- disable() ---------------------+
//! ```
//!
//! TOTP goes straight from `PendingSetup` to `Enabled`. Every write is a
//! versioned compare-and-swap on the record, so two concurrent flows for the
//! same subject cannot silently replace each other's challenge.

mod delivery;
mod state;
mod store;
pub mod totp;

pub use delivery::{LogSender, OtpDelivery, OtpSender};
pub use state::{Challenge, MfaMethod, MfaRecord, MfaState, MfaStatus};
pub use store::{MemoryMfaStore, MfaStore};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::account::{Account, AccountStore};
use crate::audit::{AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::config::{ConfigHandle, EngineConfig};
use crate::crypto::{SecretCipher, code_matches, digest_code};
use crate::error::EngineError;

const BACKUP_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const BACKUP_CODE_LEN: usize = 10;
const DISABLE_ATTEMPTS: usize = 3;

/// Optional inputs to `begin_setup`
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// Phone number to put on file before starting SMS setup
    pub phone: Option<String>,
}

/// Shown once; only digests are kept
#[derive(Debug, Clone, Serialize)]
pub struct TotpEnrollment {
    pub secret: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupStarted {
    pub method: MfaMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totp: Option<TotpEnrollment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeSent {
    pub method: MfaMethod,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Setup completed; sessions issued before `security_stamp` are dead
    Enabled {
        method: MfaMethod,
        security_stamp: i64,
        verified_at: DateTime<Utc>,
    },
    /// Second factor proven for an already enabled method
    StepUp {
        method: MfaMethod,
        verified_at: DateTime<Utc>,
    },
}

impl VerifyOutcome {
    pub fn verified_at(&self) -> DateTime<Utc> {
        match self {
            Self::Enabled { verified_at, .. } | Self::StepUp { verified_at, .. } => *verified_at,
        }
    }
}

pub struct MfaGate {
    store: Arc<dyn MfaStore>,
    accounts: Arc<dyn AccountStore>,
    delivery: OtpDelivery,
    cipher: SecretCipher,
    audit: Arc<dyn AuditSink>,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
}

impl MfaGate {
    pub fn new(
        store: Arc<dyn MfaStore>,
        accounts: Arc<dyn AccountStore>,
        delivery: OtpDelivery,
        cipher: SecretCipher,
        audit: Arc<dyn AuditSink>,
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            accounts,
            delivery,
            cipher,
            audit,
            config,
            clock,
        }
    }

    pub async fn status(&self, subject_id: &str) -> Result<MfaStatus, EngineError> {
        let record = self.load(subject_id).await?;
        Ok(MfaStatus::from_record(&record, self.clock.now()))
    }

    pub async fn is_enabled(&self, subject_id: &str) -> Result<bool, EngineError> {
        let record = self.load(subject_id).await?;
        Ok(matches!(record.state, MfaState::Enabled(_)))
    }

    pub async fn begin_setup(
        &self,
        subject_id: &str,
        method: MfaMethod,
        options: SetupOptions,
    ) -> Result<SetupStarted, EngineError> {
        let now = self.clock.now();
        let config = self.config.snapshot();
        let account = self.account(subject_id).await?;
        let record = self.load(subject_id).await?;

        match record.state {
            MfaState::Enabled(_) => return Err(EngineError::MfaAlreadyEnabled),
            state
                if state.is_setting_up()
                    && record.challenge.as_ref().is_some_and(|c| c.is_live(now)) =>
            {
                tracing::warn!(subject = %subject_id, method = %method, "MFA setup already in progress");
                return Err(EngineError::MfaConflict);
            }
            _ => {}
        }

        let mut next = record.cleared();
        next.state = MfaState::PendingSetup(method);
        let mut totp_enrollment = None;

        match method {
            MfaMethod::Email => {
                if account.email.trim().is_empty() {
                    return Err(EngineError::MfaPrerequisiteMissing(method));
                }
            }
            MfaMethod::Sms => {
                let supplied = options
                    .phone
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty());
                match supplied {
                    Some(phone) => {
                        self.accounts
                            .set_phone(subject_id, Some(phone))
                            .await
                            .map_err(EngineError::Storage)?;
                    }
                    None if account.phone.as_deref().is_some_and(|p| !p.is_empty()) => {}
                    None => return Err(EngineError::MfaPrerequisiteMissing(method)),
                }
            }
            MfaMethod::Totp => {
                let secret = totp::encode_secret(&totp::generate_secret());
                let backup_codes = generate_backup_codes(config.backup_code_count);
                next.secret = Some(self.cipher.encrypt(secret.as_bytes())?);
                next.backup_codes = Some(
                    backup_codes
                        .iter()
                        .map(|c| digest_code(&normalize_backup_code(c)))
                        .collect(),
                );
                next.challenge = Some(Challenge {
                    code_hash: None,
                    expires_at: now + config.totp_setup_ttl(),
                    attempts_remaining: config.otp_max_attempts,
                });
                totp_enrollment = Some(TotpEnrollment {
                    provisioning_uri: totp::provisioning_uri(
                        &config.totp_issuer,
                        &account.email,
                        &secret,
                        config.otp_digits,
                        config.totp_step_secs,
                    ),
                    secret,
                    backup_codes,
                });
            }
        }

        self.commit(record.version, next).await?;
        tracing::info!(subject = %subject_id, method = %method, "MFA setup started");
        Ok(SetupStarted {
            method,
            totp: totp_enrollment,
        })
    }

    /// Issue and deliver a fresh code for Email/SMS
    ///
    /// The challenge is stored before delivery; `DeliveryFailed` leaves it
    /// in place and the subject may request a resend.
    pub async fn send_challenge(&self, subject_id: &str) -> Result<ChallengeSent, EngineError> {
        let now = self.clock.now();
        let config = self.config.snapshot();
        let record = self.load(subject_id).await?;

        let method = match record.state {
            MfaState::Disabled => return Err(EngineError::MfaNotEnabled),
            MfaState::PendingSetup(m) | MfaState::AwaitingVerification(m) | MfaState::Enabled(m)
                if m.is_delivered() =>
            {
                m
            }
            _ => {
                return Err(EngineError::MfaInvalidState(
                    "authenticator codes are not delivered",
                ));
            }
        };

        let account = self.account(subject_id).await?;
        let destination = match method {
            MfaMethod::Sms => account
                .phone
                .filter(|p| !p.is_empty())
                .ok_or(EngineError::MfaPrerequisiteMissing(MfaMethod::Sms))?,
            _ => account.email,
        };

        let code = generate_code(config.otp_digits);
        let expires_at = now + config.otp_ttl();
        let mut next = record.clone();
        next.challenge = Some(Challenge {
            code_hash: Some(digest_code(&code)),
            expires_at,
            attempts_remaining: config.otp_max_attempts,
        });
        if let MfaState::PendingSetup(m) = record.state {
            next.state = MfaState::AwaitingVerification(m);
        }
        self.commit(record.version, next).await?;
        tracing::info!(subject = %subject_id, method = %method, "Verification code issued");

        self.delivery
            .deliver(
                method,
                &destination,
                &code,
                config.delivery_timeout(),
                config.delivery_retries,
            )
            .await?;
        Ok(ChallengeSent { method, expires_at })
    }

    /// Check a code: completes setup, or proves the factor for step-up
    pub async fn verify(&self, subject_id: &str, code: &str) -> Result<VerifyOutcome, EngineError> {
        let now = self.clock.now();
        let config = self.config.snapshot();
        let record = self.load(subject_id).await?;

        let (method, enabling) = match record.state {
            MfaState::Disabled => return Err(EngineError::MfaNotEnabled),
            MfaState::PendingSetup(m) | MfaState::AwaitingVerification(m) => (m, true),
            MfaState::Enabled(m) => (m, false),
        };

        let mut next = record.clone();
        let mut budget = if method.is_delivered() || enabling {
            let Some(challenge) = record.challenge.clone() else {
                return Err(EngineError::MfaChallengeExpired);
            };
            if method.is_delivered() && challenge.code_hash.is_none() {
                return Err(EngineError::MfaChallengeExpired);
            }
            if !challenge.is_live(now) {
                next.challenge = None;
                if self.commit(record.version, next).await.is_err() {
                    tracing::debug!(subject = %subject_id, "Expired challenge already replaced");
                }
                return Err(EngineError::MfaChallengeExpired);
            }
            challenge
        } else {
            self.step_up_budget(&record, &config, now)?
        };

        let matched_step = match method {
            MfaMethod::Email | MfaMethod::Sms => {
                let matched = budget
                    .code_hash
                    .as_deref()
                    .is_some_and(|hash| code_matches(code.trim(), hash));
                matched.then_some(None)
            }
            MfaMethod::Totp => {
                let secret = self.totp_secret(&record)?;
                totp::verify(
                    &secret,
                    code,
                    now,
                    config.totp_step_secs,
                    config.totp_skew_steps,
                    config.otp_digits,
                )
                .filter(|step| record.last_totp_step.is_none_or(|last| *step > last))
                .map(Some)
            }
        };

        let Some(step) = matched_step else {
            budget.attempts_remaining = budget.attempts_remaining.saturating_sub(1);
            let remaining = budget.attempts_remaining;
            // Exhausted challenges are dropped; an exhausted step-up budget
            // stays until it expires so it cannot be reset by retrying
            next.challenge = if remaining == 0 && (method.is_delivered() || enabling) {
                None
            } else {
                Some(budget)
            };
            self.commit(record.version, next).await?;
            tracing::warn!(
                subject = %subject_id,
                method = %method,
                attempts_remaining = remaining,
                "MFA code rejected"
            );
            return Err(EngineError::MfaCodeInvalid {
                attempts_remaining: remaining,
            });
        };

        next.challenge = None;
        if step.is_some() {
            next.last_totp_step = step;
        }

        if !enabling {
            self.commit(record.version, next).await?;
            tracing::info!(subject = %subject_id, method = %method, "Step-up verified");
            return Ok(VerifyOutcome::StepUp {
                method,
                verified_at: now,
            });
        }

        // Invalidate existing sessions before the toggle is persisted
        let security_stamp = self.bump_stamp(subject_id).await?;
        next.state = MfaState::Enabled(method);
        next.enabled_at = Some(now);
        self.commit(record.version, next).await?;

        tracing::info!(subject = %subject_id, method = %method, "MFA enabled");
        self.audit.record(AuditEvent::MfaEnabled {
            subject_id: subject_id.to_string(),
            method,
        });
        Ok(VerifyOutcome::Enabled {
            method,
            security_stamp,
            verified_at: now,
        })
    }

    /// Step-up with a single-use TOTP backup code
    pub async fn redeem_backup_code(
        &self,
        subject_id: &str,
        code: &str,
    ) -> Result<VerifyOutcome, EngineError> {
        let now = self.clock.now();
        let config = self.config.snapshot();
        let record = self.load(subject_id).await?;

        match record.state {
            MfaState::Enabled(MfaMethod::Totp) => {}
            MfaState::Disabled => return Err(EngineError::MfaNotEnabled),
            _ => {
                return Err(EngineError::MfaInvalidState(
                    "backup codes require an enabled authenticator",
                ));
            }
        }

        let mut budget = self.step_up_budget(&record, &config, now)?;
        let mut remaining_codes = record.backup_codes.clone().unwrap_or_default();
        let supplied = digest_code(&normalize_backup_code(code));

        // Compare against every stored digest without stopping early
        let mut position = None;
        for (i, stored) in remaining_codes.iter().enumerate() {
            if bool::from(stored.as_bytes().ct_eq(supplied.as_bytes())) {
                position = Some(i);
            }
        }

        let mut next = record.clone();
        let Some(index) = position else {
            budget.attempts_remaining = budget.attempts_remaining.saturating_sub(1);
            let remaining = budget.attempts_remaining;
            next.challenge = Some(budget);
            self.commit(record.version, next).await?;
            tracing::warn!(subject = %subject_id, attempts_remaining = remaining, "Backup code rejected");
            return Err(EngineError::MfaCodeInvalid {
                attempts_remaining: remaining,
            });
        };

        remaining_codes.remove(index);
        let left = remaining_codes.len();
        next.backup_codes = Some(remaining_codes);
        next.challenge = None;
        // The versioned write makes a concurrent second redemption lose
        self.commit(record.version, next).await?;

        tracing::info!(subject = %subject_id, backup_codes_left = left, "Backup code redeemed");
        Ok(VerifyOutcome::StepUp {
            method: MfaMethod::Totp,
            verified_at: now,
        })
    }

    /// Return to `Disabled` from any state; always bumps the security stamp
    pub async fn disable(&self, subject_id: &str) -> Result<i64, EngineError> {
        let security_stamp = self.bump_stamp(subject_id).await?;

        for _ in 0..DISABLE_ATTEMPTS {
            let record = self.load(subject_id).await?;
            let previous = record.state.method();
            match self.commit(record.version, record.cleared()).await {
                Ok(_) => {
                    tracing::info!(subject = %subject_id, previous = ?previous, "MFA disabled");
                    self.audit.record(AuditEvent::MfaDisabled {
                        subject_id: subject_id.to_string(),
                        previous,
                    });
                    return Ok(security_stamp);
                }
                Err(EngineError::MfaConflict) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::Internal(format!(
            "MFA disable for {subject_id} did not settle"
        )))
    }

    async fn load(&self, subject_id: &str) -> Result<MfaRecord, EngineError> {
        Ok(self
            .store
            .load(subject_id)
            .await
            .map_err(EngineError::Storage)?
            .unwrap_or_else(|| MfaRecord::new(subject_id)))
    }

    async fn commit(&self, expected_version: i64, mut next: MfaRecord) -> Result<MfaRecord, EngineError> {
        next.version = expected_version + 1;
        let saved = self
            .store
            .save(&next, expected_version)
            .await
            .map_err(EngineError::Storage)?;
        if !saved {
            tracing::warn!(subject = %next.subject_id, "Concurrent MFA update detected");
            return Err(EngineError::MfaConflict);
        }
        Ok(next)
    }

    async fn account(&self, subject_id: &str) -> Result<Account, EngineError> {
        self.accounts
            .load(subject_id)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::SubjectNotFound(subject_id.to_string()))
    }

    async fn bump_stamp(&self, subject_id: &str) -> Result<i64, EngineError> {
        self.accounts
            .bump_security_stamp(subject_id)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::SubjectNotFound(subject_id.to_string()))
    }

    /// Attempt budget for step-up without a delivered code
    fn step_up_budget(
        &self,
        record: &MfaRecord,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<Challenge, EngineError> {
        match &record.challenge {
            Some(slot) if now < slot.expires_at => {
                if slot.attempts_remaining == 0 {
                    return Err(EngineError::MfaChallengeExpired);
                }
                Ok(slot.clone())
            }
            _ => Ok(Challenge {
                code_hash: None,
                expires_at: now + config.otp_ttl(),
                attempts_remaining: config.otp_max_attempts,
            }),
        }
    }

    fn totp_secret(&self, record: &MfaRecord) -> Result<Vec<u8>, EngineError> {
        let sealed = record
            .secret
            .as_deref()
            .ok_or(EngineError::MfaInvalidState("authenticator secret missing"))?;
        let encoded = self.cipher.decrypt(sealed)?;
        let encoded = String::from_utf8(encoded)
            .map_err(|_| EngineError::Internal("stored secret is not UTF-8".into()))?;
        totp::decode_secret(&encoded)
            .ok_or_else(|| EngineError::Internal("stored secret is not base32".into()))
    }
}

/// Random zero-padded numeric code
pub fn generate_code(digits: u32) -> String {
    let digits = digits.clamp(4, 9);
    let code: u32 = rand::thread_rng().gen_range(0..10u32.pow(digits));
    format!("{code:0width$}", width = digits as usize)
}

/// Display form `XXXXX-XXXXX`
fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let raw: String = (0..BACKUP_CODE_LEN)
                .map(|_| BACKUP_ALPHABET[rng.gen_range(0..BACKUP_ALPHABET.len())] as char)
                .collect();
            format!("{}-{}", &raw[..BACKUP_CODE_LEN / 2], &raw[BACKUP_CODE_LEN / 2..])
        })
        .collect()
}

fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
