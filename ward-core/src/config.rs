//! Engine configuration
//!
//! Components never read process-global settings. They hold a
//! [`ConfigHandle`] and take an immutable [`EngineConfig`] snapshot per call;
//! the host swaps in a refreshed snapshot on its own interval.

use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::plan::{Limit, PlanLimits};

/// Tunables for the entitlement and step-up engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Plan cache entry lifetime (seconds)
    pub plan_cache_ttl_secs: i64,
    /// Email/SMS challenge lifetime (seconds)
    pub otp_ttl_secs: i64,
    /// Wrong codes allowed per challenge
    pub otp_max_attempts: u32,
    /// Digits in e-mail/SMS codes and TOTP codes
    pub otp_digits: u32,
    /// TOTP enrollment window (seconds)
    pub totp_setup_ttl_secs: i64,
    /// TOTP time step (seconds)
    pub totp_step_secs: i64,
    /// Accepted clock skew in TOTP steps on each side
    pub totp_skew_steps: i64,
    /// Backup codes minted at TOTP setup
    pub backup_code_count: usize,
    /// Issuer shown in authenticator apps
    pub totp_issuer: String,
    /// Access token lifetime (seconds)
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime (seconds)
    pub refresh_token_ttl_secs: i64,
    /// How long a second-factor proof satisfies step-up (seconds)
    pub step_up_max_age_secs: i64,
    /// Per-attempt OTP delivery timeout (milliseconds)
    pub delivery_timeout_ms: u64,
    /// Extra delivery attempts after the first failure
    pub delivery_retries: u32,
    /// Fixed daily limits for anonymous callers
    pub guest_limits: PlanLimits,
    /// Model providers open to anonymous callers
    pub guest_model_providers: Vec<String>,
    /// Model providers open to signed-in free plan subjects; paid plans reach all
    pub free_model_providers: Vec<String>,
    /// Refuse metered consumption while set
    pub maintenance_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plan_cache_ttl_secs: 60,
            otp_ttl_secs: 5 * 60,
            otp_max_attempts: 3,
            otp_digits: 6,
            totp_setup_ttl_secs: 10 * 60,
            totp_step_secs: 30,
            totp_skew_steps: 1,
            backup_code_count: 10,
            totp_issuer: "Ward".to_string(),
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 30 * 24 * 60 * 60,
            step_up_max_age_secs: 10 * 60,
            delivery_timeout_ms: 5_000,
            delivery_retries: 2,
            guest_limits: PlanLimits {
                scans: Limit::Limited(1),
                documentation: Limit::Limited(1),
                repositories: Limit::Limited(0),
                chat_messages: Limit::Limited(10),
                threat_intelligence: Default::default(),
            },
            guest_model_providers: vec!["groq".to_string()],
            free_model_providers: vec!["groq".to_string(), "google".to_string()],
            maintenance_mode: false,
        }
    }
}

impl EngineConfig {
    pub fn plan_cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.plan_cache_ttl_secs.max(0) as u64)
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl_secs)
    }

    pub fn totp_setup_ttl(&self) -> Duration {
        Duration::seconds(self.totp_setup_ttl_secs)
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::seconds(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_ttl_secs)
    }

    pub fn step_up_max_age(&self) -> Duration {
        Duration::seconds(self.step_up_max_age_secs)
    }

    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// Shared, atomically swappable configuration snapshot
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<EngineConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Immutable view valid for the duration of one call
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.current.read().clone()
    }

    pub fn replace(&self, config: EngineConfig) {
        *self.current.write() = Arc::new(config);
    }

    /// Copy the current snapshot, apply `f`, publish the result
    pub fn update(&self, f: impl FnOnce(&mut EngineConfig)) {
        let mut guard = self.current.write();
        let mut next = EngineConfig::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_stable_across_updates() {
        let handle = ConfigHandle::default();
        let before = handle.snapshot();
        handle.update(|c| c.maintenance_mode = true);

        assert!(!before.maintenance_mode);
        assert!(handle.snapshot().maintenance_mode);
    }

    #[test]
    fn test_roundtrips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.otp_max_attempts, 3);
        assert_eq!(back.guest_limits, config.guest_limits);
        assert_eq!(back.free_model_providers, ["groq", "google"]);
    }
}
