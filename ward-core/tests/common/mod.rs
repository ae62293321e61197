//! Shared fixtures: in-memory stores, a manual clock and a recording outbox

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use shared::plan::PlanDefinition;
use ward_core::account::{Account, MemoryAccountStore, Role};
use ward_core::audit::MemoryAuditSink;
use ward_core::clock::ManualClock;
use ward_core::crypto::SecretCipher;
use ward_core::entitlement::EntitlementChecker;
use ward_core::ledger::{MemoryUsageStore, QuotaLedger};
use ward_core::mfa::{MemoryMfaStore, MfaGate, OtpDelivery, OtpSender};
use ward_core::plan::{MemoryPlanStore, PlanCatalog, PlanTier};
use ward_core::session::{SessionConfig, SessionIssuer};
use ward_core::{BoxError, ConfigHandle, EngineConfig};

/// Records delivered codes; can be switched to fail
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl Outbox {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn last_code(&self) -> Option<String> {
        self.sent.lock().last().map(|(_, code)| code.clone())
    }

    pub fn last_destination(&self) -> Option<String> {
        self.sent.lock().last().map(|(dest, _)| dest.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl OtpSender for Outbox {
    async fn send(&self, destination: &str, code: &str) -> Result<(), BoxError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("transport unavailable".into());
        }
        self.sent
            .lock()
            .push((destination.to_string(), code.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub config: ConfigHandle,
    pub accounts: Arc<MemoryAccountStore>,
    pub plans: Arc<MemoryPlanStore>,
    pub usage: Arc<MemoryUsageStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub catalog: Arc<PlanCatalog>,
    pub ledger: Arc<QuotaLedger>,
    pub checker: EntitlementChecker,
    pub mfa: MfaGate,
    pub sessions: SessionIssuer,
    pub email: Arc<Outbox>,
    pub sms: Arc<Outbox>,
}

/// 2026-03-15 10:00 UTC
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 10, 0, 0).unwrap()
}

pub fn plan_definitions() -> Vec<PlanDefinition> {
    let rows = serde_json::json!([
        {
            "planId": "free", "price": 0, "period": "monthly",
            "limits": { "scans": 2, "documentation": 1, "repositories": 1, "chatMessages": 20,
                        "threatIntelligence": { "abuseipdb": true } }
        },
        {
            "planId": "standard", "price": 9.99, "period": "monthly",
            "limits": { "scans": 10, "documentation": 5, "repositories": 3, "chatMessages": 200,
                        "threatIntelligence": {
                            "virustotal": { "enabled": true, "limit": -1 },
                            "shodan": 3,
                            "otx": false
                        } }
        },
        {
            "planId": "pro", "price": 29, "period": "monthly",
            "limits": { "scans": 100, "documentation": 50, "repositories": 20, "chatMessages": "unlimited",
                        "threatIntelligence": {
                            "virustotal": { "enabled": true, "limit": "unlimited" },
                            "shodan": { "enabled": true, "limit": 50 },
                            "otx": true
                        } }
        },
        {
            "planId": "enterprise", "price": 2990, "period": "yearly",
            "limits": { "scans": -1, "documentation": -1, "repositories": -1, "chatMessages": -1,
                        "threatIntelligence": {
                            "virustotal": true, "shodan": true, "otx": true, "greynoise": true
                        } }
        }
    ]);
    serde_json::from_value(rows).unwrap()
}

pub fn account(id: &str, plan: PlanTier, anchor: DateTime<Utc>) -> Account {
    Account {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        phone: None,
        role: Role::User,
        plan,
        plan_anchor: anchor,
        security_stamp: 1,
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let config = ConfigHandle::new(config);
        let accounts = Arc::new(MemoryAccountStore::new());
        let plans = Arc::new(MemoryPlanStore::with_plans(plan_definitions()));
        let usage = Arc::new(MemoryUsageStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let email = Arc::new(Outbox::default());
        let sms = Arc::new(Outbox::default());

        let catalog = Arc::new(PlanCatalog::new(plans.clone(), config.clone()));
        let ledger = Arc::new(QuotaLedger::new(usage.clone(), clock.clone()));
        let checker = EntitlementChecker::new(
            catalog.clone(),
            ledger.clone(),
            accounts.clone(),
            audit.clone(),
            config.clone(),
            clock.clone(),
        );
        let mfa = MfaGate::new(
            Arc::new(MemoryMfaStore::new()),
            accounts.clone(),
            OtpDelivery::new(email.clone(), sms.clone()),
            SecretCipher::generate(),
            audit.clone(),
            config.clone(),
            clock.clone(),
        );
        let sessions = SessionIssuer::new(
            SessionConfig {
                secret: "integration-test-secret-0123456789abcdef".into(),
                issuer: "ward".into(),
                audience: "ward-clients".into(),
            },
            accounts.clone(),
            config.clone(),
            clock.clone(),
        );

        Self {
            clock,
            config,
            accounts,
            plans,
            usage,
            audit,
            catalog,
            ledger,
            checker,
            mfa,
            sessions,
            email,
            sms,
        }
    }

    pub fn add_account(&self, id: &str, plan: PlanTier, anchor: DateTime<Utc>) {
        self.accounts.insert(account(id, plan, anchor));
    }
}
