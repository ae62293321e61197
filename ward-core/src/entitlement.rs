//! Entitlement checks
//!
//! Combines the plan catalog and the quota ledger into allow/deny decisions.
//! Disabled providers are a hard gate and never reach the ledger. Guests are
//! metered daily against the configured guest limits, never a stored plan.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use shared::entitlement::{Decision, DenyReason, UsageView};

use crate::account::AccountStore;
use crate::audit::{AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::config::ConfigHandle;
use crate::error::EngineError;
use crate::ledger::{ConsumeOutcome, Meter, QuotaLedger};
use crate::plan::{Allowance, ModelCategory, PlanCatalog, PlanTier};
use crate::resource::Resource;
use crate::window::Cadence;

/// CAS rounds for concurrent plan changes on the same subject
const PLAN_CHANGE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub plan: PlanTier,
    pub plan_anchor: DateTime<Utc>,
}

/// Anonymous caller key: hex SHA-256 over client address and user agent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn derive(ip: &str, user_agent: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(b"\n");
        hasher.update(user_agent.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    User(Identity),
    Guest(Fingerprint),
}

impl Subject {
    /// Ledger key; users and guests never share counters
    pub fn ledger_id(&self) -> String {
        match self {
            Self::User(identity) => format!("user:{}", identity.id),
            Self::Guest(fp) => format!("guest:{}", fp.as_str()),
        }
    }

    /// Tier used for model access; guests get the free tier
    pub fn tier(&self) -> PlanTier {
        match self {
            Self::User(identity) => identity.plan,
            Self::Guest(_) => PlanTier::Free,
        }
    }
}

/// Who asked for a plan change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanChangeActor {
    Subject,
    PaymentGateway,
    /// `override_rank` permits same-rank and downgrade changes
    Administrator { override_rank: bool },
}

impl PlanChangeActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::PaymentGateway => "payment_gateway",
            Self::Administrator { .. } => "administrator",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanChange {
    pub from: PlanTier,
    pub to: PlanTier,
    pub anchor: DateTime<Utc>,
}

/// Successful consumption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// `None` when unlimited
    pub remaining: Option<u64>,
    pub reset_at: DateTime<Utc>,
}

pub struct EntitlementChecker {
    catalog: Arc<PlanCatalog>,
    ledger: Arc<QuotaLedger>,
    accounts: Arc<dyn AccountStore>,
    audit: Arc<dyn AuditSink>,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
}

impl EntitlementChecker {
    pub fn new(
        catalog: Arc<PlanCatalog>,
        ledger: Arc<QuotaLedger>,
        accounts: Arc<dyn AccountStore>,
        audit: Arc<dyn AuditSink>,
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            accounts,
            audit,
            config,
            clock,
        }
    }

    /// Build the subject for an authenticated account
    pub async fn identify(&self, subject_id: &str) -> Result<Subject, EngineError> {
        let account = self
            .accounts
            .load(subject_id)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| EngineError::SubjectNotFound(subject_id.to_string()))?;
        Ok(Subject::User(Identity {
            id: account.id,
            plan: account.plan,
            plan_anchor: account.plan_anchor,
        }))
    }

    /// `None` when the resource is a disabled provider
    async fn meter_for(
        &self,
        subject: &Subject,
        resource: &Resource,
    ) -> Result<Option<Meter>, EngineError> {
        let (allowance, cadence, anchor) = match subject {
            Subject::Guest(_) => {
                let config = self.config.snapshot();
                (
                    config.guest_limits.allowance(resource),
                    Cadence::DailyUtc,
                    self.clock.now(),
                )
            }
            Subject::User(identity) => {
                let plan = self.catalog.resolve(identity.plan).await?;
                let cadence = if resource.is_threat_intel() {
                    Cadence::DailyUtc
                } else {
                    Cadence::for_period(plan.period)
                };
                (plan.limits.allowance(resource), cadence, identity.plan_anchor)
            }
        };

        Ok(match allowance {
            Allowance::Disabled => None,
            Allowance::Metered(limit) => Some(Meter {
                resource_key: resource.key(),
                limit,
                cadence,
                anchor,
            }),
        })
    }

    /// Consume `units` or fail with the reason
    pub async fn consume(
        &self,
        subject: &Subject,
        resource: &Resource,
        units: u64,
    ) -> Result<Grant, EngineError> {
        if units == 0 {
            return Err(EngineError::InvalidUnits);
        }
        if self.config.snapshot().maintenance_mode {
            tracing::warn!(resource = %resource, "Consumption refused: maintenance mode");
            return Err(EngineError::MaintenanceMode);
        }

        let subject_id = subject.ledger_id();
        let Some(meter) = self.meter_for(subject, resource).await? else {
            tracing::warn!(subject = %subject_id, resource = %resource, "Provider disabled for plan");
            self.audit.record(AuditEvent::ProviderDisabled {
                subject_id,
                resource: resource.key(),
            });
            return Err(EngineError::ProviderDisabled {
                resource: resource.key(),
            });
        };

        match self.ledger.try_consume(&subject_id, &meter, units).await? {
            ConsumeOutcome::Consumed {
                remaining,
                reset_at,
            } => Ok(Grant {
                remaining,
                reset_at,
            }),
            ConsumeOutcome::Denied { limit, reset_at } => {
                self.audit.record(AuditEvent::QuotaDenied {
                    subject_id,
                    resource: resource.key(),
                    limit,
                    reset_at,
                });
                Err(EngineError::QuotaExceeded {
                    resource: resource.key(),
                    limit,
                    reset_at,
                })
            }
        }
    }

    /// Decision form of [`consume`](Self::consume)
    ///
    /// Quota and provider denials become a `Decision`; every other error is
    /// returned so the caller fails closed.
    pub async fn check_and_consume(
        &self,
        subject: &Subject,
        resource: &Resource,
        units: u64,
    ) -> Result<Decision, EngineError> {
        match self.consume(subject, resource, units).await {
            Ok(grant) => Ok(Decision::allow(grant.remaining, Some(grant.reset_at))),
            Err(EngineError::QuotaExceeded { reset_at, .. }) => {
                Ok(Decision::deny(DenyReason::QuotaExceeded, Some(reset_at)))
            }
            Err(EngineError::ProviderDisabled { .. }) => {
                Ok(Decision::deny(DenyReason::ProviderDisabled, None))
            }
            Err(e) => Err(e),
        }
    }

    /// Current usage without consuming
    pub async fn usage(
        &self,
        subject: &Subject,
        resource: &Resource,
    ) -> Result<UsageView, EngineError> {
        let meter = self
            .meter_for(subject, resource)
            .await?
            .ok_or_else(|| EngineError::ProviderDisabled {
                resource: resource.key(),
            })?;
        let usage = self.ledger.peek(&subject.ledger_id(), &meter).await?;
        Ok(UsageView {
            resource: meter.resource_key,
            consumed: usage.consumed,
            limit: usage.limit.cap(),
            window_end: usage.window.end,
        })
    }

    pub fn can_use_model(&self, subject: &Subject, category: ModelCategory) -> bool {
        subject.tier().allows_model(category)
    }

    /// Provider gate; only the free plan is restricted, guests more tightly
    pub fn can_use_provider(&self, subject: &Subject, provider: &str) -> bool {
        let config = self.config.snapshot();
        let allowed = match subject {
            Subject::Guest(_) => &config.guest_model_providers,
            Subject::User(identity) if identity.plan == PlanTier::Free => {
                &config.free_model_providers
            }
            Subject::User(_) => return true,
        };
        let provider = provider.trim();
        allowed.iter().any(|p| p.eq_ignore_ascii_case(provider))
    }

    /// Both the model category and the serving provider must be open
    pub fn can_use_model_from(
        &self,
        subject: &Subject,
        category: ModelCategory,
        provider: &str,
    ) -> bool {
        self.can_use_model(subject, category) && self.can_use_provider(subject, provider)
    }

    /// Move a subject to `requested`
    ///
    /// Only strict upgrades are accepted unless an administrator overrides.
    /// Upgrades re-anchor the billing window at the change time; overridden
    /// downgrades keep the anchor so the lower limits apply to the window
    /// already in progress.
    pub async fn change_plan(
        &self,
        subject_id: &str,
        requested: PlanTier,
        actor: PlanChangeActor,
    ) -> Result<PlanChange, EngineError> {
        // The target must exist before anyone is moved onto it
        self.catalog.resolve(requested).await?;

        for _ in 0..PLAN_CHANGE_ATTEMPTS {
            let account = self
                .accounts
                .load(subject_id)
                .await
                .map_err(EngineError::Storage)?
                .ok_or_else(|| EngineError::SubjectNotFound(subject_id.to_string()))?;
            let current = account.plan;

            let upgrade = current.is_upgrade_to(requested);
            let overridden = matches!(
                actor,
                PlanChangeActor::Administrator {
                    override_rank: true
                }
            );
            if !upgrade && !overridden {
                tracing::warn!(
                    subject = %subject_id,
                    current = %current,
                    requested = %requested,
                    actor = actor.as_str(),
                    "Plan change rejected"
                );
                return Err(EngineError::PlanDowngradeNotAllowed { current, requested });
            }

            let anchor = if upgrade {
                self.clock.now()
            } else {
                account.plan_anchor
            };
            let applied = self
                .accounts
                .set_plan(subject_id, current, requested, anchor)
                .await
                .map_err(EngineError::Storage)?;
            if !applied {
                tracing::debug!(subject = %subject_id, "Plan changed concurrently, retrying");
                continue;
            }

            tracing::info!(
                subject = %subject_id,
                from = %current,
                to = %requested,
                actor = actor.as_str(),
                "Plan changed"
            );
            self.audit.record(AuditEvent::PlanChanged {
                subject_id: subject_id.to_string(),
                from: current,
                to: requested,
                actor: actor.as_str().to_string(),
            });
            return Ok(PlanChange {
                from: current,
                to: requested,
                anchor,
            });
        }

        Err(EngineError::Internal(format!(
            "plan change for {subject_id} did not settle"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let a = Fingerprint::derive("203.0.113.7", "Mozilla/5.0");
        let b = Fingerprint::derive("203.0.113.7", "Mozilla/5.0");
        let c = Fingerprint::derive("203.0.113.8", "Mozilla/5.0");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_field_boundary_is_unambiguous() {
        assert_ne!(
            Fingerprint::derive("1.2.3.4", "5agent"),
            Fingerprint::derive("1.2.3.45", "agent")
        );
    }

    #[test]
    fn test_ledger_ids_do_not_collide() {
        let guest = Subject::Guest(Fingerprint::derive("1.1.1.1", "ua"));
        assert!(guest.ledger_id().starts_with("guest:"));
        assert_eq!(guest.tier(), PlanTier::Free);
    }
}
