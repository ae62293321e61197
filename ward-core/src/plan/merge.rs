//! Partial plan updates
//!
//! A patch is validated against the wire shapes once, then applied with a
//! pure function over normalized limits so the result never depends on the
//! backing store.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use shared::plan::{BillingPeriod, PlanPatchRequest};

use super::limits::{duplicate_provider, normalize_limit, normalize_provider, provider_name};
use super::{Limit, Plan, ProviderLimit};
use crate::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitsPatch {
    pub scans: Option<Limit>,
    pub documentation: Option<Limit>,
    pub repositories: Option<Limit>,
    pub chat_messages: Option<Limit>,
    /// `Some(limit)` sets the provider, `None` removes it
    pub providers: BTreeMap<String, Option<ProviderLimit>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanPatch {
    pub price: Option<Decimal>,
    pub period: Option<BillingPeriod>,
    pub limits: LimitsPatch,
}

impl PlanPatch {
    pub fn from_request(req: &PlanPatchRequest) -> Result<Self, EngineError> {
        if let Some(price) = req.price
            && price.is_sign_negative()
        {
            return Err(EngineError::InvalidPlanDefinition(
                "price must not be negative".into(),
            ));
        }

        let mut limits = LimitsPatch::default();
        if let Some(wire) = &req.limits {
            limits.scans = wire
                .scans
                .as_ref()
                .map(|l| normalize_limit("scans", l))
                .transpose()?;
            limits.documentation = wire
                .documentation
                .as_ref()
                .map(|l| normalize_limit("documentation", l))
                .transpose()?;
            limits.repositories = wire
                .repositories
                .as_ref()
                .map(|l| normalize_limit("repositories", l))
                .transpose()?;
            limits.chat_messages = wire
                .chat_messages
                .as_ref()
                .map(|l| normalize_limit("chatMessages", l))
                .transpose()?;
            if let Some(providers) = &wire.threat_intelligence {
                for (raw, entry) in providers {
                    let name = provider_name(raw)?;
                    let value = entry
                        .as_ref()
                        .map(|e| normalize_provider(&name, e))
                        .transpose()?;
                    if limits.providers.insert(name, value).is_some() {
                        return Err(duplicate_provider(raw));
                    }
                }
            }
        }

        Ok(Self {
            price: req.price,
            period: req.period,
            limits,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Apply `patch` on top of `plan`
pub fn merge(plan: &Plan, patch: &PlanPatch) -> Plan {
    let mut next = plan.clone();
    if let Some(price) = patch.price {
        next.price = price;
    }
    if let Some(period) = patch.period {
        next.period = period;
    }

    let limits = &patch.limits;
    if let Some(l) = limits.scans {
        next.limits.scans = l;
    }
    if let Some(l) = limits.documentation {
        next.limits.documentation = l;
    }
    if let Some(l) = limits.repositories {
        next.limits.repositories = l;
    }
    if let Some(l) = limits.chat_messages {
        next.limits.chat_messages = l;
    }
    for (name, entry) in &limits.providers {
        match entry {
            Some(limit) => {
                next.limits.threat_intelligence.insert(name.clone(), *limit);
            }
            None => {
                next.limits.threat_intelligence.remove(name);
            }
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanLimits, PlanTier};

    fn standard() -> Plan {
        Plan {
            tier: PlanTier::Standard,
            price: Decimal::new(999, 2),
            period: BillingPeriod::Monthly,
            limits: PlanLimits {
                scans: Limit::Limited(10),
                documentation: Limit::Limited(5),
                repositories: Limit::Limited(3),
                chat_messages: Limit::Limited(100),
                threat_intelligence: BTreeMap::from([
                    ("shodan".to_string(), ProviderLimit::Limited(5)),
                    ("otx".to_string(), ProviderLimit::Unlimited),
                ]),
            },
        }
    }

    fn patch(json: &str) -> PlanPatch {
        PlanPatch::from_request(&serde_json::from_str(json).unwrap()).unwrap()
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let plan = standard();
        let p = patch("{}");
        assert!(p.is_empty());
        assert_eq!(merge(&plan, &p), plan);
    }

    #[test]
    fn test_scalar_fields_replace_only_what_is_given() {
        let merged = merge(
            &standard(),
            &patch(r#"{ "price": 12.5, "limits": { "scans": "unlimited" } }"#),
        );
        assert_eq!(merged.price, Decimal::new(125, 1));
        assert_eq!(merged.limits.scans, Limit::Unlimited);
        assert_eq!(merged.limits.documentation, Limit::Limited(5));
        assert_eq!(merged.period, BillingPeriod::Monthly);
    }

    #[test]
    fn test_providers_merge_individually() {
        let merged = merge(
            &standard(),
            &patch(
                r#"{ "limits": { "threatIntelligence": {
                    "Shodan": { "enabled": true, "limit": 50 },
                    "otx": null,
                    "virustotal": false
                } } }"#,
            ),
        );
        let ti = &merged.limits.threat_intelligence;
        assert_eq!(ti["shodan"], ProviderLimit::Limited(50));
        assert!(!ti.contains_key("otx"));
        assert_eq!(ti["virustotal"], ProviderLimit::Disabled);
    }

    #[test]
    fn test_invalid_patch_is_rejected_before_merge() {
        let req: PlanPatchRequest =
            serde_json::from_str(r#"{ "limits": { "scans": -5 } }"#).unwrap();
        assert!(matches!(
            PlanPatch::from_request(&req),
            Err(EngineError::InvalidPlanDefinition(_))
        ));

        let req: PlanPatchRequest = serde_json::from_str(r#"{ "price": -1 }"#).unwrap();
        assert!(PlanPatch::from_request(&req).is_err());
    }

    #[test]
    fn test_provider_named_twice_in_patch_is_rejected() {
        let req: PlanPatchRequest = serde_json::from_str(
            r#"{ "limits": { "threatIntelligence": { "OTX": null, "otx": 3 } } }"#,
        )
        .unwrap();
        assert!(matches!(
            PlanPatch::from_request(&req),
            Err(EngineError::InvalidPlanDefinition(_))
        ));
    }
}
